//! Parameter-shaped gradient buffers.

use crate::tensor::{Tensor, TensorShape};

/// Gradients for one layer's parameters.
///
/// Convolution and deconvolution layers fill `filters` and `offsets`; batch
/// normalization uses `scale`; other layers carry an empty buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamGradients {
    pub filters: Vec<Tensor>,
    pub offsets: Vec<f32>,
    pub scale: f32,
}

impl ParamGradients {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Zeroed gradients for `count` filters of `shape` and `offsets` biases.
    pub fn for_filters(shape: TensorShape, count: usize, offsets: usize) -> Self {
        Self {
            filters: (0..count).map(|_| Tensor::zeros(shape)).collect(),
            offsets: vec![0.0; offsets],
            scale: 0.0,
        }
    }

    /// Element-wise `self += other`.
    ///
    /// # Panics
    ///
    /// Panics if the buffers were shaped for different layers.
    pub fn add_assign(&mut self, other: &ParamGradients) {
        assert_eq!(self.filters.len(), other.filters.len(), "Filter counts must match");
        assert_eq!(self.offsets.len(), other.offsets.len(), "Offset counts must match");
        for (dst, src) in self.filters.iter_mut().zip(other.filters.iter()) {
            dst.accumulate(src);
        }
        for (dst, src) in self.offsets.iter_mut().zip(other.offsets.iter()) {
            *dst += src;
        }
        self.scale += other.scale;
    }

    /// Sets every gradient back to zero.
    pub fn clear(&mut self) {
        self.filters.iter_mut().for_each(|f| f.fill(0.0));
        self.offsets.iter_mut().for_each(|o| *o = 0.0);
        self.scale = 0.0;
    }

    /// True when every gradient is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.scale == 0.0
            && self.offsets.iter().all(|&o| o == 0.0)
            && self.filters.iter().all(|f| f.data().iter().all(|&v| v == 0.0))
    }
}

/// Sums `other` into `acc` layer by layer.
pub fn add_layer_gradients(acc: &mut [ParamGradients], other: &[ParamGradients]) {
    for (dst, src) in acc.iter_mut().zip(other.iter()) {
        dst.add_assign(src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_assign_and_clear() {
        let shape = TensorShape::new(1, 1, 2);
        let mut acc = ParamGradients::for_filters(shape, 1, 1);
        let mut sample = ParamGradients::for_filters(shape, 1, 1);
        sample.filters[0].set(1, 0, 0, 2.0);
        sample.offsets[0] = 1.5;
        sample.scale = 0.25;

        acc.add_assign(&sample);
        acc.add_assign(&sample);

        assert_eq!(acc.filters[0].get(1, 0, 0), 4.0);
        assert_eq!(acc.offsets[0], 3.0);
        assert_eq!(acc.scale, 0.5);

        acc.clear();
        assert!(acc.is_zero());
    }
}
