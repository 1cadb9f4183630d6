//! Pooling (subsampling) layer.
//!
//! Only shape inference is available; forward and backward report
//! [`CnnError::Unsupported`] so an architecture using this layer is rejected
//! by `Network::validate` before training starts. The reductions themselves
//! live in [`crate::utils::pooling`].

use crate::error::{CnnError, Result};
use crate::layers::{Layer, LayerKind, ParamGradients};
use crate::tensor::{Tensor, TensorShape};
use crate::utils::pooling::pooled_shape;
use crate::utils::PoolingKind;

#[derive(Debug, Clone)]
pub struct SubsamplingLayer {
    pooling: PoolingKind,
    scale_x: usize,
    scale_y: usize,
    input_shape: TensorShape,
    output_shape: TensorShape,
}

impl SubsamplingLayer {
    /// Creates a pooling layer with a `scale_x × scale_y` window.
    ///
    /// # Errors
    ///
    /// [`CnnError::Config`] when either window dimension is zero.
    pub fn new(pooling: PoolingKind, scale_x: usize, scale_y: usize) -> Result<Self> {
        if scale_x == 0 || scale_y == 0 {
            return Err(CnnError::config(format!(
                "pooling window must be positive, got {}x{}",
                scale_x, scale_y
            )));
        }
        Ok(Self {
            pooling,
            scale_x,
            scale_y,
            input_shape: TensorShape::default(),
            output_shape: TensorShape::default(),
        })
    }

    pub fn pooling(&self) -> PoolingKind {
        self.pooling
    }

    pub fn window(&self) -> (usize, usize) {
        (self.scale_x, self.scale_y)
    }
}

impl Layer for SubsamplingLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Subsampling
    }

    fn forward(&self, _input: &Tensor) -> Result<Tensor> {
        Err(CnnError::unsupported("pooling layer has no forward pass"))
    }

    fn backward(
        &self,
        _deltas: &Tensor,
        _input: &Tensor,
        _output: &Tensor,
        _gradients: &mut ParamGradients,
    ) -> Result<Tensor> {
        Err(CnnError::unsupported("pooling layer has no backward pass"))
    }

    fn calc_sizes(&mut self, input: TensorShape) -> Result<TensorShape> {
        let output = pooled_shape(input, self.scale_x, self.scale_y)?;
        self.input_shape = input;
        self.output_shape = output;
        Ok(output)
    }

    fn input_shape(&self) -> TensorShape {
        self.input_shape
    }

    fn output_shape(&self) -> TensorShape {
        self.output_shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_divides_by_window() {
        let mut layer = SubsamplingLayer::new(PoolingKind::Max, 2, 3).unwrap();
        assert_eq!(
            layer.calc_sizes(TensorShape::new(4, 9, 8)).unwrap(),
            TensorShape::new(4, 3, 4)
        );
    }

    #[test]
    fn test_passes_are_unsupported() {
        let layer = SubsamplingLayer::new(PoolingKind::Average, 2, 2).unwrap();
        let t = Tensor::new(2, 2, 1);
        assert!(matches!(layer.forward(&t), Err(CnnError::Unsupported(_))));
        assert!(matches!(
            layer.output_deltas(&t, &t),
            Err(CnnError::Unsupported(_))
        ));
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(SubsamplingLayer::new(PoolingKind::Sum, 0, 2).is_err());
    }
}
