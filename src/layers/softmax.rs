//! Channel-wise softmax layer.

use rayon::prelude::*;

use crate::error::{CnnError, Result};
use crate::layers::r#trait::check_shape;
use crate::layers::{Layer, LayerKind, ParamGradients};
use crate::tensor::{Tensor, TensorShape};
use crate::utils::activations::softmax_in_place;

/// Softmax across the channels of every spatial position.
///
/// Backward uses the diagonal of the Jacobian only, `δ · y · (1 − y)`.
#[derive(Debug, Clone, Default)]
pub struct SoftmaxLayer {
    shape: TensorShape,
}

impl SoftmaxLayer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for SoftmaxLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Softmax
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let mut output = input.clone();
        let depth = input.depth();
        output.data_mut().par_chunks_mut(depth).for_each(softmax_in_place);
        Ok(output)
    }

    fn backward(
        &self,
        deltas: &Tensor,
        _input: &Tensor,
        output: &Tensor,
        _gradients: &mut ParamGradients,
    ) -> Result<Tensor> {
        check_shape("softmax deltas", deltas, output.shape())?;
        let mut input_deltas = deltas.clone();
        input_deltas
            .data_mut()
            .par_iter_mut()
            .zip(output.data().par_iter())
            .for_each(|(delta, &y)| *delta *= y * (1.0 - y));
        Ok(input_deltas)
    }

    fn calc_sizes(&mut self, input: TensorShape) -> Result<TensorShape> {
        if input.is_empty() {
            return Err(CnnError::config(format!(
                "softmax cannot take empty input {}",
                input
            )));
        }
        self.shape = input;
        Ok(input)
    }

    fn input_shape(&self) -> TensorShape {
        self.shape
    }

    fn output_shape(&self) -> TensorShape {
        self.shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_sum_to_one_per_position() {
        let input = Tensor::from_vec(2, 1, 3, vec![1.0, 2.0, 3.0, -5.0, 0.0, 5.0]).unwrap();
        let output = SoftmaxLayer::new().forward(&input).unwrap();

        for x in 0..2 {
            let sum: f32 = output.channels(x, 0).iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
        }
        assert!(output.get(1, 0, 2) > output.get(0, 0, 2));
    }

    #[test]
    fn test_backward_diagonal() {
        let input = Tensor::from_vec(1, 1, 2, vec![0.0, 0.0]).unwrap();
        let layer = SoftmaxLayer::new();
        let output = layer.forward(&input).unwrap();
        let deltas = Tensor::from_vec(1, 1, 2, vec![4.0, -4.0]).unwrap();

        let back = layer
            .backward(&deltas, &input, &output, &mut ParamGradients::empty())
            .unwrap();
        assert_eq!(back.data(), &[1.0, -1.0]);
    }
}
