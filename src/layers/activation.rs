//! Pointwise activation layer.

use rayon::prelude::*;

use crate::error::{CnnError, Result};
use crate::layers::r#trait::check_shape;
use crate::layers::{Layer, LayerKind, ParamGradients};
use crate::tensor::{Tensor, TensorShape};
use crate::utils::{ActivationKind, OutputLoss};

/// Applies an [`ActivationKind`] to every element.
///
/// Backward multiplies the incoming deltas by the derivative evaluated at the
/// forward output. As the last layer it seeds back-propagation with its
/// [`OutputLoss`].
///
/// # Example
///
/// ```
/// use rust_cnn::layers::{ActivationLayer, Layer};
/// use rust_cnn::tensor::{Tensor, TensorShape};
/// use rust_cnn::utils::ActivationKind;
///
/// let layer = ActivationLayer::new(ActivationKind::ReLU);
/// let input = Tensor::from_vec(2, 1, 1, vec![-1.0, 3.0]).unwrap();
/// assert_eq!(layer.forward(&input).unwrap().data(), &[0.0, 3.0]);
/// ```
#[derive(Debug, Clone)]
pub struct ActivationLayer {
    activation: ActivationKind,
    loss: OutputLoss,
    shape: TensorShape,
}

impl ActivationLayer {
    pub fn new(activation: ActivationKind) -> Self {
        Self {
            activation,
            loss: OutputLoss::default(),
            shape: TensorShape::new(0, 0, 0),
        }
    }

    /// Selects the output-delta variant.
    pub fn with_loss(mut self, loss: OutputLoss) -> Self {
        self.loss = loss;
        self
    }

    pub fn activation(&self) -> ActivationKind {
        self.activation
    }

    pub fn loss(&self) -> OutputLoss {
        self.loss
    }
}

impl Layer for ActivationLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Activation
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let activation = self.activation;
        let values = input
            .data()
            .par_iter()
            .map(|&x| activation.activate(x))
            .collect::<Result<Vec<f32>>>()?;
        Tensor::from_vec(input.width(), input.height(), input.depth(), values)
    }

    fn backward(
        &self,
        deltas: &Tensor,
        input: &Tensor,
        output: &Tensor,
        _gradients: &mut ParamGradients,
    ) -> Result<Tensor> {
        check_shape("activation deltas", deltas, output.shape())?;
        let activation = self.activation;
        let values = deltas
            .data()
            .par_iter()
            .zip(output.data().par_iter())
            .map(|(&delta, &y)| activation.derivative(y).map(|d| delta * d))
            .collect::<Result<Vec<f32>>>()?;
        Tensor::from_vec(input.width(), input.height(), input.depth(), values)
    }

    fn output_deltas(&self, result: &Tensor, target: &Tensor) -> Result<Tensor> {
        check_shape("activation target", target, result.shape())?;
        let loss = self.loss;
        let values = result
            .data()
            .iter()
            .zip(target.data().iter())
            .map(|(&y, &t)| loss.gradient(t, y))
            .collect();
        Tensor::from_vec(result.width(), result.height(), result.depth(), values)
    }

    fn calc_sizes(&mut self, input: TensorShape) -> Result<TensorShape> {
        if input.is_empty() {
            return Err(CnnError::config(format!(
                "activation cannot take empty input {}",
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
    fn test_nan_input_faults() {
        let layer = ActivationLayer::new(ActivationKind::Tanh);
        let input = Tensor::from_vec(2, 1, 1, vec![0.0, f32::NAN]).unwrap();
        assert!(matches!(layer.forward(&input), Err(CnnError::Numeric(_))));
    }

    #[test]
    fn test_backward_uses_output_derivative() {
        let layer = ActivationLayer::new(ActivationKind::Sigmoid);
        let input = Tensor::from_vec(1, 1, 1, vec![0.0]).unwrap();
        let output = layer.forward(&input).unwrap();
        let deltas = Tensor::from_vec(1, 1, 1, vec![2.0]).unwrap();

        let back = layer
            .backward(&deltas, &input, &output, &mut ParamGradients::empty())
            .unwrap();
        assert!((back.get(0, 0, 0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_output_delta_variants() {
        let result = Tensor::from_vec(2, 1, 1, vec![0.5, 2.0]).unwrap();
        let target = Tensor::from_vec(2, 1, 1, vec![1.0, 1.0]).unwrap();

        let ratio = ActivationLayer::new(ActivationKind::Identity);
        assert_eq!(ratio.output_deltas(&result, &target).unwrap().data(), &[-2.0, -0.5]);

        let difference =
            ActivationLayer::new(ActivationKind::Identity).with_loss(OutputLoss::Difference);
        assert_eq!(
            difference.output_deltas(&result, &target).unwrap().data(),
            &[-0.5, 1.0]
        );
    }
}
