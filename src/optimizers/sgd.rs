//! Plain gradient descent: `parameter = parameter - learning_rate * gradient`

use crate::error::Result;
use crate::optimizers::{check_lengths, ensure_finite, MomentState, Optimizer};

/// Gradient descent without history.
///
/// `w = w - η * ∇L/∂w`
///
/// # Example
///
/// ```
/// use rust_cnn::optimizers::{Optimizer, Sgd};
///
/// let optimizer = Sgd::new(0.01);
/// assert_eq!(optimizer.learning_rate(), 0.01);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sgd {
    learning_rate: f32,
}

impl Sgd {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn update(
        &self,
        parameters: &mut [f32],
        gradients: &mut [f32],
        state: &mut MomentState,
    ) -> Result<()> {
        check_lengths(parameters, gradients, state);
        ensure_finite(gradients, "sgd")?;

        for (param, grad) in parameters.iter_mut().zip(gradients.iter_mut()) {
            *param -= self.learning_rate * *grad;
            *grad = 0.0;
        }
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}
