//! Adam-style update with constant bias correction.

use crate::error::Result;
use crate::optimizers::{check_lengths, ensure_finite, MomentState, Optimizer};

/// Added under the square root of the second moment.
pub const ADAM_EPSILON: f32 = 1e-8;

/// Adam-style optimizer.
///
/// The moment estimates are corrected by the constant factors `1 − pulse`
/// and `1 − momentum` rather than by powers of the step count:
///
/// ```text
/// m = pulse * m + (1 - pulse) * gradient
/// v = momentum * v + (1 - momentum) * gradient²
/// m_hat = m / (1 - pulse)
/// v_hat = v / (1 - momentum)
/// parameter = parameter - α * m_hat / √(v_hat + ε)
/// ```
///
/// The first step therefore has magnitude α; under a constant gradient later
/// steps settle at `α * √(1 − momentum) / (1 − pulse)`.
///
/// # Fields
///
/// * `learning_rate` - The step size α
/// * `pulse` - Decay of the first moment (typically 0.9)
/// * `momentum` - Decay of the second moment (typically 0.999)
///
/// # Example
///
/// ```
/// use rust_cnn::optimizers::{Adam, MomentState, Optimizer};
///
/// let optimizer = Adam::new(0.001, 0.9, 0.999);
/// let mut params = vec![1.0];
/// let mut grads = vec![0.5];
/// let mut state = MomentState::new(1);
///
/// optimizer.update(&mut params, &mut grads, &mut state).unwrap();
/// assert!((params[0] - 0.999).abs() < 1e-5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adam {
    learning_rate: f32,
    pulse: f32,
    momentum: f32,
}

impl Adam {
    pub fn new(learning_rate: f32, pulse: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            pulse,
            momentum,
        }
    }

    pub fn pulse(&self) -> f32 {
        self.pulse
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }
}

impl Optimizer for Adam {
    fn update(
        &self,
        parameters: &mut [f32],
        gradients: &mut [f32],
        state: &mut MomentState,
    ) -> Result<()> {
        check_lengths(parameters, gradients, state);
        ensure_finite(gradients, "adam")?;

        let first_correction = 1.0 - self.pulse;
        let second_correction = 1.0 - self.momentum;
        let (first, second) = state.moments_mut();

        for (((param, grad), m), v) in parameters
            .iter_mut()
            .zip(gradients.iter_mut())
            .zip(first.iter_mut())
            .zip(second.iter_mut())
        {
            let g = *grad;
            *m = self.pulse * *m + (1.0 - self.pulse) * g;
            *v = self.momentum * *v + (1.0 - self.momentum) * g * g;

            let m_hat = *m / first_correction;
            let v_hat = *v / second_correction;
            *param -= self.learning_rate * m_hat / (v_hat + ADAM_EPSILON).sqrt();
            *grad = 0.0;
        }
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}
