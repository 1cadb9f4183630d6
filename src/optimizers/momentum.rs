//! Gradient descent with a decaying previous step.

use crate::error::Result;
use crate::optimizers::{check_lengths, ensure_finite, MomentState, Optimizer};

/// Momentum ("pulse") rule.
///
/// ```text
/// Δ = pulse * Δ_prev − η * gradient
/// parameter = parameter + Δ
/// ```
///
/// `Δ_prev` is kept in the first-moment slot of the [`MomentState`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Momentum {
    learning_rate: f32,
    pulse: f32,
}

impl Momentum {
    pub fn new(learning_rate: f32, pulse: f32) -> Self {
        Self {
            learning_rate,
            pulse,
        }
    }

    pub fn pulse(&self) -> f32 {
        self.pulse
    }
}

impl Optimizer for Momentum {
    fn update(
        &self,
        parameters: &mut [f32],
        gradients: &mut [f32],
        state: &mut MomentState,
    ) -> Result<()> {
        check_lengths(parameters, gradients, state);
        ensure_finite(gradients, "momentum")?;

        let (previous, _) = state.moments_mut();
        for ((param, grad), prev) in parameters
            .iter_mut()
            .zip(gradients.iter_mut())
            .zip(previous.iter_mut())
        {
            let step = self.pulse * *prev - self.learning_rate * *grad;
            *param += step;
            *prev = step;
            *grad = 0.0;
        }
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_momentum_carries_previous_step() {
        let optimizer = Momentum::new(0.5, 0.5);
        let mut params = vec![0.0];
        let mut state = MomentState::new(1);

        let mut grads = vec![1.0];
        optimizer.update(&mut params, &mut grads, &mut state).unwrap();
        assert_eq!(params[0], -0.5);
        assert_eq!(state.first()[0], -0.5);

        // Zero gradient still moves by the decayed previous step.
        let mut grads = vec![0.0];
        optimizer.update(&mut params, &mut grads, &mut state).unwrap();
        assert_eq!(params[0], -0.75);
        assert_eq!(state.first()[0], -0.25);
    }

    #[test]
    fn test_zero_pulse_is_plain_descent() {
        let optimizer = Momentum::new(0.25, 0.0);
        let mut params = vec![1.0, 1.0];
        let mut grads = vec![2.0, -2.0];
        let mut state = MomentState::new(2);

        optimizer.update(&mut params, &mut grads, &mut state).unwrap();

        assert_eq!(params, vec![0.5, 1.5]);
        assert_eq!(grads, vec![0.0, 0.0]);
    }
}
