//! Weight-update rules for learnable layers.
//!
//! Layers accumulate gradients over a batch; an optimizer then turns the
//! accumulated gradient into a parameter step and clears the accumulator.
//! Rules that need history keep it in a [`MomentState`] owned by the layer,
//! one per parameter buffer, so a single optimizer value can be shared by
//! every layer of a network.
//!
//! # Available Rules
//!
//! - [`Sgd`]: plain gradient descent
//! - [`Momentum`]: gradient descent with a decaying previous step ("pulse")
//! - [`Adam`]: first/second moment estimates with constant bias correction
//!
//! # Example
//!
//! ```
//! use rust_cnn::optimizers::{MomentState, Optimizer, Sgd};
//!
//! let optimizer = Sgd::new(0.5);
//! let mut params = vec![1.0, 2.0];
//! let mut grads = vec![1.0, -2.0];
//! let mut state = MomentState::new(2);
//!
//! optimizer.update(&mut params, &mut grads, &mut state).unwrap();
//! assert_eq!(params, vec![0.5, 3.0]);
//! assert_eq!(grads, vec![0.0, 0.0]);
//! ```

pub mod adam;
pub mod momentum;
pub mod sgd;
pub mod state;

pub use adam::Adam;
pub use momentum::Momentum;
pub use sgd::Sgd;
pub use state::MomentState;

use crate::error::{CnnError, Result};

/// Core trait for parameter update rules.
pub trait Optimizer {
    /// Applies one step to `parameters` from the accumulated `gradients`,
    /// then zeroes `gradients`.
    ///
    /// # Arguments
    ///
    /// * `parameters` - Mutable slice of parameters to update (weights or biases)
    /// * `gradients` - Accumulated gradient of each parameter
    /// * `state` - Moment history for this parameter buffer
    ///
    /// # Errors
    ///
    /// Returns [`CnnError::Numeric`] without touching `parameters` when a
    /// gradient is NaN or infinite.
    ///
    /// # Panics
    ///
    /// Panics if the three buffers have different lengths.
    fn update(
        &self,
        parameters: &mut [f32],
        gradients: &mut [f32],
        state: &mut MomentState,
    ) -> Result<()>;

    /// Get the learning rate for this optimizer.
    fn learning_rate(&self) -> f32;
}

/// The update rule a network applies after a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateRule {
    Sgd(Sgd),
    Momentum(Momentum),
    Adam(Adam),
}

impl Optimizer for UpdateRule {
    fn update(
        &self,
        parameters: &mut [f32],
        gradients: &mut [f32],
        state: &mut MomentState,
    ) -> Result<()> {
        match self {
            UpdateRule::Sgd(rule) => rule.update(parameters, gradients, state),
            UpdateRule::Momentum(rule) => rule.update(parameters, gradients, state),
            UpdateRule::Adam(rule) => rule.update(parameters, gradients, state),
        }
    }

    fn learning_rate(&self) -> f32 {
        match self {
            UpdateRule::Sgd(rule) => rule.learning_rate(),
            UpdateRule::Momentum(rule) => rule.learning_rate(),
            UpdateRule::Adam(rule) => rule.learning_rate(),
        }
    }
}

/// Fails with [`CnnError::Numeric`] if any gradient is NaN or infinite.
pub fn ensure_finite(gradients: &[f32], what: &str) -> Result<()> {
    match gradients.iter().position(|g| !g.is_finite()) {
        Some(i) => Err(CnnError::Numeric(format!(
            "{} gradient {} is {}",
            what, i, gradients[i]
        ))),
        None => Ok(()),
    }
}

pub(crate) fn check_lengths(parameters: &[f32], gradients: &[f32], state: &MomentState) {
    assert_eq!(
        parameters.len(),
        gradients.len(),
        "Parameters and gradients must have the same length"
    );
    assert_eq!(
        parameters.len(),
        state.len(),
        "Optimizer state must mirror the parameters"
    );
}
