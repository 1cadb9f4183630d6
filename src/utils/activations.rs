//! Activation functions and their derivatives.
//!
//! Derivatives take the function's *output* `y = f(x)`, which is what the
//! backward pass has at hand. The free functions are raw formulas;
//! [`ActivationKind`] wraps them with the NaN/infinity guard used by
//! activation layers.

use serde::{Deserialize, Serialize};

use crate::error::{CnnError, Result};

/// Negative slope of the leaky ReLU.
pub const LEAKY_RELU_SLOPE: f32 = 0.01;
/// Saturation value of the ELU for negative inputs.
pub const ELU_ALPHA: f32 = 0.1;
/// Slope of the linear activation.
pub const LINEAR_SLOPE: f32 = 6.0;

pub fn relu(x: f32) -> f32 {
    if x > 0.0 {
        x
    } else {
        0.0
    }
}

pub fn relu_derivative(y: f32) -> f32 {
    if y > 0.0 {
        1.0
    } else {
        0.0
    }
}

pub fn leaky_relu(x: f32) -> f32 {
    if x >= 0.0 {
        x
    } else {
        LEAKY_RELU_SLOPE * x
    }
}

pub fn leaky_relu_derivative(y: f32) -> f32 {
    if y >= 0.0 {
        1.0
    } else {
        LEAKY_RELU_SLOPE
    }
}

pub fn elu(x: f32) -> f32 {
    if x >= 0.0 {
        x
    } else {
        ELU_ALPHA * (x.exp() - 1.0)
    }
}

/// For negative inputs `d/dx α(eˣ − 1) = αeˣ = y + α`.
pub fn elu_derivative(y: f32) -> f32 {
    if y >= 0.0 {
        1.0
    } else {
        y + ELU_ALPHA
    }
}

/// Returns 1 / (1 + exp(-x)).
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Sigmoid derivative assuming y = sigmoid(x).
pub fn sigmoid_derivative(y: f32) -> f32 {
    y * (1.0 - y)
}

pub fn tanh(x: f32) -> f32 {
    1.0 - 2.0 / ((2.0 * x).exp() + 1.0)
}

pub fn tanh_derivative(y: f32) -> f32 {
    1.0 - y * y
}

pub fn linear(x: f32) -> f32 {
    LINEAR_SLOPE * x
}

pub fn linear_derivative(_y: f32) -> f32 {
    LINEAR_SLOPE
}

/// Softmax over one group of values, in place.
///
/// Uses the max-subtraction trick to avoid overflow with large inputs.
pub fn softmax_in_place(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let max_value = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let mut sum = 0.0f32;
    for value in values.iter_mut() {
        *value = (*value - max_value).exp();
        sum += *value;
    }

    let inv_sum = 1.0 / sum;
    for value in values.iter_mut() {
        *value *= inv_sum;
    }
}

/// Pointwise activation function of an activation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationKind {
    #[serde(rename = "relu")]
    ReLU,
    #[serde(rename = "leaky_relu")]
    LeakyReLU,
    #[serde(rename = "elu")]
    ELU,
    Sigmoid,
    Tanh,
    Linear,
    Identity,
}

impl ActivationKind {
    /// Applies the function, rejecting non-finite input.
    pub fn activate(self, x: f32) -> Result<f32> {
        self.guard(x)?;
        Ok(match self {
            ActivationKind::ReLU => relu(x),
            ActivationKind::LeakyReLU => leaky_relu(x),
            ActivationKind::ELU => elu(x),
            ActivationKind::Sigmoid => sigmoid(x),
            ActivationKind::Tanh => tanh(x),
            ActivationKind::Linear => linear(x),
            ActivationKind::Identity => x,
        })
    }

    /// Derivative evaluated at the forward output `y`.
    pub fn derivative(self, y: f32) -> Result<f32> {
        self.guard(y)?;
        Ok(match self {
            ActivationKind::ReLU => relu_derivative(y),
            ActivationKind::LeakyReLU => leaky_relu_derivative(y),
            ActivationKind::ELU => elu_derivative(y),
            ActivationKind::Sigmoid => sigmoid_derivative(y),
            ActivationKind::Tanh => tanh_derivative(y),
            ActivationKind::Linear => linear_derivative(y),
            ActivationKind::Identity => 1.0,
        })
    }

    fn guard(self, value: f32) -> Result<()> {
        if self != ActivationKind::Identity && !value.is_finite() {
            return Err(CnnError::Numeric(format!(
                "{:?} received non-finite value {}",
                self, value
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-6;

    #[test]
    fn test_fixed_points() {
        assert_eq!(relu(0.0), 0.0);
        assert!((sigmoid(0.0) - 0.5).abs() < EPSILON);
        assert!(tanh(0.0).abs() < EPSILON);
        assert_eq!(elu(0.0), 0.0);
    }

    #[test]
    fn test_relu_derivative_at_output() {
        assert_eq!(relu_derivative(relu(2.0)), 1.0);
        assert_eq!(relu_derivative(relu(-2.0)), 0.0);
    }

    #[test]
    fn test_leaky_relu_keeps_sign() {
        assert!((leaky_relu(-2.0) + 0.02).abs() < EPSILON);
        assert_eq!(leaky_relu_derivative(leaky_relu(-2.0)), LEAKY_RELU_SLOPE);
    }

    #[test]
    fn test_elu_derivative_matches_closed_form() {
        let x = -1.5f32;
        let expected = ELU_ALPHA * x.exp();
        assert!((elu_derivative(elu(x)) - expected).abs() < EPSILON);
    }

    #[test]
    fn test_tanh_matches_std() {
        for &x in &[-3.0f32, -0.5, 0.25, 2.0] {
            assert!((tanh(x) - x.tanh()).abs() < 1e-5);
        }
    }

    #[test]
    fn test_identity_skips_guard() {
        assert!(ActivationKind::Identity.activate(f32::NAN).is_ok());
        assert!(ActivationKind::Sigmoid.activate(f32::NAN).is_err());
        assert!(ActivationKind::ReLU.derivative(f32::INFINITY).is_err());
    }

    #[test]
    fn test_softmax_numerical_stability() {
        let mut data = vec![1000.0, 1001.0, 1002.0];
        softmax_in_place(&mut data);
        let sum: f32 = data.iter().sum();
        assert!((sum - 1.0).abs() < EPSILON);
        assert!(data.iter().all(|x| x.is_finite()));
    }
}
