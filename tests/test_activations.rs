// Tests for activation functions, their output-based derivatives and the
// activation / softmax layers built on them.

use approx::assert_relative_eq;
use rust_cnn::layers::{ActivationLayer, Layer, ParamGradients, SoftmaxLayer};
use rust_cnn::tensor::Tensor;
use rust_cnn::utils::activations::*;
use rust_cnn::utils::{ActivationKind, OutputLoss};
use rust_cnn::CnnError;

// ============================================================================
// Fixed Point Tests
// ============================================================================

mod fixed_point_tests {
    use super::*;

    #[test]
    fn test_values_at_zero() {
        assert_eq!(relu(0.0), 0.0);
        assert_eq!(leaky_relu(0.0), 0.0);
        assert_eq!(elu(0.0), 0.0);
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert_relative_eq!(tanh(0.0), 0.0);
        assert_eq!(linear(0.0), 0.0);
    }

    #[test]
    fn test_negative_branches() {
        assert_eq!(relu(-3.0), 0.0);
        assert_relative_eq!(leaky_relu(-3.0), -0.03, epsilon = 1e-7);
        assert_relative_eq!(elu(-1.0), 0.1 * ((-1.0f32).exp() - 1.0), epsilon = 1e-7);
        assert_relative_eq!(linear(-0.5), -3.0);
    }

    #[test]
    fn test_sigmoid_saturates() {
        assert!(sigmoid(20.0) > 0.999);
        assert!(sigmoid(-20.0) < 0.001);
    }
}

// ============================================================================
// Derivative Tests (evaluated at the forward output)
// ============================================================================

mod derivative_tests {
    use super::*;

    fn numeric(f: fn(f32) -> f32, x: f32) -> f32 {
        let h = 1e-3;
        (f(x + h) - f(x - h)) / (2.0 * h)
    }

    #[test]
    fn test_sigmoid_derivative_matches_finite_difference() {
        for &x in &[-2.0f32, -0.3, 0.0, 0.7, 1.5] {
            let analytic = sigmoid_derivative(sigmoid(x));
            assert_relative_eq!(analytic, numeric(sigmoid, x), epsilon = 1e-3);
        }
    }

    #[test]
    fn test_tanh_derivative_matches_finite_difference() {
        for &x in &[-1.5f32, -0.2, 0.4, 1.1] {
            let analytic = tanh_derivative(tanh(x));
            assert_relative_eq!(analytic, numeric(tanh, x), epsilon = 1e-3);
        }
    }

    #[test]
    fn test_elu_derivative_on_negative_branch() {
        let x = -0.8f32;
        assert_relative_eq!(elu_derivative(elu(x)), numeric(elu, x), epsilon = 1e-3);
        assert_eq!(elu_derivative(elu(0.5)), 1.0);
    }

    #[test]
    fn test_relu_derivative_is_zero_when_inactive() {
        assert_eq!(relu_derivative(relu(1.2)), 1.0);
        assert_eq!(relu_derivative(relu(-1.2)), 0.0);
        assert_eq!(relu_derivative(0.0), 0.0);
    }

    #[test]
    fn test_linear_derivative_is_slope() {
        assert_eq!(linear_derivative(123.0), LINEAR_SLOPE);
    }
}

// ============================================================================
// Activation Layer Tests
// ============================================================================

mod layer_tests {
    use super::*;

    #[test]
    fn test_forward_applies_function_pointwise() {
        let layer = ActivationLayer::new(ActivationKind::ReLU);
        let input = Tensor::from_vec(2, 2, 1, vec![-1.0, 2.0, 0.0, -0.5]).unwrap();
        let output = layer.forward(&input).unwrap();
        assert_eq!(output.data(), &[0.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_backward_masks_inactive_units() {
        let layer = ActivationLayer::new(ActivationKind::ReLU);
        let input = Tensor::from_vec(2, 1, 1, vec![-1.0, 2.0]).unwrap();
        let output = layer.forward(&input).unwrap();
        let deltas = Tensor::from_vec(2, 1, 1, vec![5.0, 5.0]).unwrap();

        let back = layer
            .backward(&deltas, &input, &output, &mut ParamGradients::empty())
            .unwrap();
        assert_eq!(back.data(), &[0.0, 5.0]);
    }

    #[test]
    fn test_output_deltas_per_loss() {
        let result = Tensor::from_vec(2, 1, 1, vec![0.5, 0.25]).unwrap();
        let target = Tensor::from_vec(2, 1, 1, vec![1.0, 0.0]).unwrap();

        let ratio = ActivationLayer::new(ActivationKind::Sigmoid);
        let deltas = ratio.output_deltas(&result, &target).unwrap();
        assert_relative_eq!(deltas.data()[0], -2.0);
        assert_eq!(deltas.data()[1], 0.0);

        let difference =
            ActivationLayer::new(ActivationKind::Sigmoid).with_loss(OutputLoss::Difference);
        let deltas = difference.output_deltas(&result, &target).unwrap();
        assert_relative_eq!(deltas.data()[0], -0.5);
        assert_relative_eq!(deltas.data()[1], 0.25);
    }

    #[test]
    fn test_infinite_input_is_numeric_fault() {
        let layer = ActivationLayer::new(ActivationKind::Sigmoid);
        let input = Tensor::from_vec(1, 1, 1, vec![f32::INFINITY]).unwrap();
        assert!(matches!(layer.forward(&input), Err(CnnError::Numeric(_))));
    }
}

// ============================================================================
// Softmax Layer Tests
// ============================================================================

mod softmax_tests {
    use super::*;

    #[test]
    fn test_each_position_sums_to_one() {
        let layer = SoftmaxLayer::new();
        let input =
            Tensor::from_vec(2, 1, 3, vec![1.0, 2.0, 3.0, -5.0, 0.0, 900.0]).unwrap();
        let output = layer.forward(&input).unwrap();

        for x in 0..2 {
            let sum: f32 = output.channels(x, 0).iter().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-6);
        }
        assert!(output.is_finite());
        assert!(output.get(0, 0, 2) > output.get(0, 0, 1));
    }

    #[test]
    fn test_backward_uses_diagonal_derivative() {
        let layer = SoftmaxLayer::new();
        let input = Tensor::from_vec(1, 1, 2, vec![0.0, 0.0]).unwrap();
        let output = layer.forward(&input).unwrap();
        let deltas = Tensor::from_vec(1, 1, 2, vec![1.0, 2.0]).unwrap();

        let back = layer
            .backward(&deltas, &input, &output, &mut ParamGradients::empty())
            .unwrap();
        // y = 0.5 so y(1 - y) = 0.25
        assert_relative_eq!(back.data()[0], 0.25);
        assert_relative_eq!(back.data()[1], 0.5);
    }
}
