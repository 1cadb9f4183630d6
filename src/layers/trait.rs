//! Layer trait definition for network layers
//!
//! This module defines the core Layer trait that all layer kinds implement.
//! The trait provides a common interface for forward propagation, backward
//! propagation, output-delta computation, shape inference and parameter
//! updates.

use crate::error::{CnnError, Result};
use crate::layers::{LayerKind, LearnableParams, ParamGradients};
use crate::optimizers::UpdateRule;
use crate::tensor::{Tensor, TensorShape};
use crate::weights::{WeightSink, WeightSource};

/// Core trait for network layers.
///
/// Forward and backward passes take `&self`: per-sample gradients are written
/// into a caller-owned [`ParamGradients`] buffer, so many samples can run
/// through the same layer concurrently. Buffers are summed afterwards and
/// handed to [`Layer::accumulate`] before an update.
///
/// # Example
///
/// ```ignore
/// let output = layer.forward(&input)?;
/// let mut gradients = layer.zero_gradients();
/// let input_deltas = layer.backward(&output_deltas, &input, &output, &mut gradients)?;
/// layer.accumulate(&gradients);
/// layer.update(&UpdateRule::Sgd(Sgd::new(0.01)))?;
/// ```
pub trait Layer: Send + Sync {
    /// Which entry of the layer catalog this is.
    fn kind(&self) -> LayerKind;

    /// Forward propagation through the layer.
    ///
    /// # Errors
    ///
    /// [`CnnError::Unsupported`] for kinds without a forward path and
    /// [`CnnError::Numeric`] when an activation meets NaN or infinity.
    fn forward(&self, input: &Tensor) -> Result<Tensor>;

    /// Backward propagation through the layer.
    ///
    /// # Arguments
    ///
    /// * `deltas` - Gradient of the loss w.r.t. this layer's output
    /// * `input` - The input of the matching forward pass
    /// * `output` - The output of the matching forward pass
    /// * `gradients` - Per-sample buffer receiving parameter gradients
    ///
    /// Returns the gradient of the loss w.r.t. `input`.
    fn backward(
        &self,
        deltas: &Tensor,
        input: &Tensor,
        output: &Tensor,
        gradients: &mut ParamGradients,
    ) -> Result<Tensor>;

    /// Loss gradient w.r.t. the final output when this layer is last.
    fn output_deltas(&self, result: &Tensor, target: &Tensor) -> Result<Tensor> {
        let _ = (result, target);
        Err(CnnError::unsupported(format!(
            "{} layer cannot compute output deltas",
            self.kind()
        )))
    }

    /// Infers the output shape for `input`, sizing internal buffers.
    fn calc_sizes(&mut self, input: TensorShape) -> Result<TensorShape>;

    fn input_shape(&self) -> TensorShape;

    fn output_shape(&self) -> TensorShape;

    /// A zeroed buffer shaped like this layer's parameters.
    fn zero_gradients(&self) -> ParamGradients {
        ParamGradients::empty()
    }

    /// Adds a (batch-summed) gradient buffer to the layer's accumulators.
    fn accumulate(&mut self, gradients: &ParamGradients) {
        let _ = gradients;
    }

    /// Accumulated gradients awaiting the next update, if the layer has any.
    fn accumulated_gradients(&self) -> Option<&ParamGradients> {
        None
    }

    /// Applies `rule` to the accumulated gradients and clears them.
    fn update(&mut self, rule: &UpdateRule) -> Result<()> {
        let _ = rule;
        Ok(())
    }

    /// Filters and offsets of convolution and deconvolution layers.
    fn learnable(&self) -> Option<&LearnableParams> {
        None
    }

    fn learnable_mut(&mut self) -> Option<&mut LearnableParams> {
        None
    }

    /// Total number of values this layer reads from a weight stream.
    fn parameter_count(&self) -> usize {
        0
    }

    /// Reads this layer's values from the stream, in stream order.
    fn read_weights(&mut self, source: &mut dyn WeightSource) -> Result<()> {
        let _ = source;
        Ok(())
    }

    /// Writes this layer's values to the stream, in stream order.
    fn write_weights(&self, sink: &mut dyn WeightSink) -> Result<()> {
        let _ = sink;
        Ok(())
    }
}

/// Rejects a tensor whose shape differs from `expected`.
pub(crate) fn check_shape(what: &str, tensor: &Tensor, expected: TensorShape) -> Result<()> {
    if tensor.shape() != expected {
        return Err(CnnError::Shape(format!(
            "{} has shape {}, expected {}",
            what,
            tensor.shape(),
            expected
        )));
    }
    Ok(())
}
