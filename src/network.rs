//! Ordered composition of layers.
//!
//! The network owns its layers and the declared input shape. Every change to
//! either re-runs shape inference top-down, so a network that accepted all its
//! layers has consistent shapes end to end.
//!
//! Batch back-propagation runs samples in parallel. Each worker folds its
//! samples' parameter gradients into one private buffer set; the sets are
//! summed and only then added to the layers' accumulators.

use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::error::{CnnError, Result};
use crate::layers::gradients::add_layer_gradients;
use crate::layers::{Layer, ParamGradients};
use crate::optimizers::{Adam, Momentum, Sgd, UpdateRule};
use crate::tensor::{Tensor, TensorShape};
use crate::weights::{WeightSink, WeightSource};

/// One training example.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub input: Tensor,
    pub target: Tensor,
}

impl Sample {
    pub fn new(input: Tensor, target: Tensor) -> Self {
        Self { input, target }
    }
}

/// Output of a timed forward pass.
#[derive(Debug, Clone)]
pub struct Inference {
    pub output: Tensor,
    pub elapsed: Duration,
}

/// Outputs of a timed batch forward pass.
#[derive(Debug, Clone)]
pub struct BatchInference {
    pub outputs: Vec<Tensor>,
    pub elapsed: Duration,
}

/// A feed-forward chain of layers.
///
/// # Example
///
/// ```
/// use rust_cnn::layers::{ActivationLayer, ConvolutionLayer};
/// use rust_cnn::network::Network;
/// use rust_cnn::tensor::{Tensor, TensorShape};
/// use rust_cnn::utils::{ActivationKind, SimpleRng};
///
/// let mut rng = SimpleRng::new(7);
/// let mut network = Network::new(TensorShape::new(1, 8, 8));
/// network
///     .add_layer(Box::new(ConvolutionLayer::new(3, 3, 1, 4, 2, 1, &mut rng).unwrap()))
///     .unwrap();
/// network
///     .add_layer(Box::new(ActivationLayer::new(ActivationKind::Sigmoid)))
///     .unwrap();
///
/// assert_eq!(network.output_shape(), TensorShape::new(4, 4, 4));
/// let output = network.forward_one(&Tensor::new(8, 8, 1)).unwrap();
/// assert_eq!(output.shape(), TensorShape::new(4, 4, 4));
/// ```
pub struct Network {
    input_shape: TensorShape,
    layers: Vec<Box<dyn Layer>>,
}

impl Network {
    pub fn new(input_shape: TensorShape) -> Self {
        Self {
            input_shape,
            layers: Vec::new(),
        }
    }

    pub fn input_shape(&self) -> TensorShape {
        self.input_shape
    }

    /// Shape of the final output (the input shape of an empty network).
    pub fn output_shape(&self) -> TensorShape {
        self.layers
            .last()
            .map(|layer| layer.output_shape())
            .unwrap_or(self.input_shape)
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Box<dyn Layer>] {
        &mut self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Changes the input shape and re-infers every layer's shape.
    ///
    /// # Errors
    ///
    /// Configuration errors from shape inference. The previous shape is then
    /// restored; batch-norm statistics reached before the failing layer are
    /// reset if their channel count changed on the way.
    pub fn set_input_shape(&mut self, shape: TensorShape) -> Result<()> {
        let previous = self.input_shape;
        self.input_shape = shape;
        if let Err(e) = self.calc_sizes() {
            self.input_shape = previous;
            if let Err(restore) = self.calc_sizes() {
                log::debug!("previous input shape {} does not fit either: {}", previous, restore);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Appends a layer and re-infers shapes.
    ///
    /// # Errors
    ///
    /// Configuration errors from shape inference, e.g. a filter depth that
    /// does not match the previous layer's output. The layer is not kept.
    pub fn add_layer(&mut self, layer: Box<dyn Layer>) -> Result<()> {
        self.layers.push(layer);
        if let Err(e) = self.calc_sizes() {
            self.layers.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Appends several layers and re-infers shapes once.
    pub fn add_layers<I>(&mut self, layers: I) -> Result<()>
    where
        I: IntoIterator<Item = Box<dyn Layer>>,
    {
        let before = self.layers.len();
        self.layers.extend(layers);
        if let Err(e) = self.calc_sizes() {
            self.layers.truncate(before);
            return Err(e);
        }
        Ok(())
    }

    pub fn clear_layers(&mut self) {
        self.layers.clear();
    }

    fn calc_sizes(&mut self) -> Result<()> {
        let mut shape = self.input_shape;
        if shape.is_empty() {
            return Err(CnnError::config(format!(
                "network input shape {} is empty",
                shape
            )));
        }
        for layer in self.layers.iter_mut() {
            shape = layer.calc_sizes(shape)?;
        }
        Ok(())
    }

    /// Checks that the network can be trained: it has layers, every layer has
    /// a forward pass and the last one can compute output deltas.
    pub fn validate(&self) -> Result<()> {
        let last = self
            .layers
            .last()
            .ok_or_else(|| CnnError::unsupported("network has no layers"))?;
        if let Some((i, layer)) = self
            .layers
            .iter()
            .enumerate()
            .find(|(_, layer)| !layer.kind().supports_forward())
        {
            return Err(CnnError::unsupported(format!(
                "layer {} ({}) has no forward pass",
                i,
                layer.kind()
            )));
        }
        if !last.kind().supports_output_deltas() {
            return Err(CnnError::unsupported(format!(
                "{} layer cannot be the last layer",
                last.kind()
            )));
        }
        Ok(())
    }

    fn check_input(&self, image: &Tensor) -> Result<()> {
        if image.shape() != self.input_shape {
            return Err(CnnError::Shape(format!(
                "input has shape {}, network expects {}",
                image.shape(),
                self.input_shape
            )));
        }
        Ok(())
    }

    /// Runs every layer and returns all intermediate tensors.
    ///
    /// Index 0 is (a copy of) the input and index `i + 1` is the output of
    /// layer `i`.
    pub fn forward_all(&self, image: &Tensor) -> Result<Vec<Tensor>> {
        self.check_input(image)?;
        let mut results = Vec::with_capacity(self.layers.len() + 1);
        results.push(image.clone());
        for layer in &self.layers {
            let next = layer.forward(&results[results.len() - 1])?;
            results.push(next);
        }
        Ok(results)
    }

    /// Runs every layer and returns only the final output.
    pub fn forward_one(&self, image: &Tensor) -> Result<Tensor> {
        self.check_input(image)?;
        let mut current = image.clone();
        for layer in &self.layers {
            current = layer.forward(&current)?;
        }
        Ok(current)
    }

    /// Forward passes for many images, in parallel.
    pub fn forward_many(&self, images: &[Tensor]) -> Result<Vec<Tensor>> {
        images.par_iter().map(|image| self.forward_one(image)).collect()
    }

    /// Forward pass with wall-clock timing.
    pub fn infer(&self, image: &Tensor) -> Result<Inference> {
        let start = Instant::now();
        let output = self.forward_one(image)?;
        let elapsed = start.elapsed();
        log::debug!("Inference took {:.3} ms", elapsed.as_secs_f64() * 1000.0);
        Ok(Inference { output, elapsed })
    }

    /// Parallel forward passes with wall-clock timing of the whole batch.
    pub fn infer_many(&self, images: &[Tensor]) -> Result<BatchInference> {
        let start = Instant::now();
        let outputs = self.forward_many(images)?;
        let elapsed = start.elapsed();
        log::debug!(
            "Inference of {} images took {:.3} ms",
            images.len(),
            elapsed.as_secs_f64() * 1000.0
        );
        Ok(BatchInference { outputs, elapsed })
    }

    /// Zeroed gradient buffers, one per layer.
    pub fn zero_gradients(&self) -> Vec<ParamGradients> {
        self.layers.iter().map(|layer| layer.zero_gradients()).collect()
    }

    /// Back-propagates one sample into fresh per-layer gradient buffers
    /// without touching the layers' accumulators.
    pub fn compute_gradients(&self, image: &Tensor, target: &Tensor) -> Result<Vec<ParamGradients>> {
        let mut gradients = self.zero_gradients();
        self.backward_into(image, target, &mut gradients)?;
        Ok(gradients)
    }

    /// Back-propagates one sample and adds its parameter gradients into
    /// `gradients` (one buffer per layer).
    fn backward_into(
        &self,
        image: &Tensor,
        target: &Tensor,
        gradients: &mut [ParamGradients],
    ) -> Result<()> {
        let last = self
            .layers
            .last()
            .ok_or_else(|| CnnError::unsupported("network has no layers"))?;
        if target.shape() != self.output_shape() {
            return Err(CnnError::Shape(format!(
                "target has shape {}, network produces {}",
                target.shape(),
                self.output_shape()
            )));
        }
        debug_assert_eq!(gradients.len(), self.layers.len());

        let results = self.forward_all(image)?;
        let mut deltas = last.output_deltas(&results[self.layers.len()], target)?;

        for i in (0..self.layers.len()).rev() {
            deltas = self.layers[i].backward(&deltas, &results[i], &results[i + 1], &mut gradients[i])?;
        }
        Ok(())
    }

    /// Back-propagates one sample and adds its gradients to the accumulators.
    pub fn backward(&mut self, image: &Tensor, target: &Tensor) -> Result<()> {
        let gradients = self.compute_gradients(image, target)?;
        self.accumulate(&gradients);
        Ok(())
    }

    /// Back-propagates a batch in parallel and adds the summed gradients to
    /// the accumulators. Nothing is accumulated when any sample fails.
    pub fn backward_batch(&mut self, samples: &[&Sample]) -> Result<()> {
        let total = samples
            .par_iter()
            .try_fold(
                || self.zero_gradients(),
                |mut acc, sample| {
                    self.backward_into(&sample.input, &sample.target, &mut acc)?;
                    Ok::<_, CnnError>(acc)
                },
            )
            .try_reduce_with(|mut acc, gradients| {
                add_layer_gradients(&mut acc, &gradients);
                Ok(acc)
            });
        if let Some(total) = total {
            let total = total?;
            self.accumulate(&total);
        }
        Ok(())
    }

    fn accumulate(&mut self, gradients: &[ParamGradients]) {
        for (layer, gradient) in self.layers.iter_mut().zip(gradients.iter()) {
            layer.accumulate(gradient);
        }
    }

    fn update(&mut self, rule: UpdateRule) -> Result<()> {
        for layer in self.layers.iter_mut() {
            layer.update(&rule)?;
        }
        Ok(())
    }

    /// Plain descent on learnable layers and on batch-norm scales.
    pub fn apply_update(&mut self, rate: f32) -> Result<()> {
        self.update(UpdateRule::Sgd(Sgd::new(rate)))
    }

    /// Momentum rule on learnable layers.
    pub fn apply_update_momentum(&mut self, rate: f32, pulse: f32) -> Result<()> {
        self.update(UpdateRule::Momentum(Momentum::new(rate, pulse)))
    }

    /// Adam-style rule on learnable layers.
    pub fn apply_update_adam(&mut self, rate: f32, pulse: f32, momentum: f32) -> Result<()> {
        self.update(UpdateRule::Adam(Adam::new(rate, pulse, momentum)))
    }

    /// Reads every layer's weights in order.
    pub fn load_weights(&mut self, source: &mut dyn WeightSource) -> Result<()> {
        for layer in self.layers.iter_mut() {
            layer.read_weights(source)?;
        }
        Ok(())
    }

    /// Writes every layer's weights in order.
    pub fn save_weights(&self, sink: &mut dyn WeightSink) -> Result<()> {
        for layer in &self.layers {
            layer.write_weights(sink)?;
        }
        Ok(())
    }

    /// Number of values in this network's weight stream.
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.parameter_count()).sum()
    }
}
