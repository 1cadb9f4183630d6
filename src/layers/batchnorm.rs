//! Batch normalization with externally supplied statistics.
//!
//! Per-channel mean and variance are loaded (from a weight stream or
//! [`BatchNormLayer::set_statistics`]) rather than estimated from batches.
//! A single learnable `scale` divides both statistics:
//!
//! ```text
//! y = (x − mean[c] / scale) / √(ε + variance[c] / scale)
//! ```
//!
//! Backward produces the exact derivative with respect to `scale`, and an
//! input gradient assembled from the gradients with respect to the mean, the
//! variance and the raw input.

use rayon::prelude::*;

use crate::error::{CnnError, Result};
use crate::layers::r#trait::check_shape;
use crate::layers::{Layer, LayerKind, ParamGradients};
use crate::optimizers::{MomentState, Optimizer, UpdateRule};
use crate::tensor::{Tensor, TensorShape};
use crate::weights::{WeightSink, WeightSource};

/// Added to the scaled variance before the square root.
pub const BATCH_NORM_EPSILON: f32 = 1e-5;

/// Batch normalization layer.
///
/// # Fields
///
/// * `mean` / `variance` - Per-channel statistics (default 0 and 1)
/// * `scale` - Learnable divisor of both statistics (default 1)
/// * `gradients` - Accumulated scale gradient
///
/// # Example
///
/// ```
/// use rust_cnn::layers::{BatchNormLayer, Layer};
/// use rust_cnn::tensor::{Tensor, TensorShape};
///
/// let mut layer = BatchNormLayer::new();
/// layer.calc_sizes(TensorShape::new(2, 4, 4)).unwrap();
/// layer.set_statistics(vec![1.0, -1.0], vec![4.0, 4.0]).unwrap();
///
/// let output = layer.forward(&Tensor::filled(TensorShape::new(2, 4, 4), 1.0)).unwrap();
/// assert!(output.get(0, 0, 0).abs() < 1e-6);
/// assert!((output.get(0, 0, 1) - 1.0).abs() < 1e-4);
/// ```
#[derive(Debug, Clone)]
pub struct BatchNormLayer {
    mean: Vec<f32>,
    variance: Vec<f32>,
    scale: f32,
    gradients: ParamGradients,
    scale_state: MomentState,
    input_shape: TensorShape,
}

impl Default for BatchNormLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchNormLayer {
    pub fn new() -> Self {
        Self {
            mean: Vec::new(),
            variance: Vec::new(),
            scale: 1.0,
            gradients: ParamGradients::empty(),
            scale_state: MomentState::new(1),
            input_shape: TensorShape::new(0, 0, 0),
        }
    }

    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    pub fn variance(&self) -> &[f32] {
        &self.variance
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }

    /// Replaces the per-channel statistics.
    ///
    /// # Errors
    ///
    /// [`CnnError::Shape`] when the lengths differ from each other or from
    /// the channel count fixed by `calc_sizes`.
    pub fn set_statistics(&mut self, mean: Vec<f32>, variance: Vec<f32>) -> Result<()> {
        if mean.len() != variance.len() || mean.len() != self.mean.len() {
            return Err(CnnError::Shape(format!(
                "batch norm expects {} channel statistics, got {} means and {} variances",
                self.mean.len(),
                mean.len(),
                variance.len()
            )));
        }
        self.mean = mean;
        self.variance = variance;
        Ok(())
    }

    /// Per-channel shift `mean / scale` and divisor `√(ε + variance / scale)`.
    fn channel_terms(&self) -> Result<(Vec<f32>, Vec<f32>)> {
        let shifts: Vec<f32> = self.mean.iter().map(|m| m / self.scale).collect();
        let divisors: Vec<f32> = self
            .variance
            .iter()
            .map(|v| (BATCH_NORM_EPSILON + v / self.scale).sqrt())
            .collect();

        if let Some(c) = (0..divisors.len())
            .find(|&c| !shifts[c].is_finite() || !divisors[c].is_finite() || divisors[c] <= 0.0)
        {
            return Err(CnnError::Numeric(format!(
                "batch norm channel {} cannot be normalized (mean {}, variance {}, scale {})",
                c, self.mean[c], self.variance[c], self.scale
            )));
        }
        Ok((shifts, divisors))
    }

    fn check_channels(&self, input: &Tensor) -> Result<()> {
        if input.depth() != self.mean.len() {
            return Err(CnnError::Shape(format!(
                "batch norm holds {} channels but input has {}",
                self.mean.len(),
                input.depth()
            )));
        }
        Ok(())
    }
}

impl Layer for BatchNormLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::BatchNorm
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        self.check_channels(input)?;
        let (shifts, divisors) = self.channel_terms()?;
        let depth = input.depth();

        let mut output = input.clone();
        output.data_mut().par_chunks_mut(depth).for_each(|cell| {
            for (c, value) in cell.iter_mut().enumerate() {
                *value = (*value - shifts[c]) / divisors[c];
            }
        });
        Ok(output)
    }

    fn backward(
        &self,
        deltas: &Tensor,
        input: &Tensor,
        _output: &Tensor,
        gradients: &mut ParamGradients,
    ) -> Result<Tensor> {
        self.check_channels(input)?;
        check_shape("batch norm deltas", deltas, input.shape())?;
        self.channel_terms()?;

        let depth = input.depth();
        let area = input.shape().area();
        let m = area as f32;
        let scale = self.scale;
        let x_data = input.data();
        let dy_data = deltas.data();

        let per_channel: Vec<(Vec<f32>, f32)> = (0..depth)
            .into_par_iter()
            .map(|c| {
                let mean = self.mean[c];
                let variance = self.variance[c];
                let sum = BATCH_NORM_EPSILON + variance / scale;
                let root = sum.sqrt();
                let pow = sum * root;
                let shift = mean / scale;
                let div = -1.0 / (2.0 * pow);
                let scale_sq = scale * scale;

                let mut scale_gradient = 0.0f32;
                let mut dl_dvar = 0.0f32;
                let mut dvar_dmean = 0.0f32;
                let mut delta_sum = 0.0f32;
                for p in 0..area {
                    let x = x_data[p * depth + c];
                    let dy = dy_data[p * depth + c];
                    scale_gradient += dy
                        * (mean / (scale_sq * root) + (x - shift) * variance / (2.0 * scale_sq * pow));
                    dl_dvar += dy * (x - shift) * div;
                    dvar_dmean -= x - mean;
                    delta_sum += dy;
                }
                dvar_dmean *= 2.0 / m;

                let dy_dmean = -1.0 / (scale * root);
                let dl_dmean = delta_sum * dy_dmean + m * dl_dvar * dvar_dmean;

                let plane = (0..area)
                    .map(|p| {
                        let x = x_data[p * depth + c];
                        let dy = dy_data[p * depth + c];
                        dy / root + dl_dmean / m + dl_dvar * 2.0 / m * (x - mean)
                    })
                    .collect();
                (plane, scale_gradient)
            })
            .collect();

        let (planes, scale_gradients): (Vec<Vec<f32>>, Vec<f32>) = per_channel.into_iter().unzip();
        gradients.scale += scale_gradients.iter().sum::<f32>();

        Ok(Tensor::from_planes(input.width(), input.height(), &planes))
    }

    /// Channel count is taken from `input`; statistics are reset to mean 0,
    /// variance 1 when it changes.
    fn calc_sizes(&mut self, input: TensorShape) -> Result<TensorShape> {
        if input.is_empty() {
            return Err(CnnError::config(format!(
                "batch norm cannot take empty input {}",
                input
            )));
        }
        if self.mean.len() != input.depth {
            self.mean = vec![0.0; input.depth];
            self.variance = vec![1.0; input.depth];
        }
        self.input_shape = input;
        Ok(input)
    }

    fn input_shape(&self) -> TensorShape {
        self.input_shape
    }

    fn output_shape(&self) -> TensorShape {
        self.input_shape
    }

    fn accumulate(&mut self, gradients: &ParamGradients) {
        self.gradients.scale += gradients.scale;
    }

    fn accumulated_gradients(&self) -> Option<&ParamGradients> {
        Some(&self.gradients)
    }

    /// Plain descent on `scale`; other rules only clear the accumulator.
    fn update(&mut self, rule: &UpdateRule) -> Result<()> {
        if let UpdateRule::Sgd(sgd) = rule {
            sgd.update(
                std::slice::from_mut(&mut self.scale),
                std::slice::from_mut(&mut self.gradients.scale),
                &mut self.scale_state,
            )?;
        }
        self.gradients.scale = 0.0;
        Ok(())
    }

    fn parameter_count(&self) -> usize {
        2 * self.mean.len() + 1
    }

    /// Reads means, then variances, then the scale.
    fn read_weights(&mut self, source: &mut dyn WeightSource) -> Result<()> {
        for mean in self.mean.iter_mut() {
            *mean = source.next_f32()?;
        }
        for variance in self.variance.iter_mut() {
            *variance = source.next_f32()?;
        }
        self.scale = source.next_f32()?;
        Ok(())
    }

    fn write_weights(&self, sink: &mut dyn WeightSink) -> Result<()> {
        for &mean in &self.mean {
            sink.put_f32(mean)?;
        }
        for &variance in &self.variance {
            sink.put_f32(variance)?;
        }
        sink.put_f32(self.scale)
    }
}
