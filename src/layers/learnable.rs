//! Filters, biases, gradient accumulators and optimizer state shared by the
//! convolution and deconvolution layers.

use rayon::prelude::*;

use crate::error::{CnnError, Result};
use crate::layers::ParamGradients;
use crate::optimizers::{ensure_finite, MomentState, Optimizer, UpdateRule};
use crate::tensor::{Tensor, TensorShape};
use crate::utils::SimpleRng;
use crate::weights::{WeightSink, WeightSource};

/// Learnable state of a filter bank.
///
/// Filters all share `filter_shape`. The accumulators in `gradients` and the
/// moment states mirror the parameters one-to-one and the accumulators are
/// cleared by every [`update`](LearnableParams::update).
#[derive(Debug, Clone)]
pub struct LearnableParams {
    filter_shape: TensorShape,
    stride: usize,
    filters: Vec<Tensor>,
    offsets: Vec<f32>,
    gradients: ParamGradients,
    filter_states: Vec<MomentState>,
    offset_state: MomentState,
}

impl LearnableParams {
    /// Creates `filter_count` filters of `kernel_height × kernel_width ×
    /// filter_depth` and `offset_count` biases, all drawn from
    /// `N(0, 2 / fan_in)`.
    ///
    /// # Errors
    ///
    /// [`CnnError::Config`] when any size or the stride is zero.
    pub fn new(
        kernel_height: usize,
        kernel_width: usize,
        filter_depth: usize,
        filter_count: usize,
        offset_count: usize,
        stride: usize,
        rng: &mut SimpleRng,
    ) -> Result<Self> {
        if kernel_height == 0 || kernel_width == 0 {
            return Err(CnnError::config(format!(
                "kernel must be at least 1x1, got {}x{}",
                kernel_height, kernel_width
            )));
        }
        if filter_depth == 0 || filter_count == 0 || offset_count == 0 {
            return Err(CnnError::config(format!(
                "filter depth and count must be positive, got {} and {}",
                filter_depth, filter_count
            )));
        }
        if stride == 0 {
            return Err(CnnError::config("stride must be positive"));
        }

        let filter_shape = TensorShape::new(filter_depth, kernel_height, kernel_width);
        let deviation = (2.0 / filter_shape.len() as f32).sqrt();

        let filters = (0..filter_count)
            .map(|_| {
                let mut filter = Tensor::zeros(filter_shape);
                filter
                    .data_mut()
                    .iter_mut()
                    .for_each(|w| *w = deviation * rng.next_gaussian());
                filter
            })
            .collect();
        let offsets = (0..offset_count)
            .map(|_| deviation * rng.next_gaussian())
            .collect();

        Ok(Self {
            filter_shape,
            stride,
            filters,
            offsets,
            gradients: ParamGradients::for_filters(filter_shape, filter_count, offset_count),
            filter_states: (0..filter_count)
                .map(|_| MomentState::new(filter_shape.len()))
                .collect(),
            offset_state: MomentState::new(offset_count),
        })
    }

    pub fn filter_shape(&self) -> TensorShape {
        self.filter_shape
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn filters(&self) -> &[Tensor] {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut [Tensor] {
        &mut self.filters
    }

    pub fn offsets(&self) -> &[f32] {
        &self.offsets
    }

    pub fn offsets_mut(&mut self) -> &mut [f32] {
        &mut self.offsets
    }

    /// Accumulated gradients (`deltaWeights` / `deltaOffsets`).
    pub fn gradients(&self) -> &ParamGradients {
        &self.gradients
    }

    pub fn filter_states(&self) -> &[MomentState] {
        &self.filter_states
    }

    pub fn offset_state(&self) -> &MomentState {
        &self.offset_state
    }

    pub fn zero_gradients(&self) -> ParamGradients {
        ParamGradients::for_filters(self.filter_shape, self.filters.len(), self.offsets.len())
    }

    pub fn accumulate(&mut self, gradients: &ParamGradients) {
        self.gradients.add_assign(gradients);
    }

    /// Applies `rule` to every filter and to the offsets.
    ///
    /// All accumulators are checked for NaN and infinity before any
    /// parameter changes.
    pub fn update(&mut self, rule: &UpdateRule) -> Result<()> {
        for gradient in &self.gradients.filters {
            ensure_finite(gradient.data(), "filter")?;
        }
        ensure_finite(&self.gradients.offsets, "offset")?;

        self.filters
            .par_iter_mut()
            .zip(self.gradients.filters.par_iter_mut())
            .zip(self.filter_states.par_iter_mut())
            .try_for_each(|((filter, gradient), state)| {
                rule.update(filter.data_mut(), gradient.data_mut(), state)
            })?;

        rule.update(
            &mut self.offsets,
            &mut self.gradients.offsets,
            &mut self.offset_state,
        )
    }

    pub fn parameter_count(&self) -> usize {
        self.filters.len() * self.filter_shape.len() + self.offsets.len()
    }

    /// Reads filters (filter → depth → row → column), then offsets.
    pub fn read_weights(&mut self, source: &mut dyn WeightSource) -> Result<()> {
        let shape = self.filter_shape;
        for filter in self.filters.iter_mut() {
            for z in 0..shape.depth {
                for y in 0..shape.height {
                    for x in 0..shape.width {
                        filter.set(x, y, z, source.next_f32()?);
                    }
                }
            }
        }
        for offset in self.offsets.iter_mut() {
            *offset = source.next_f32()?;
        }
        Ok(())
    }

    /// Writes values in the order [`read_weights`](Self::read_weights) expects.
    pub fn write_weights(&self, sink: &mut dyn WeightSink) -> Result<()> {
        let shape = self.filter_shape;
        for filter in &self.filters {
            for z in 0..shape.depth {
                for y in 0..shape.height {
                    for x in 0..shape.width {
                        sink.put_f32(filter.get(x, y, z))?;
                    }
                }
            }
        }
        for &offset in &self.offsets {
            sink.put_f32(offset)?;
        }
        Ok(())
    }
}
