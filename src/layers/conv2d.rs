//! Strided, dilated 2-D convolution layer.
//!
//! Output channel `d` at `(ax, ay)` is `offset[d]` plus the correlation of
//! filter `d` with the input window whose taps sit at
//!
//! ```text
//! a * stride - (k * dilation + dilation - 1) / 2 + f * dilation + dilation - 1
//! ```
//!
//! along each axis, for tap index `f` in `0..k`. Taps outside the input
//! contribute zero, so the output is `(filter_count, height / stride,
//! width / stride)`.

use rayon::prelude::*;

use crate::error::{CnnError, Result};
use crate::layers::r#trait::check_shape;
use crate::layers::{Layer, LayerKind, LearnableParams, ParamGradients};
use crate::optimizers::UpdateRule;
use crate::tensor::{Tensor, TensorShape};
use crate::utils::convolution::{axpy, dot};
use crate::utils::loss::binary_cross_entropy;
use crate::utils::SimpleRng;
use crate::weights::{WeightSink, WeightSource};

/// Convolution layer with learnable filters.
///
/// # Fields
///
/// * `params` - Filter bank (`filter_count` filters of `kernel × filter_depth`)
///   with one offset per filter
/// * `dilation` - Spacing between kernel taps
/// * `input_shape` / `output_shape` - Shapes fixed by the last `calc_sizes`
///
/// # Example
///
/// ```
/// use rust_cnn::layers::{ConvolutionLayer, Layer};
/// use rust_cnn::tensor::TensorShape;
/// use rust_cnn::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// // 3x3 kernel over 1 channel, 8 filters, stride 2, no dilation
/// let mut layer = ConvolutionLayer::new(3, 3, 1, 8, 2, 1, &mut rng).unwrap();
/// let output = layer.calc_sizes(TensorShape::new(1, 28, 28)).unwrap();
/// assert_eq!(output, TensorShape::new(8, 14, 14));
/// ```
#[derive(Debug, Clone)]
pub struct ConvolutionLayer {
    params: LearnableParams,
    dilation: usize,
    input_shape: TensorShape,
    output_shape: TensorShape,
}

impl ConvolutionLayer {
    /// Creates a convolution layer with He-initialized filters.
    ///
    /// # Arguments
    ///
    /// * `kernel_height`, `kernel_width` - Kernel size (at least 1)
    /// * `filter_depth` - Channels of the expected input
    /// * `filter_count` - Number of filters, i.e. output channels
    /// * `stride` - Step between output positions (at least 1)
    /// * `dilation` - Spacing between taps (at least 1)
    /// * `rng` - Random number generator for weight initialization
    pub fn new(
        kernel_height: usize,
        kernel_width: usize,
        filter_depth: usize,
        filter_count: usize,
        stride: usize,
        dilation: usize,
        rng: &mut SimpleRng,
    ) -> Result<Self> {
        if dilation == 0 {
            return Err(CnnError::config("dilation must be positive"));
        }
        let params = LearnableParams::new(
            kernel_height,
            kernel_width,
            filter_depth,
            filter_count,
            filter_count,
            stride,
            rng,
        )?;
        Ok(Self {
            params,
            dilation,
            input_shape: TensorShape::new(filter_depth, 0, 0),
            output_shape: TensorShape::new(filter_count, 0, 0),
        })
    }

    pub fn dilation(&self) -> usize {
        self.dilation
    }

    pub fn params(&self) -> &LearnableParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut LearnableParams {
        &mut self.params
    }

    fn output_for(&self, input: TensorShape) -> Result<TensorShape> {
        let kernel = self.params.filter_shape();
        if input.depth != kernel.depth {
            return Err(CnnError::config(format!(
                "convolution filter depth {} does not match input depth {}",
                kernel.depth, input.depth
            )));
        }
        let stride = self.params.stride();
        let output = TensorShape::new(
            self.params.filter_count(),
            input.height / stride,
            input.width / stride,
        );
        if output.is_empty() {
            return Err(CnnError::config(format!(
                "stride {} leaves no output for input {}",
                stride, input
            )));
        }
        Ok(output)
    }

    /// Calls `visit(filter_index, input_index)` for every in-bounds tap of
    /// output position `(ax, ay)`. Both indices point at the first channel.
    fn for_each_tap<F: FnMut(usize, usize)>(
        &self,
        input: TensorShape,
        ax: usize,
        ay: usize,
        mut visit: F,
    ) {
        let kernel = self.params.filter_shape();
        let stride = self.params.stride() as isize;
        let dilation = self.dilation as isize;
        let lead = dilation - 1;
        let y0 = ay as isize * stride - (kernel.height as isize * dilation + lead) / 2;
        let x0 = ax as isize * stride - (kernel.width as isize * dilation + lead) / 2;

        for fy in 0..kernel.height {
            let iy = y0 + fy as isize * dilation + lead;
            if iy < 0 || iy >= input.height as isize {
                continue;
            }
            for fx in 0..kernel.width {
                let ix = x0 + fx as isize * dilation + lead;
                if ix < 0 || ix >= input.width as isize {
                    continue;
                }
                visit(
                    (kernel.width * fy + fx) * kernel.depth,
                    (input.width * iy as usize + ix as usize) * input.depth,
                );
            }
        }
    }
}

impl Layer for ConvolutionLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Convolution
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let in_shape = input.shape();
        let out = self.output_for(in_shape)?;
        let depth = in_shape.depth;
        let data = input.data();

        let planes: Vec<Vec<f32>> = self
            .params
            .filters()
            .par_iter()
            .zip(self.params.offsets().par_iter())
            .map(|(filter, &offset)| {
                let weights = filter.data();
                let mut plane = vec![0.0f32; out.area()];
                for ay in 0..out.height {
                    for ax in 0..out.width {
                        let mut sum = offset;
                        self.for_each_tap(in_shape, ax, ay, |fi, ti| {
                            sum += dot(&weights[fi..fi + depth], &data[ti..ti + depth]);
                        });
                        plane[ay * out.width + ax] = sum;
                    }
                }
                plane
            })
            .collect();

        Ok(Tensor::from_planes(out.width, out.height, &planes))
    }

    fn backward(
        &self,
        deltas: &Tensor,
        input: &Tensor,
        _output: &Tensor,
        gradients: &mut ParamGradients,
    ) -> Result<Tensor> {
        let in_shape = input.shape();
        let out = self.output_for(in_shape)?;
        check_shape("convolution deltas", deltas, out)?;
        debug_assert_eq!(gradients.filters.len(), self.params.filter_count());
        let depth = in_shape.depth;
        let data = input.data();

        gradients
            .filters
            .par_iter_mut()
            .zip(gradients.offsets.par_iter_mut())
            .enumerate()
            .for_each(|(d, (gradient, offset_gradient))| {
                let gradient = gradient.data_mut();
                for ay in 0..out.height {
                    for ax in 0..out.width {
                        let delta = deltas.get(ax, ay, d);
                        *offset_gradient += delta;
                        if delta == 0.0 {
                            continue;
                        }
                        self.for_each_tap(in_shape, ax, ay, |fi, ti| {
                            axpy(delta, &data[ti..ti + depth], &mut gradient[fi..fi + depth]);
                        });
                    }
                }
            });

        let filters = self.params.filters();
        let input_deltas = (0..filters.len())
            .into_par_iter()
            .fold(
                || Tensor::zeros(in_shape),
                |mut acc, d| {
                    let weights = filters[d].data();
                    let acc_data = acc.data_mut();
                    for ay in 0..out.height {
                        for ax in 0..out.width {
                            let delta = deltas.get(ax, ay, d);
                            if delta == 0.0 {
                                continue;
                            }
                            self.for_each_tap(in_shape, ax, ay, |fi, ti| {
                                axpy(delta, &weights[fi..fi + depth], &mut acc_data[ti..ti + depth]);
                            });
                        }
                    }
                    acc
                },
            )
            .reduce(
                || Tensor::zeros(in_shape),
                |mut a, b| {
                    a.accumulate(&b);
                    a
                },
            );

        Ok(input_deltas)
    }

    /// Binary cross-entropy gradient `−t/y + (1−t)/(1−y)`.
    fn output_deltas(&self, result: &Tensor, target: &Tensor) -> Result<Tensor> {
        check_shape("convolution target", target, result.shape())?;
        let values: Vec<f32> = result
            .data()
            .par_iter()
            .zip(target.data().par_iter())
            .map(|(&y, &t)| binary_cross_entropy(t, y))
            .collect();

        let mean = values.iter().sum::<f32>() / values.len() as f32;
        log::debug!("convolution output loss gradient mean: {:.6}", mean);

        Tensor::from_vec(result.width(), result.height(), result.depth(), values)
    }

    fn calc_sizes(&mut self, input: TensorShape) -> Result<TensorShape> {
        let output = self.output_for(input)?;
        self.input_shape = input;
        self.output_shape = output;
        Ok(output)
    }

    fn input_shape(&self) -> TensorShape {
        self.input_shape
    }

    fn output_shape(&self) -> TensorShape {
        self.output_shape
    }

    fn zero_gradients(&self) -> ParamGradients {
        self.params.zero_gradients()
    }

    fn accumulate(&mut self, gradients: &ParamGradients) {
        self.params.accumulate(gradients);
    }

    fn accumulated_gradients(&self) -> Option<&ParamGradients> {
        Some(self.params.gradients())
    }

    fn update(&mut self, rule: &UpdateRule) -> Result<()> {
        self.params.update(rule)
    }

    fn learnable(&self) -> Option<&LearnableParams> {
        Some(&self.params)
    }

    fn learnable_mut(&mut self) -> Option<&mut LearnableParams> {
        Some(&mut self.params)
    }

    fn parameter_count(&self) -> usize {
        self.params.parameter_count()
    }

    fn read_weights(&mut self, source: &mut dyn WeightSource) -> Result<()> {
        self.params.read_weights(source)
    }

    fn write_weights(&self, sink: &mut dyn WeightSink) -> Result<()> {
        self.params.write_weights(sink)
    }
}
