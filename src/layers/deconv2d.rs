//! Transposed convolution (deconvolution) layer.
//!
//! Every input element `(ax, ay, d)` is spread over the output through filter
//! `d`, whose top-left tap lands on `a * stride - k / 2`. Filters are as deep
//! as the output, one offset is added per output channel afterwards, and the
//! output is `(filter_depth, height * stride, width * stride)`.

use rayon::prelude::*;

use crate::error::{CnnError, Result};
use crate::layers::r#trait::check_shape;
use crate::layers::{Layer, LayerKind, LearnableParams, ParamGradients};
use crate::optimizers::UpdateRule;
use crate::tensor::{Tensor, TensorShape};
use crate::utils::convolution::{axpy, dot};
use crate::utils::SimpleRng;
use crate::weights::{WeightSink, WeightSource};

/// Deconvolution layer with learnable filters.
///
/// # Example
///
/// ```
/// use rust_cnn::layers::{DeconvolutionLayer, Layer};
/// use rust_cnn::tensor::TensorShape;
/// use rust_cnn::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// // 16 input channels up to 8 output channels, doubling the resolution
/// let mut layer = DeconvolutionLayer::new(3, 3, 8, 16, 2, &mut rng).unwrap();
/// let output = layer.calc_sizes(TensorShape::new(16, 7, 7)).unwrap();
/// assert_eq!(output, TensorShape::new(8, 14, 14));
/// ```
#[derive(Debug, Clone)]
pub struct DeconvolutionLayer {
    params: LearnableParams,
    input_shape: TensorShape,
    output_shape: TensorShape,
}

impl DeconvolutionLayer {
    /// Creates a deconvolution layer with He-initialized filters.
    ///
    /// # Arguments
    ///
    /// * `kernel_height`, `kernel_width` - Kernel size (at least 1)
    /// * `filter_depth` - Output channels; one offset per channel
    /// * `filter_count` - Input channels; one filter per channel
    /// * `stride` - Up-sampling factor (at least 1)
    /// * `rng` - Random number generator for weight initialization
    pub fn new(
        kernel_height: usize,
        kernel_width: usize,
        filter_depth: usize,
        filter_count: usize,
        stride: usize,
        rng: &mut SimpleRng,
    ) -> Result<Self> {
        let params = LearnableParams::new(
            kernel_height,
            kernel_width,
            filter_depth,
            filter_count,
            filter_depth,
            stride,
            rng,
        )?;
        Ok(Self {
            params,
            input_shape: TensorShape::new(filter_count, 0, 0),
            output_shape: TensorShape::new(filter_depth, 0, 0),
        })
    }

    pub fn params(&self) -> &LearnableParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut LearnableParams {
        &mut self.params
    }

    fn output_for(&self, input: TensorShape) -> Result<TensorShape> {
        if input.depth != self.params.filter_count() {
            return Err(CnnError::config(format!(
                "deconvolution has {} filters but input depth is {}",
                self.params.filter_count(),
                input.depth
            )));
        }
        let stride = self.params.stride();
        Ok(TensorShape::new(
            self.params.filter_shape().depth,
            input.height * stride,
            input.width * stride,
        ))
    }

    /// Calls `visit(filter_index, output_index)` for every in-bounds tap fed
    /// by input position `(ax, ay)`. Both indices point at the first channel.
    fn for_each_tap<F: FnMut(usize, usize)>(
        &self,
        output: TensorShape,
        ax: usize,
        ay: usize,
        mut visit: F,
    ) {
        let kernel = self.params.filter_shape();
        let stride = self.params.stride() as isize;
        let y0 = ay as isize * stride - (kernel.height / 2) as isize;
        let x0 = ax as isize * stride - (kernel.width / 2) as isize;

        for fy in 0..kernel.height {
            let oy = y0 + fy as isize;
            if oy < 0 || oy >= output.height as isize {
                continue;
            }
            for fx in 0..kernel.width {
                let ox = x0 + fx as isize;
                if ox < 0 || ox >= output.width as isize {
                    continue;
                }
                visit(
                    (kernel.width * fy + fx) * kernel.depth,
                    (output.width * oy as usize + ox as usize) * output.depth,
                );
            }
        }
    }
}

impl Layer for DeconvolutionLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Deconvolution
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let in_shape = input.shape();
        let out = self.output_for(in_shape)?;
        let depth = out.depth;
        let filters = self.params.filters();

        let mut output = (0..filters.len())
            .into_par_iter()
            .fold(
                || Tensor::zeros(out),
                |mut acc, d| {
                    let weights = filters[d].data();
                    let acc_data = acc.data_mut();
                    for ay in 0..in_shape.height {
                        for ax in 0..in_shape.width {
                            let value = input.get(ax, ay, d);
                            if value == 0.0 {
                                continue;
                            }
                            self.for_each_tap(out, ax, ay, |fi, oi| {
                                axpy(value, &weights[fi..fi + depth], &mut acc_data[oi..oi + depth]);
                            });
                        }
                    }
                    acc
                },
            )
            .reduce(
                || Tensor::zeros(out),
                |mut a, b| {
                    a.accumulate(&b);
                    a
                },
            );

        let offsets = self.params.offsets();
        output.data_mut().par_chunks_mut(depth).for_each(|cell| {
            for (value, offset) in cell.iter_mut().zip(offsets.iter()) {
                *value += offset;
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
        let in_shape = input.shape();
        let out = self.output_for(in_shape)?;
        check_shape("deconvolution deltas", deltas, out)?;
        debug_assert_eq!(gradients.filters.len(), self.params.filter_count());
        let depth = out.depth;
        let delta_data = deltas.data();

        gradients
            .filters
            .par_iter_mut()
            .enumerate()
            .for_each(|(d, gradient)| {
                let gradient = gradient.data_mut();
                for ay in 0..in_shape.height {
                    for ax in 0..in_shape.width {
                        let value = input.get(ax, ay, d);
                        if value == 0.0 {
                            continue;
                        }
                        self.for_each_tap(out, ax, ay, |fi, oi| {
                            axpy(value, &delta_data[oi..oi + depth], &mut gradient[fi..fi + depth]);
                        });
                    }
                }
            });

        for cell in delta_data.chunks(depth) {
            for (offset_gradient, delta) in gradients.offsets.iter_mut().zip(cell.iter()) {
                *offset_gradient += delta;
            }
        }

        let planes: Vec<Vec<f32>> = self
            .params
            .filters()
            .par_iter()
            .map(|filter| {
                let weights = filter.data();
                let mut plane = vec![0.0f32; in_shape.area()];
                for ay in 0..in_shape.height {
                    for ax in 0..in_shape.width {
                        let mut sum = 0.0f32;
                        self.for_each_tap(out, ax, ay, |fi, oi| {
                            sum += dot(&weights[fi..fi + depth], &delta_data[oi..oi + depth]);
                        });
                        plane[ay * in_shape.width + ax] = sum;
                    }
                }
                plane
            })
            .collect();

        Ok(Tensor::from_planes(in_shape.width, in_shape.height, &planes))
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
