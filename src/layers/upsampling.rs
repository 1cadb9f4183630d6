//! Up-sampling layer.
//!
//! Forward is not available; backward folds each `scale_x × scale_y` block of
//! output deltas back onto its source pixel by averaging.

use rayon::prelude::*;

use crate::error::{CnnError, Result};
use crate::layers::r#trait::check_shape;
use crate::layers::{Layer, LayerKind, ParamGradients};
use crate::tensor::{Tensor, TensorShape};
use crate::utils::upsampling::upsampled_shape;
use crate::utils::UpsamplingKind;

#[derive(Debug, Clone)]
pub struct UpsamplingLayer {
    upsampling: UpsamplingKind,
    scale_x: usize,
    scale_y: usize,
    input_shape: TensorShape,
    output_shape: TensorShape,
}

impl UpsamplingLayer {
    /// # Errors
    ///
    /// [`CnnError::Config`] when either scale is zero.
    pub fn new(upsampling: UpsamplingKind, scale_x: usize, scale_y: usize) -> Result<Self> {
        if scale_x == 0 || scale_y == 0 {
            return Err(CnnError::config(format!(
                "up-sampling scale must be positive, got {}x{}",
                scale_x, scale_y
            )));
        }
        Ok(Self {
            upsampling,
            scale_x,
            scale_y,
            input_shape: TensorShape::default(),
            output_shape: TensorShape::default(),
        })
    }

    pub fn upsampling(&self) -> UpsamplingKind {
        self.upsampling
    }

    pub fn scale(&self) -> (usize, usize) {
        (self.scale_x, self.scale_y)
    }
}

impl Layer for UpsamplingLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Upsampling
    }

    fn forward(&self, _input: &Tensor) -> Result<Tensor> {
        Err(CnnError::unsupported("up-sampling layer has no forward pass"))
    }

    fn backward(
        &self,
        deltas: &Tensor,
        input: &Tensor,
        _output: &Tensor,
        _gradients: &mut ParamGradients,
    ) -> Result<Tensor> {
        let in_shape = input.shape();
        let out = upsampled_shape(in_shape, self.scale_x, self.scale_y)?;
        check_shape("up-sampling deltas", deltas, out)?;

        let depth = in_shape.depth;
        let (sx, sy) = (self.scale_x, self.scale_y);
        let block = (sx * sy) as f32;
        let mut input_deltas = Tensor::zeros(in_shape);

        input_deltas
            .data_mut()
            .par_chunks_mut(in_shape.width * depth)
            .enumerate()
            .for_each(|(y, row)| {
                for x in 0..in_shape.width {
                    for z in 0..depth {
                        let mut sum = 0.0f32;
                        for by in 0..sy {
                            for bx in 0..sx {
                                sum += deltas.get(x * sx + bx, y * sy + by, z);
                            }
                        }
                        row[x * depth + z] = sum / block;
                    }
                }
            });

        Ok(input_deltas)
    }

    fn calc_sizes(&mut self, input: TensorShape) -> Result<TensorShape> {
        let output = upsampled_shape(input, self.scale_x, self.scale_y)?;
        if output.is_empty() {
            return Err(CnnError::config(format!(
                "up-sampling cannot take empty input {}",
                input
            )));
        }
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
}
