//! Convolution inner loops.
//!
//! [`dot`] and [`axpy`] are the per-position primitives the convolution and
//! deconvolution layers are built from: with depth innermost, the channels of
//! one input position and one filter tap are both contiguous slices.
//! [`convolve`] is a standalone single-filter correlation with valid, same or
//! full padding.

use serde::{Deserialize, Serialize};

use crate::error::{CnnError, Result};
use crate::tensor::Tensor;

/// Sum of element-wise products.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// `y += alpha * x`.
#[inline]
pub fn axpy(alpha: f32, x: &[f32], y: &mut [f32]) {
    debug_assert_eq!(x.len(), y.len());
    for (dst, src) in y.iter_mut().zip(x.iter()) {
        *dst += alpha * src;
    }
}

/// Output size policy of [`convolve`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    /// Windows lie entirely inside the input: `floor((n − k) / s) + 1`
    /// outputs.
    Valid,
    /// Windows centred on input positions: `ceil(n / s)` outputs. Needs an
    /// odd kernel.
    #[default]
    Same,
    /// Every window overlapping the input: `ceil((n + k − 1) / s)` outputs.
    Full,
}

impl Padding {
    /// Output length and first window origin along one axis.
    pub fn extent(self, input: usize, kernel: usize, stride: usize) -> Result<(usize, isize)> {
        if kernel == 0 || stride == 0 {
            return Err(CnnError::config(format!(
                "kernel size and stride must be positive, got {} and {}",
                kernel, stride
            )));
        }
        match self {
            Padding::Valid => {
                if input < kernel {
                    return Err(CnnError::config(format!(
                        "valid padding needs input {} >= kernel {}",
                        input, kernel
                    )));
                }
                Ok(((input - kernel) / stride + 1, 0))
            }
            Padding::Same => {
                if kernel % 2 == 0 {
                    return Err(CnnError::config(format!(
                        "same padding needs an odd kernel, got {}",
                        kernel
                    )));
                }
                Ok((input.div_ceil(stride), -((kernel / 2) as isize)))
            }
            Padding::Full => Ok((
                (input + kernel - 1).div_ceil(stride),
                -((kernel - 1) as isize),
            )),
        }
    }
}

/// Correlates `filter` with `input` and returns a single-channel plane.
///
/// Taps that fall outside the input contribute zero.
pub fn convolve(input: &Tensor, filter: &Tensor, stride: usize, padding: Padding) -> Result<Tensor> {
    if filter.depth() != input.depth() {
        return Err(CnnError::config(format!(
            "filter depth {} does not match input depth {}",
            filter.depth(),
            input.depth()
        )));
    }
    let (out_w, origin_x) = padding.extent(input.width(), filter.width(), stride)?;
    let (out_h, origin_y) = padding.extent(input.height(), filter.height(), stride)?;
    let mut output = Tensor::new(out_w, out_h, 1);

    for oy in 0..out_h {
        let y0 = origin_y + (oy * stride) as isize;
        for ox in 0..out_w {
            let x0 = origin_x + (ox * stride) as isize;
            let mut sum = 0.0f32;
            for fy in 0..filter.height() {
                let iy = y0 + fy as isize;
                if iy < 0 || iy >= input.height() as isize {
                    continue;
                }
                for fx in 0..filter.width() {
                    let ix = x0 + fx as isize;
                    if ix < 0 || ix >= input.width() as isize {
                        continue;
                    }
                    sum += dot(input.channels(ix as usize, iy as usize), filter.channels(fx, fy));
                }
            }
            output.set(ox, oy, 0, sum);
        }
    }

    Ok(output)
}
