//! Spatial up-sampling interpolations.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CnnError, Result};
use crate::tensor::{Tensor, TensorShape};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsamplingKind {
    #[default]
    NearestNeighbor,
    Bilinear,
}

/// Output shape of an up-sampling step.
pub fn upsampled_shape(input: TensorShape, scale_x: usize, scale_y: usize) -> Result<TensorShape> {
    if scale_x == 0 || scale_y == 0 {
        return Err(CnnError::config(format!(
            "up-sampling scale must be positive, got {}x{}",
            scale_x, scale_y
        )));
    }
    Ok(TensorShape::new(
        input.depth,
        input.height * scale_y,
        input.width * scale_x,
    ))
}

/// Expands every channel of `input` by `scale_x × scale_y`.
///
/// Bilinear sampling maps output pixel centers back onto the input grid and
/// clamps at the borders.
pub fn upsample(
    input: &Tensor,
    kind: UpsamplingKind,
    scale_x: usize,
    scale_y: usize,
) -> Result<Tensor> {
    let shape = upsampled_shape(input.shape(), scale_x, scale_y)?;
    let mut output = Tensor::zeros(shape);
    let depth = shape.depth;
    let row_len = shape.width * depth;

    output
        .data_mut()
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(oy, row)| {
            for ox in 0..shape.width {
                let cell = &mut row[ox * depth..(ox + 1) * depth];
                match kind {
                    UpsamplingKind::NearestNeighbor => {
                        cell.copy_from_slice(input.channels(ox / scale_x, oy / scale_y));
                    }
                    UpsamplingKind::Bilinear => {
                        let (x0, x1, fx) = source_coordinate(ox, scale_x, input.width());
                        let (y0, y1, fy) = source_coordinate(oy, scale_y, input.height());
                        for (z, value) in cell.iter_mut().enumerate() {
                            let top = input.get(x0, y0, z) * (1.0 - fx) + input.get(x1, y0, z) * fx;
                            let bottom =
                                input.get(x0, y1, z) * (1.0 - fx) + input.get(x1, y1, z) * fx;
                            *value = top * (1.0 - fy) + bottom * fy;
                        }
                    }
                }
            }
        });

    Ok(output)
}

/// Neighbouring source indices and the interpolation weight of the second.
fn source_coordinate(target: usize, scale: usize, extent: usize) -> (usize, usize, f32) {
    let source = ((target as f32 + 0.5) / scale as f32 - 0.5).max(0.0);
    let lower = (source.floor() as usize).min(extent - 1);
    let upper = (lower + 1).min(extent - 1);
    (lower, upper, source - lower as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_neighbor_replicates() {
        let input = Tensor::from_vec(2, 1, 1, vec![1.0, 2.0]).unwrap();
        let output = upsample(&input, UpsamplingKind::NearestNeighbor, 2, 2).unwrap();
        assert_eq!(output.shape(), TensorShape::new(1, 2, 4));
        assert_eq!(output.data(), &[1.0, 1.0, 2.0, 2.0, 1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_bilinear_interpolates_between_pixels() {
        let input = Tensor::from_vec(2, 1, 1, vec![0.0, 4.0]).unwrap();
        let output = upsample(&input, UpsamplingKind::Bilinear, 2, 1).unwrap();
        assert_eq!(output.data(), &[0.0, 1.0, 3.0, 4.0]);
    }

    #[test]
    fn test_bilinear_constant_input_is_constant() {
        let input = Tensor::filled(TensorShape::new(2, 3, 3), 0.75);
        let output = upsample(&input, UpsamplingKind::Bilinear, 3, 2).unwrap();
        assert!(output.data().iter().all(|&v| (v - 0.75).abs() < 1e-6));
    }
}
