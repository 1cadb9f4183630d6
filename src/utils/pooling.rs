//! Spatial pooling reductions.
//!
//! Each output element reduces a `scale_x × scale_y` window of one channel.
//! Windows do not overlap and trailing rows/columns that do not fill a whole
//! window are dropped, so the output is `(depth, height / scale_y, width / scale_x)`.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CnnError, Result};
use crate::tensor::{Tensor, TensorShape};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolingKind {
    #[default]
    Max,
    Average,
    Sum,
    /// Square root of the sum of squares.
    L2Norm,
}

impl PoolingKind {
    /// Reduces one window.
    pub fn reduce(self, window: &[f32]) -> f32 {
        match self {
            PoolingKind::Max => window.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            PoolingKind::Average => window.iter().sum::<f32>() / window.len() as f32,
            PoolingKind::Sum => window.iter().sum(),
            PoolingKind::L2Norm => window.iter().map(|v| v * v).sum::<f32>().sqrt(),
        }
    }
}

/// Output shape of a pooling step.
pub fn pooled_shape(input: TensorShape, scale_x: usize, scale_y: usize) -> Result<TensorShape> {
    if scale_x == 0 || scale_y == 0 {
        return Err(CnnError::config(format!(
            "pooling window must be positive, got {}x{}",
            scale_x, scale_y
        )));
    }
    let shape = TensorShape::new(input.depth, input.height / scale_y, input.width / scale_x);
    if shape.is_empty() {
        return Err(CnnError::config(format!(
            "pooling window {}x{} is larger than input {}",
            scale_x, scale_y, input
        )));
    }
    Ok(shape)
}

/// Pools every channel of `input`.
pub fn pool(input: &Tensor, kind: PoolingKind, scale_x: usize, scale_y: usize) -> Result<Tensor> {
    let shape = pooled_shape(input.shape(), scale_x, scale_y)?;
    let mut output = Tensor::zeros(shape);
    let depth = shape.depth;
    let row_len = shape.width * depth;

    output
        .data_mut()
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(oy, row)| {
            let mut window = Vec::with_capacity(scale_x * scale_y);
            for ox in 0..shape.width {
                for z in 0..depth {
                    window.clear();
                    for wy in 0..scale_y {
                        for wx in 0..scale_x {
                            window.push(input.get(ox * scale_x + wx, oy * scale_y + wy, z));
                        }
                    }
                    row[ox * depth + z] = kind.reduce(&window);
                }
            }
        });

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Tensor {
        let data: Vec<f32> = (0..16).map(|v| v as f32).collect();
        Tensor::from_vec(4, 4, 1, data).unwrap()
    }

    #[test]
    fn test_max_pool() {
        let pooled = pool(&ramp(), PoolingKind::Max, 2, 2).unwrap();
        assert_eq!(pooled.shape(), TensorShape::new(1, 2, 2));
        assert_eq!(pooled.data(), &[5.0, 7.0, 13.0, 15.0]);
    }

    #[test]
    fn test_average_and_sum() {
        let average = pool(&ramp(), PoolingKind::Average, 2, 2).unwrap();
        let sum = pool(&ramp(), PoolingKind::Sum, 2, 2).unwrap();
        assert_eq!(average.get(0, 0, 0), 2.5);
        assert_eq!(sum.get(0, 0, 0), 10.0);
    }

    #[test]
    fn test_l2_norm() {
        assert_eq!(PoolingKind::L2Norm.reduce(&[3.0, 4.0]), 5.0);
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(pooled_shape(TensorShape::new(1, 4, 4), 0, 2).is_err());
    }
}
