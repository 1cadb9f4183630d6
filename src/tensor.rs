//! Dense three-dimensional tensors.
//!
//! A [`Tensor`] stores `width * height * depth` values in one flat buffer with
//! depth as the innermost axis, so the channels of one spatial position are
//! contiguous:
//!
//! ```text
//! index(x, y, z) = ((width * y + x) * depth) + z
//! ```
//!
//! Every layer consumes and produces tensors in this layout.

use serde::{Deserialize, Serialize};

use crate::error::{CnnError, Result};

/// Shape of a tensor as `(depth, height, width)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorShape {
    pub depth: usize,
    pub height: usize,
    pub width: usize,
}

impl TensorShape {
    pub fn new(depth: usize, height: usize, width: usize) -> Self {
        Self {
            depth,
            height,
            width,
        }
    }

    /// Number of values a tensor of this shape holds.
    pub fn len(&self) -> usize {
        self.depth * self.height * self.width
    }

    /// True when one of the dimensions is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of spatial positions (`width * height`).
    pub fn area(&self) -> usize {
        self.height * self.width
    }
}

impl std::fmt::Display for TensorShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.depth, self.height, self.width)
    }
}

/// Dense 3-D float array with flat, depth-innermost storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    width: usize,
    height: usize,
    depth: usize,
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a zero-filled tensor.
    ///
    /// # Panics
    ///
    /// Panics if any dimension is zero.
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        assert!(
            width > 0 && height > 0 && depth > 0,
            "Tensor dimensions must be positive"
        );
        Self {
            width,
            height,
            depth,
            data: vec![0.0; width * height * depth],
        }
    }

    /// Creates a zero-filled tensor of the given shape.
    pub fn zeros(shape: TensorShape) -> Self {
        Self::new(shape.width, shape.height, shape.depth)
    }

    /// Wraps an existing buffer laid out as `((width*y + x) * depth) + z`.
    pub fn from_vec(width: usize, height: usize, depth: usize, data: Vec<f32>) -> Result<Self> {
        if width == 0 || height == 0 || depth == 0 {
            return Err(CnnError::Shape(format!(
                "tensor dimensions must be positive, got {}x{}x{}",
                depth, height, width
            )));
        }
        if data.len() != width * height * depth {
            return Err(CnnError::Shape(format!(
                "buffer of {} values does not fit a {}x{}x{} tensor",
                data.len(),
                depth,
                height,
                width
            )));
        }
        Ok(Self {
            width,
            height,
            depth,
            data,
        })
    }

    /// Builds a tensor with every value set to `value`.
    pub fn filled(shape: TensorShape, value: f32) -> Self {
        let mut tensor = Self::zeros(shape);
        tensor.fill(value);
        tensor
    }

    /// Interleaves per-channel planes (each `width * height`, row-major)
    /// into one tensor whose depth is the number of planes.
    pub fn from_planes(width: usize, height: usize, planes: &[Vec<f32>]) -> Self {
        let depth = planes.len();
        let mut tensor = Self::new(width, height, depth);
        for (z, plane) in planes.iter().enumerate() {
            debug_assert_eq!(plane.len(), width * height);
            for (position, &value) in plane.iter().enumerate() {
                tensor.data[position * depth + z] = value;
            }
        }
        tensor
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn shape(&self) -> TensorShape {
        TensorShape::new(self.depth, self.height, self.width)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Flat index of `(x, y, z)`.
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        debug_assert!(x < self.width && y < self.height && z < self.depth);
        ((self.width * y + x) * self.depth) + z
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        self.data[self.index(x, y, z)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: f32) {
        let i = self.index(x, y, z);
        self.data[i] = value;
    }

    /// Adds `value` to the element at `(x, y, z)`.
    #[inline]
    pub fn add(&mut self, x: usize, y: usize, z: usize, value: f32) {
        let i = self.index(x, y, z);
        self.data[i] += value;
    }

    /// Multiplies the element at `(x, y, z)` by `value`.
    #[inline]
    pub fn scale(&mut self, x: usize, y: usize, z: usize, value: f32) {
        let i = self.index(x, y, z);
        self.data[i] *= value;
    }

    pub fn fill(&mut self, value: f32) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    /// Element-wise `self += other`.
    ///
    /// # Panics
    ///
    /// Panics if the shapes differ.
    pub fn accumulate(&mut self, other: &Tensor) {
        assert_eq!(self.shape(), other.shape(), "Tensor shapes must match");
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
    }

    /// True when no element is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Contiguous channel values at spatial position `(x, y)`.
    pub fn channels(&self, x: usize, y: usize) -> &[f32] {
        let start = self.index(x, y, 0);
        &self.data[start..start + self.depth]
    }
}
