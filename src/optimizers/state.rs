//! Per-parameter optimizer history.

/// First and second moment estimates mirroring one parameter buffer.
///
/// The momentum rule keeps its previous step in the first-moment slot; plain
/// gradient descent ignores the state entirely.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MomentState {
    first: Vec<f32>,
    second: Vec<f32>,
}

impl MomentState {
    /// Zeroed state for `len` parameters.
    pub fn new(len: usize) -> Self {
        Self {
            first: vec![0.0; len],
            second: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.first.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_empty()
    }

    pub fn first(&self) -> &[f32] {
        &self.first
    }

    pub fn second(&self) -> &[f32] {
        &self.second
    }

    /// Both moment buffers, mutably.
    pub fn moments_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut self.first, &mut self.second)
    }

    /// Clears the history.
    pub fn reset(&mut self) {
        self.first.iter_mut().for_each(|m| *m = 0.0);
        self.second.iter_mut().for_each(|v| *v = 0.0);
    }
}
