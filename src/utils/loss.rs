//! Output-loss gradients used to seed back-propagation.

use serde::{Deserialize, Serialize};

/// Gradient of the squared error with respect to the output: `y − t`.
pub fn difference(target: f32, output: f32) -> f32 {
    output - target
}

/// Gradient of `−t·ln y` with respect to the output: `−t / y`.
pub fn cross_entropy(target: f32, output: f32) -> f32 {
    -(target / output)
}

/// Gradient of the binary cross-entropy: `−t/y + (1−t)/(1−y)`.
pub fn binary_cross_entropy(target: f32, output: f32) -> f32 {
    -target / output + (1.0 - target) / (1.0 - output)
}

/// Output-delta variant of an activation layer placed last in a network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLoss {
    /// Plain subtractive error `y − t`.
    Difference,
    /// Ratio cross-entropy `−t / y`.
    #[default]
    CrossEntropy,
}

impl OutputLoss {
    pub fn gradient(self, target: f32, output: f32) -> f32 {
        match self {
            OutputLoss::Difference => difference(target, output),
            OutputLoss::CrossEntropy => cross_entropy(target, output),
        }
    }
}
