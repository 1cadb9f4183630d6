//! Error type shared by every fallible operation in the crate.

use thiserror::Error;

/// Errors raised while building, running or training a network.
#[derive(Debug, Error)]
pub enum CnnError {
    /// Invalid hyper-parameters, layer geometry or training input.
    #[error("configuration error: {0}")]
    Config(String),

    /// A tensor does not have the shape an operation expects.
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// The operation is declared by a layer kind but not available for it.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// NaN or infinity reached an activation, a normalization or an update.
    #[error("numeric fault: {0}")]
    Numeric(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CnnError>;

impl CnnError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        CnnError::Config(message.into())
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        CnnError::Unsupported(message.into())
    }
}
