//! Rust CNN Library
//!
//! A convolutional neural network engine with hand-written forward and
//! backward passes, parallel batch training and a flat binary weight format.
//!
//! # Modules
//!
//! - `tensor`: 3-D float tensors (width x height x depth, depth innermost)
//! - `layers`: Layer trait and implementations (convolution, deconvolution, etc.)
//! - `network`: Ordered layer chain with inference and back-propagation
//! - `optimizers`: Update rules (SGD, momentum, Adam)
//! - `trainer`: Epoch/batch training loop with progress reporting
//! - `utils`: Shared utilities (RNG, activation functions, pooling, etc.)
//! - `config`: Training configuration structures
//! - `architecture`: Architecture descriptions, presets and network building
//! - `weights`: Binary weight stream I/O

pub mod architecture;
pub mod config;
pub mod error;
pub mod layers;
pub mod network;
pub mod optimizers;
pub mod tensor;
pub mod trainer;
pub mod utils;
pub mod weights;

pub use error::{CnnError, Result};
pub use network::{Network, Sample};
pub use tensor::{Tensor, TensorShape};
pub use trainer::Trainer;
pub use config::TrainingConfig;
