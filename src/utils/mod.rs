//! Numeric kernels and shared helpers.
//!
//! - `activations`: pointwise functions and derivatives
//! - `loss`: output-loss gradients
//! - `convolution`: dot/axpy primitives and padded single-filter convolution
//! - `pooling`: max/average/sum/L2 reductions
//! - `upsampling`: nearest-neighbor and bilinear expansion
//! - `rng`: seedable generator for initialization and shuffling

pub mod activations;
pub mod convolution;
pub mod loss;
pub mod pooling;
pub mod rng;
pub mod upsampling;

pub use activations::ActivationKind;
pub use convolution::Padding;
pub use loss::OutputLoss;
pub use pooling::PoolingKind;
pub use rng::SimpleRng;
pub use upsampling::UpsamplingKind;
