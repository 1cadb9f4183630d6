//! Layer abstractions for convolutional networks
//!
//! This module provides the Layer trait and the fixed catalog of layer kinds
//! a network can be assembled from.

mod r#trait;
pub mod activation;
pub mod batchnorm;
pub mod conv2d;
pub mod deconv2d;
pub mod gradients;
pub mod learnable;
pub mod softmax;
pub mod subsampling;
pub mod upsampling;

use serde::{Deserialize, Serialize};

pub use activation::ActivationLayer;
pub use batchnorm::BatchNormLayer;
pub use conv2d::ConvolutionLayer;
pub use deconv2d::DeconvolutionLayer;
pub use gradients::ParamGradients;
pub use learnable::LearnableParams;
pub use r#trait::Layer;
pub use softmax::SoftmaxLayer;
pub use subsampling::SubsamplingLayer;
pub use upsampling::UpsamplingLayer;

/// The layer catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Convolution,
    Deconvolution,
    Subsampling,
    Upsampling,
    Activation,
    BatchNorm,
    Softmax,
}

impl LayerKind {
    /// Whether layers of this kind can run a forward pass.
    pub fn supports_forward(self) -> bool {
        !matches!(self, LayerKind::Subsampling | LayerKind::Upsampling)
    }

    /// Whether layers of this kind can seed back-propagation as the last layer.
    pub fn supports_output_deltas(self) -> bool {
        matches!(self, LayerKind::Convolution | LayerKind::Activation)
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LayerKind::Convolution => "convolution",
            LayerKind::Deconvolution => "deconvolution",
            LayerKind::Subsampling => "pooling",
            LayerKind::Upsampling => "up-sampling",
            LayerKind::Activation => "activation",
            LayerKind::BatchNorm => "batch norm",
            LayerKind::Softmax => "softmax",
        };
        f.write_str(name)
    }
}
