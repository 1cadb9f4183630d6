//! Architecture configuration structures
//!
//! This module describes a network as an ordered list of layer descriptions
//! plus the input shape, so architectures can be stored as JSON, validated
//! without allocating any weights and materialized into a [`Network`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CnnError, Result};
use crate::layers::{
    ActivationLayer, BatchNormLayer, ConvolutionLayer, DeconvolutionLayer, Layer, LayerKind,
    SoftmaxLayer, SubsamplingLayer, UpsamplingLayer,
};
use crate::network::Network;
use crate::tensor::TensorShape;
use crate::utils::pooling::pooled_shape;
use crate::utils::upsampling::upsampled_shape;
use crate::utils::{ActivationKind, OutputLoss, PoolingKind, SimpleRng, UpsamplingKind};

/// Description of a single layer.
///
/// Which fields matter depends on `layer_type`:
///
/// - **convolution**: `kernel_height`, `kernel_width`, `filter_depth` (input
///   channels), `filter_count` (output channels), optional `stride` and
///   `dilation` (default 1)
/// - **deconvolution**: the kernel size, `filter_depth` (output channels),
///   `filter_count` (input channels) and optional `stride` (default 1)
/// - **subsampling**: the window in `kernel_width` x `kernel_height` and
///   optional `pooling` (default max)
/// - **upsampling**: the factors in `kernel_width` x `kernel_height` and
///   optional `upsampling` (default nearest neighbor)
/// - **activation**: `activation` and optional `output_loss`
/// - **batch_norm**, **softmax**: nothing
///
/// # Examples
///
/// ```json
/// {
///   "layer_type": "convolution",
///   "kernel_height": 3,
///   "kernel_width": 3,
///   "filter_depth": 1,
///   "filter_count": 64,
///   "stride": 2
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDescription {
    pub layer_type: LayerKind,

    #[serde(default)]
    pub kernel_height: usize,
    #[serde(default)]
    pub kernel_width: usize,
    #[serde(default)]
    pub filter_depth: usize,
    #[serde(default)]
    pub filter_count: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pooling: Option<PoolingKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<ActivationKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upsampling: Option<UpsamplingKind>,
    /// Loss used when an activation layer closes the network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_loss: Option<OutputLoss>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stride: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dilation: Option<usize>,
}

impl LayerDescription {
    fn bare(layer_type: LayerKind) -> Self {
        Self {
            layer_type,
            kernel_height: 0,
            kernel_width: 0,
            filter_depth: 0,
            filter_count: 0,
            pooling: None,
            activation: None,
            upsampling: None,
            output_loss: None,
            stride: None,
            dilation: None,
        }
    }

    /// Square-kernel convolution from `depth` to `count` channels.
    pub fn convolution(
        depth: usize,
        count: usize,
        kernel: usize,
        stride: usize,
        dilation: usize,
    ) -> Self {
        Self {
            kernel_height: kernel,
            kernel_width: kernel,
            filter_depth: depth,
            filter_count: count,
            stride: Some(stride),
            dilation: Some(dilation),
            ..Self::bare(LayerKind::Convolution)
        }
    }

    /// Square-kernel deconvolution from `count` input channels to `depth`
    /// output channels.
    pub fn deconvolution(depth: usize, count: usize, kernel: usize, stride: usize) -> Self {
        Self {
            kernel_height: kernel,
            kernel_width: kernel,
            filter_depth: depth,
            filter_count: count,
            stride: Some(stride),
            ..Self::bare(LayerKind::Deconvolution)
        }
    }

    pub fn activation(activation: ActivationKind) -> Self {
        Self {
            activation: Some(activation),
            ..Self::bare(LayerKind::Activation)
        }
    }

    pub fn batch_norm() -> Self {
        Self::bare(LayerKind::BatchNorm)
    }

    pub fn softmax() -> Self {
        Self::bare(LayerKind::Softmax)
    }

    pub fn upsampling(scale_x: usize, scale_y: usize) -> Self {
        Self {
            kernel_height: scale_y,
            kernel_width: scale_x,
            upsampling: Some(UpsamplingKind::default()),
            ..Self::bare(LayerKind::Upsampling)
        }
    }

    pub fn subsampling(pooling: PoolingKind, scale_x: usize, scale_y: usize) -> Self {
        Self {
            kernel_height: scale_y,
            kernel_width: scale_x,
            pooling: Some(pooling),
            ..Self::bare(LayerKind::Subsampling)
        }
    }

    fn stride_or_default(&self) -> usize {
        self.stride.unwrap_or(1)
    }

    fn dilation_or_default(&self) -> usize {
        self.dilation.unwrap_or(1)
    }

    /// Output shape of this layer for `input`, computed from the description
    /// alone.
    pub fn infer_shape(&self, input: TensorShape) -> Result<TensorShape> {
        match self.layer_type {
            LayerKind::Convolution => {
                self.check_kernel()?;
                if input.depth != self.filter_depth {
                    return Err(CnnError::config(format!(
                        "convolution filter depth {} does not match input depth {}",
                        self.filter_depth, input.depth
                    )));
                }
                if self.dilation_or_default() == 0 {
                    return Err(CnnError::config("dilation must be at least 1"));
                }
                let stride = self.stride_or_default();
                let output = TensorShape::new(
                    self.filter_count,
                    input.height / stride,
                    input.width / stride,
                );
                if output.is_empty() {
                    return Err(CnnError::config(format!(
                        "stride {} leaves no output for input {}",
                        stride, input
                    )));
                }
                Ok(output)
            }
            LayerKind::Deconvolution => {
                self.check_kernel()?;
                if input.depth != self.filter_count {
                    return Err(CnnError::config(format!(
                        "deconvolution has {} filters but input depth is {}",
                        self.filter_count, input.depth
                    )));
                }
                let stride = self.stride_or_default();
                Ok(TensorShape::new(
                    self.filter_depth,
                    input.height * stride,
                    input.width * stride,
                ))
            }
            LayerKind::Subsampling => pooled_shape(input, self.kernel_width, self.kernel_height),
            LayerKind::Upsampling => {
                upsampled_shape(input, self.kernel_width, self.kernel_height)
            }
            LayerKind::Activation => {
                if self.activation.is_none() {
                    return Err(CnnError::config("activation layer requires 'activation'"));
                }
                Ok(input)
            }
            LayerKind::BatchNorm | LayerKind::Softmax => Ok(input),
        }
    }

    fn check_kernel(&self) -> Result<()> {
        if self.kernel_height == 0 || self.kernel_width == 0 {
            return Err(CnnError::config(format!(
                "{} kernel must be at least 1x1",
                self.layer_type
            )));
        }
        if self.filter_depth == 0 || self.filter_count == 0 {
            return Err(CnnError::config(format!(
                "{} filter depth and count must be positive",
                self.layer_type
            )));
        }
        if self.stride_or_default() == 0 {
            return Err(CnnError::config("stride must be at least 1"));
        }
        Ok(())
    }
}

/// A whole network: input shape plus layers in order.
///
/// # Example
///
/// ```json
/// {
///   "input": { "depth": 1, "height": 32, "width": 32 },
///   "layers": [
///     { "layer_type": "convolution", "kernel_height": 3, "kernel_width": 3,
///       "filter_depth": 1, "filter_count": 8, "stride": 2 },
///     { "layer_type": "activation", "activation": "relu" },
///     { "layer_type": "batch_norm" },
///     { "layer_type": "convolution", "kernel_height": 1, "kernel_width": 1,
///       "filter_depth": 8, "filter_count": 2 }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureConfig {
    pub input: TensorShape,
    pub layers: Vec<LayerDescription>,
}

impl ArchitectureConfig {
    /// Shape after every layer, in order.
    pub fn infer_shapes(&self) -> Result<Vec<TensorShape>> {
        if self.input.is_empty() {
            return Err(CnnError::config(format!(
                "input shape {} is empty",
                self.input
            )));
        }
        let mut shape = self.input;
        let mut shapes = Vec::with_capacity(self.layers.len());
        for (i, layer) in self.layers.iter().enumerate() {
            shape = layer.infer_shape(shape).map_err(|e| at_layer(i, e))?;
            shapes.push(shape);
        }
        Ok(shapes)
    }

    /// Final output shape.
    pub fn output_shape(&self) -> Result<TensorShape> {
        Ok(self.infer_shapes()?.last().copied().unwrap_or(self.input))
    }
}

fn at_layer(index: usize, error: CnnError) -> CnnError {
    match error {
        CnnError::Config(message) => CnnError::Config(format!("Layer {}: {}", index, message)),
        other => other,
    }
}

/// Built-in image colorization architectures: one luminance channel in, two
/// chrominance channels out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Eight convolution blocks, three of them dilated, one deconvolution
    Vgg,
    /// Four convolution blocks followed by two deconvolutions
    VggModified,
    /// The VGG trunk decoded back to full resolution
    Rec,
}

impl Preset {
    /// Architecture for square images of `image_size` pixels.
    pub fn architecture(self, image_size: usize) -> ArchitectureConfig {
        let layers = match self {
            Preset::Vgg => vgg_layers(),
            Preset::VggModified => vgg_modified_layers(),
            Preset::Rec => rec_layers(),
        };
        ArchitectureConfig {
            input: TensorShape::new(1, image_size, image_size),
            layers,
        }
    }
}

fn conv_relu(depth: usize, count: usize, stride: usize, dilation: usize) -> [LayerDescription; 2] {
    [
        LayerDescription::convolution(depth, count, 3, stride, dilation),
        LayerDescription::activation(ActivationKind::ReLU),
    ]
}

fn deconv_relu(depth: usize, count: usize) -> [LayerDescription; 2] {
    [
        LayerDescription::deconvolution(depth, count, 4, 2),
        LayerDescription::activation(ActivationKind::ReLU),
    ]
}

/// Conv 1-4, shrinking the image eightfold.
fn encoder(batch_norm: bool) -> Vec<LayerDescription> {
    let blocks: [&[(usize, usize, usize)]; 4] = [
        &[(1, 64, 1), (64, 64, 2)],
        &[(64, 128, 1), (128, 128, 2)],
        &[(128, 256, 1), (256, 256, 1), (256, 256, 2)],
        &[(256, 512, 1), (512, 512, 1), (512, 512, 1)],
    ];
    let mut layers = Vec::new();
    for block in blocks {
        for &(depth, count, stride) in block {
            layers.extend(conv_relu(depth, count, stride, 1));
        }
        if batch_norm {
            layers.push(LayerDescription::batch_norm());
        }
    }
    layers
}

/// Encoder plus the dilated Conv 5-6 and Conv 7.
fn vgg_trunk() -> Vec<LayerDescription> {
    let mut layers = encoder(true);
    for dilation in [2, 2, 1] {
        for _ in 0..3 {
            layers.extend(conv_relu(512, 512, 1, dilation));
        }
        layers.push(LayerDescription::batch_norm());
    }
    layers
}

/// 1x1 projection onto `bins` colour bins, softmax, then onto two channels.
fn colour_head(depth: usize, bins: usize) -> Vec<LayerDescription> {
    vec![
        LayerDescription::convolution(depth, bins, 1, 1, 1),
        LayerDescription::activation(ActivationKind::Linear),
        LayerDescription::softmax(),
        LayerDescription::convolution(bins, 2, 1, 1, 1),
    ]
}

fn vgg_layers() -> Vec<LayerDescription> {
    let mut layers = vgg_trunk();
    layers.extend(deconv_relu(256, 512));
    layers.extend(conv_relu(256, 256, 1, 1));
    layers.extend(conv_relu(256, 256, 1, 1));
    layers.extend(colour_head(256, 313));
    layers
}

fn rec_layers() -> Vec<LayerDescription> {
    let mut layers = vgg_trunk();
    layers.extend(deconv_relu(256, 512));
    layers.extend(conv_relu(256, 256, 1, 1));
    layers.extend(deconv_relu(256, 256));
    layers.extend(conv_relu(256, 256, 1, 1));
    layers.extend(deconv_relu(256, 256));
    layers.extend(colour_head(256, 313));
    layers
}

fn vgg_modified_layers() -> Vec<LayerDescription> {
    let mut layers = encoder(false);
    layers.extend(deconv_relu(256, 512));
    layers.extend(deconv_relu(256, 256));
    layers.extend(colour_head(256, 256));
    layers
}

/// Loads an architecture from a JSON file.
///
/// Reads the file at `path`, deserializes it and validates the result.
///
/// # Examples
///
/// ```no_run
/// use rust_cnn::architecture::load_architecture;
///
/// let arch = load_architecture("config/architectures/colorize_small.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture<P: AsRef<Path>>(path: P) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    validate_architecture(&config)?;
    Ok(config)
}

/// Writes an architecture as pretty-printed JSON.
pub fn save_architecture<P: AsRef<Path>>(config: &ArchitectureConfig, path: P) -> Result<()> {
    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents)?;
    Ok(())
}

/// Validates an architecture.
///
/// Checks that:
/// - the architecture has at least one layer
/// - every layer has the fields its kind requires
/// - each layer accepts the shape produced by the one before it
///
/// # Errors
///
/// [`CnnError::Config`] naming the first offending layer.
pub fn validate_architecture(config: &ArchitectureConfig) -> Result<()> {
    if config.layers.is_empty() {
        return Err(CnnError::config("Architecture must have at least one layer"));
    }
    config.infer_shapes()?;
    Ok(())
}

/// Materializes one layer.
pub fn build_layer(description: &LayerDescription, rng: &mut SimpleRng) -> Result<Box<dyn Layer>> {
    let stride = description.stride_or_default();
    let layer: Box<dyn Layer> = match description.layer_type {
        LayerKind::Convolution => Box::new(ConvolutionLayer::new(
            description.kernel_height,
            description.kernel_width,
            description.filter_depth,
            description.filter_count,
            stride,
            description.dilation_or_default(),
            rng,
        )?),
        LayerKind::Deconvolution => Box::new(DeconvolutionLayer::new(
            description.kernel_height,
            description.kernel_width,
            description.filter_depth,
            description.filter_count,
            stride,
            rng,
        )?),
        LayerKind::Subsampling => Box::new(SubsamplingLayer::new(
            description.pooling.unwrap_or_default(),
            description.kernel_width,
            description.kernel_height,
        )?),
        LayerKind::Upsampling => Box::new(UpsamplingLayer::new(
            description.upsampling.unwrap_or_default(),
            description.kernel_width,
            description.kernel_height,
        )?),
        LayerKind::Activation => {
            let activation = description
                .activation
                .ok_or_else(|| CnnError::config("activation layer requires 'activation'"))?;
            Box::new(
                ActivationLayer::new(activation)
                    .with_loss(description.output_loss.unwrap_or_default()),
            )
        }
        LayerKind::BatchNorm => Box::new(BatchNormLayer::new()),
        LayerKind::Softmax => Box::new(SoftmaxLayer::new()),
    };
    Ok(layer)
}

/// Materializes every layer in order.
pub fn build_layers(
    descriptions: &[LayerDescription],
    rng: &mut SimpleRng,
) -> Result<Vec<Box<dyn Layer>>> {
    descriptions
        .iter()
        .enumerate()
        .map(|(i, description)| build_layer(description, rng).map_err(|e| at_layer(i, e)))
        .collect()
}

/// Validates an architecture and builds its network.
///
/// # Examples
///
/// ```
/// use rust_cnn::architecture::{build_network, ArchitectureConfig, LayerDescription};
/// use rust_cnn::tensor::TensorShape;
/// use rust_cnn::utils::{ActivationKind, SimpleRng};
///
/// let config = ArchitectureConfig {
///     input: TensorShape::new(1, 8, 8),
///     layers: vec![
///         LayerDescription::convolution(1, 4, 3, 2, 1),
///         LayerDescription::activation(ActivationKind::ReLU),
///         LayerDescription::convolution(4, 2, 1, 1, 1),
///     ],
/// };
/// let mut rng = SimpleRng::new(42);
/// let network = build_network(&config, &mut rng).unwrap();
/// assert_eq!(network.output_shape(), TensorShape::new(2, 4, 4));
/// ```
pub fn build_network(config: &ArchitectureConfig, rng: &mut SimpleRng) -> Result<Network> {
    validate_architecture(config)?;
    let layers = build_layers(&config.layers, rng)?;
    let mut network = Network::new(config.input);
    network.add_layers(layers)?;
    log::info!(
        "Built network: {} layers, {} -> {}, {} parameters",
        network.len(),
        network.input_shape(),
        network.output_shape(),
        network.parameter_count()
    );
    Ok(network)
}
