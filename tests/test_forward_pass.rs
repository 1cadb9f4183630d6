// Tests for forward propagation: output dimensions and basic correctness of
// every layer kind and of a whole network.

use approx::assert_relative_eq;
use rust_cnn::layers::{
    BatchNormLayer, ConvolutionLayer, DeconvolutionLayer, Layer, SubsamplingLayer,
    UpsamplingLayer,
};
use rust_cnn::network::Network;
use rust_cnn::tensor::{Tensor, TensorShape};
use rust_cnn::utils::{ActivationKind, PoolingKind, SimpleRng, UpsamplingKind};
use rust_cnn::CnnError;

fn unit_network() -> Network {
    let mut rng = SimpleRng::new(3);
    let mut layer = ConvolutionLayer::new(1, 1, 1, 1, 1, 1, &mut rng).unwrap();
    layer.params_mut().filters_mut()[0].fill(2.0);
    layer.params_mut().offsets_mut()[0] = 0.0;

    let mut network = Network::new(TensorShape::new(1, 1, 1));
    network.add_layer(Box::new(layer)).unwrap();
    network
}

// ============================================================================
// Convolution Tests
// ============================================================================

mod convolution_tests {
    use super::*;

    #[test]
    fn test_stride_divides_spatial_size() {
        let mut rng = SimpleRng::new(1);
        let layer = ConvolutionLayer::new(3, 3, 2, 5, 2, 1, &mut rng).unwrap();
        let output = layer.forward(&Tensor::new(9, 6, 2)).unwrap();
        assert_eq!(output.shape(), TensorShape::new(5, 3, 4));
    }

    #[test]
    fn test_zero_input_yields_offsets() {
        let mut rng = SimpleRng::new(1);
        let layer = ConvolutionLayer::new(3, 3, 1, 3, 1, 1, &mut rng).unwrap();
        let output = layer.forward(&Tensor::new(4, 4, 1)).unwrap();
        let offsets = layer.params().offsets().to_vec();
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(output.channels(x, y), offsets.as_slice());
            }
        }
    }

    #[test]
    fn test_multi_channel_dot_product() {
        let mut rng = SimpleRng::new(1);
        let mut layer = ConvolutionLayer::new(1, 1, 2, 1, 1, 1, &mut rng).unwrap();
        layer.params_mut().filters_mut()[0]
            .data_mut()
            .copy_from_slice(&[3.0, -1.0]);
        layer.params_mut().offsets_mut()[0] = 0.5;

        let input = Tensor::from_vec(1, 1, 2, vec![2.0, 4.0]).unwrap();
        let output = layer.forward(&input).unwrap();
        assert_relative_eq!(output.get(0, 0, 0), 3.0 * 2.0 - 4.0 + 0.5);
    }

    #[test]
    fn test_wrong_depth_is_config_error() {
        let mut rng = SimpleRng::new(1);
        let layer = ConvolutionLayer::new(3, 3, 2, 1, 1, 1, &mut rng).unwrap();
        assert!(matches!(
            layer.forward(&Tensor::new(4, 4, 3)),
            Err(CnnError::Config(_))
        ));
    }
}

// ============================================================================
// Deconvolution Tests
// ============================================================================

mod deconvolution_tests {
    use super::*;

    #[test]
    fn test_stride_multiplies_spatial_size() {
        let mut rng = SimpleRng::new(1);
        let layer = DeconvolutionLayer::new(4, 4, 3, 2, 2, &mut rng).unwrap();
        let output = layer.forward(&Tensor::new(5, 3, 2)).unwrap();
        assert_eq!(output.shape(), TensorShape::new(3, 6, 10));
    }

    #[test]
    fn test_unit_kernel_scatters_to_strided_positions() {
        let mut rng = SimpleRng::new(1);
        let mut layer = DeconvolutionLayer::new(1, 1, 1, 1, 2, &mut rng).unwrap();
        layer.params_mut().filters_mut()[0].fill(1.0);
        layer.params_mut().offsets_mut()[0] = 0.25;

        let input = Tensor::from_vec(2, 2, 1, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let output = layer.forward(&input).unwrap();

        assert_relative_eq!(output.get(0, 0, 0), 1.25);
        assert_relative_eq!(output.get(2, 0, 0), 2.25);
        assert_relative_eq!(output.get(0, 2, 0), 3.25);
        assert_relative_eq!(output.get(2, 2, 0), 4.25);
        assert_relative_eq!(output.get(1, 1, 0), 0.25);
    }

    #[test]
    fn test_filter_count_must_match_input_depth() {
        let mut rng = SimpleRng::new(1);
        let layer = DeconvolutionLayer::new(3, 3, 1, 4, 1, &mut rng).unwrap();
        assert!(layer.forward(&Tensor::new(2, 2, 2)).is_err());
    }
}

// ============================================================================
// Shape-Only Layer Tests
// ============================================================================

mod shape_tests {
    use super::*;

    #[test]
    fn test_pooling_and_upsampling_shapes() {
        let mut pooling = SubsamplingLayer::new(PoolingKind::Max, 2, 2).unwrap();
        assert_eq!(
            pooling.calc_sizes(TensorShape::new(3, 8, 6)).unwrap(),
            TensorShape::new(3, 4, 3)
        );
        assert!(matches!(
            pooling.forward(&Tensor::new(6, 8, 3)),
            Err(CnnError::Unsupported(_))
        ));

        let mut upsampling = UpsamplingLayer::new(UpsamplingKind::NearestNeighbor, 2, 3).unwrap();
        assert_eq!(
            upsampling.calc_sizes(TensorShape::new(3, 4, 3)).unwrap(),
            TensorShape::new(3, 12, 6)
        );
    }

    #[test]
    fn test_batch_norm_preserves_shape() {
        let mut layer = BatchNormLayer::new();
        let shape = TensorShape::new(4, 5, 5);
        assert_eq!(layer.calc_sizes(shape).unwrap(), shape);
        let output = layer.forward(&Tensor::zeros(shape)).unwrap();
        assert_eq!(output.shape(), shape);
    }
}

// ============================================================================
// Network Forward Tests
// ============================================================================

mod network_tests {
    use super::*;
    use rust_cnn::layers::ActivationLayer;

    #[test]
    fn test_unit_convolution_doubles_input() {
        let network = unit_network();
        let input = Tensor::filled(TensorShape::new(1, 1, 1), 1.0);
        let output = network.forward_one(&input).unwrap();
        assert_eq!(output.data(), &[2.0]);
    }

    #[test]
    fn test_forward_all_keeps_every_result() {
        let mut rng = SimpleRng::new(9);
        let mut network = Network::new(TensorShape::new(1, 6, 6));
        network
            .add_layer(Box::new(ConvolutionLayer::new(3, 3, 1, 2, 2, 1, &mut rng).unwrap()))
            .unwrap();
        network
            .add_layer(Box::new(ActivationLayer::new(ActivationKind::Tanh)))
            .unwrap();

        let results = network.forward_all(&Tensor::new(6, 6, 1)).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].shape(), TensorShape::new(2, 3, 3));
        assert_eq!(results[2].shape(), TensorShape::new(2, 3, 3));
    }

    #[test]
    fn test_input_shape_is_checked() {
        let network = unit_network();
        assert!(matches!(
            network.forward_one(&Tensor::new(2, 1, 1)),
            Err(CnnError::Shape(_))
        ));
    }

    #[test]
    fn test_rejected_layer_is_not_kept() {
        let mut rng = SimpleRng::new(1);
        let mut network = unit_network();
        let result =
            network.add_layer(Box::new(ConvolutionLayer::new(1, 1, 3, 1, 1, 1, &mut rng).unwrap()));
        assert!(result.is_err());
        assert_eq!(network.len(), 1);
    }

    #[test]
    fn test_rejected_input_shape_is_not_kept() {
        let mut rng = SimpleRng::new(4);
        let mut network = Network::new(TensorShape::new(1, 4, 4));
        network
            .add_layer(Box::new(ConvolutionLayer::new(3, 3, 1, 2, 1, 1, &mut rng).unwrap()))
            .unwrap();

        assert!(matches!(
            network.set_input_shape(TensorShape::new(3, 4, 4)),
            Err(CnnError::Config(_))
        ));
        assert_eq!(network.input_shape(), TensorShape::new(1, 4, 4));
        assert_eq!(network.output_shape(), TensorShape::new(2, 4, 4));
        let output = network.forward_one(&Tensor::new(4, 4, 1)).unwrap();
        assert_eq!(output.shape(), TensorShape::new(2, 4, 4));

        network.set_input_shape(TensorShape::new(1, 8, 6)).unwrap();
        assert_eq!(network.output_shape(), TensorShape::new(2, 8, 6));
    }

    #[test]
    fn test_infer_many_matches_single_inference() {
        let mut rng = SimpleRng::new(21);
        let mut network = Network::new(TensorShape::new(1, 4, 4));
        network
            .add_layer(Box::new(ConvolutionLayer::new(3, 3, 1, 2, 1, 1, &mut rng).unwrap()))
            .unwrap();

        let images: Vec<Tensor> = (0..5)
            .map(|i| Tensor::filled(TensorShape::new(1, 4, 4), i as f32 * 0.1))
            .collect();
        let batch = network.infer_many(&images).unwrap();
        assert_eq!(batch.outputs.len(), 5);
        for (image, output) in images.iter().zip(batch.outputs.iter()) {
            assert_eq!(&network.infer(image).unwrap().output, output);
        }
    }
}
