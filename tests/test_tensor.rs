// Tests for tensor indexing, construction and element operations.

use rust_cnn::tensor::{Tensor, TensorShape};
use rust_cnn::CnnError;

// ============================================================================
// Indexing Tests
// ============================================================================

mod indexing_tests {
    use super::*;

    #[test]
    fn test_set_then_get_round_trips_every_position() {
        let mut tensor = Tensor::new(4, 3, 2);
        for y in 0..3 {
            for x in 0..4 {
                for z in 0..2 {
                    tensor.set(x, y, z, (100 * y + 10 * x + z) as f32);
                }
            }
        }
        for y in 0..3 {
            for x in 0..4 {
                for z in 0..2 {
                    assert_eq!(tensor.get(x, y, z), (100 * y + 10 * x + z) as f32);
                }
            }
        }
    }

    #[test]
    fn test_linear_index_layout() {
        let tensor = Tensor::new(5, 4, 3);
        // ((width * y + x) * depth) + z
        assert_eq!(tensor.index(0, 0, 0), 0);
        assert_eq!(tensor.index(0, 0, 2), 2);
        assert_eq!(tensor.index(1, 0, 0), 3);
        assert_eq!(tensor.index(2, 3, 1), (5 * 3 + 2) * 3 + 1);
    }

    #[test]
    fn test_channels_are_contiguous() {
        let tensor = Tensor::from_vec(2, 1, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(tensor.channels(1, 0), &[4.0, 5.0, 6.0]);
    }
}

// ============================================================================
// Construction Tests
// ============================================================================

mod construction_tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let tensor = Tensor::new(3, 3, 2);
        assert_eq!(tensor.len(), 18);
        assert!(tensor.data().iter().all(|&v| v == 0.0));
        assert_eq!(tensor.shape(), TensorShape::new(2, 3, 3));
    }

    #[test]
    fn test_from_vec_length_mismatch() {
        let result = Tensor::from_vec(2, 2, 1, vec![0.0; 3]);
        assert!(matches!(result, Err(CnnError::Shape(_))));
    }

    #[test]
    #[should_panic(expected = "Tensor dimensions must be positive")]
    fn test_zero_depth_panics() {
        let _ = Tensor::new(2, 2, 0);
    }

    #[test]
    fn test_shape_display() {
        assert_eq!(TensorShape::new(3, 224, 112).to_string(), "3x224x112");
    }
}

// ============================================================================
// Element Operation Tests
// ============================================================================

mod element_tests {
    use super::*;

    #[test]
    fn test_accumulate_adds_elementwise() {
        let mut a = Tensor::filled(TensorShape::new(1, 2, 2), 1.0);
        let b = Tensor::from_vec(2, 2, 1, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        a.accumulate(&b);
        assert_eq!(a.data(), &[2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    #[should_panic(expected = "Tensor shapes must match")]
    fn test_accumulate_shape_mismatch_panics() {
        let mut a = Tensor::new(2, 2, 1);
        a.accumulate(&Tensor::new(2, 2, 2));
    }

    #[test]
    fn test_is_finite_detects_nan() {
        let mut tensor = Tensor::new(2, 2, 1);
        assert!(tensor.is_finite());
        tensor.set(1, 1, 0, f32::NAN);
        assert!(!tensor.is_finite());
    }
}
