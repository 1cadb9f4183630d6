// Tests for RNG reproducibility and distribution.

use rust_cnn::utils::SimpleRng;

#[test]
fn test_same_seed_same_sequence() {
    let mut a = SimpleRng::new(42);
    let mut b = SimpleRng::new(42);
    for _ in 0..100 {
        assert_eq!(a.next_u32(), b.next_u32());
    }
}

#[test]
fn test_zero_seed_is_usable() {
    let mut rng = SimpleRng::new(0);
    let values: Vec<u32> = (0..10).map(|_| rng.next_u32()).collect();
    assert!(values.iter().any(|&v| v != 0));
}

#[test]
fn test_next_f32_in_unit_interval() {
    let mut rng = SimpleRng::new(7);
    for _ in 0..10_000 {
        let value = rng.next_f32();
        assert!((0.0..1.0).contains(&value));
    }
}

#[test]
fn test_gen_range_bounds() {
    let mut rng = SimpleRng::new(8);
    for _ in 0..1000 {
        let value = rng.gen_range_f32(-0.5, 0.5);
        assert!((-0.5..0.5).contains(&value));
    }
}

#[test]
fn test_gaussian_mean_and_variance() {
    let mut rng = SimpleRng::new(9);
    let n = 20_000;
    let samples: Vec<f32> = (0..n).map(|_| rng.next_gaussian()).collect();
    let mean = samples.iter().sum::<f32>() / n as f32;
    let variance = samples.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / n as f32;
    assert!(mean.abs() < 0.05, "mean {}", mean);
    assert!((variance - 1.0).abs() < 0.1, "variance {}", variance);
}

#[test]
fn test_shuffle_keeps_elements() {
    let mut rng = SimpleRng::new(10);
    let mut data: Vec<usize> = (0..50).collect();
    rng.shuffle(&mut data);
    assert_ne!(data, (0..50).collect::<Vec<_>>());
    data.sort_unstable();
    assert_eq!(data, (0..50).collect::<Vec<_>>());
}

#[test]
fn test_shuffle_depends_on_seed() {
    let mut first: Vec<usize> = (0..20).collect();
    let mut second = first.clone();
    SimpleRng::new(1).shuffle(&mut first);
    SimpleRng::new(2).shuffle(&mut second);
    assert_ne!(first, second);
}
