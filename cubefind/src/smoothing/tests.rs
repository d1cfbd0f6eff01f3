use super::*;

fn line_x(values: &[f32]) -> Buffer3<f32> {
    Buffer3::new(values.len(), 1, 1, values.to_vec())
}

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert!((a - e).abs() < 1e-5, "index {}: expected {}, got {}", i, e, a);
    }
}

// ============================================================================
// Edge modes
// ============================================================================

#[test]
fn test_edge_mode_resolve() {
    // a b c d, positions -2..6
    let n = 4;
    let resolve_all = |mode: EdgeMode| -> Vec<Option<usize>> { (-2..6).map(|i| mode.resolve(i, n)).collect() };

    assert_eq!(
        resolve_all(EdgeMode::Reflect),
        [1usize, 0, 0, 1, 2, 3, 3, 2].map(Some).to_vec()
    );
    assert_eq!(
        resolve_all(EdgeMode::Mirror),
        [2usize, 1, 0, 1, 2, 3, 2, 1].map(Some).to_vec()
    );
    assert_eq!(
        resolve_all(EdgeMode::Nearest),
        [0usize, 0, 0, 1, 2, 3, 3, 3].map(Some).to_vec()
    );
    assert_eq!(
        resolve_all(EdgeMode::Wrap),
        [2usize, 3, 0, 1, 2, 3, 0, 1].map(Some).to_vec()
    );
    assert_eq!(
        resolve_all(EdgeMode::Constant),
        vec![None, None, Some(0), Some(1), Some(2), Some(3), None, None]
    );
}

#[test]
fn test_mirror_single_sample() {
    assert_eq!(EdgeMode::Mirror.resolve(-3, 1), Some(0));
    assert_eq!(EdgeMode::Mirror.resolve(5, 1), Some(0));
}

// ============================================================================
// Kernels
// ============================================================================

#[test]
fn test_gaussian_kernel_normalized_and_truncated() {
    for sigma in [0.5f32, 1.0, 2.0, 3.7] {
        let kernel = gaussian_kernel_1d(sigma);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        let radius = (4.0 * sigma + 0.5) as usize;
        assert_eq!(kernel.len(), 2 * radius + 1);
    }
}

#[test]
#[should_panic(expected = "Sigma must be positive")]
fn test_gaussian_kernel_zero_sigma_panics() {
    gaussian_kernel_1d(0.0);
}

// ============================================================================
// Uniform filter
// ============================================================================

#[test]
fn test_uniform_filter_odd_size() {
    let input = line_x(&[0.0, 0.0, 3.0, 0.0, 0.0]);
    let out = uniform_filter_axis(&input, Axis::X, 3, EdgeMode::Constant);
    assert_close(out.voxels(), &[0.0, 1.0, 1.0, 1.0, 0.0]);
}

#[test]
fn test_uniform_filter_even_size_window_is_left_heavy() {
    // size 2: out[i] = (in[i-1] + in[i]) / 2
    let input = line_x(&[2.0, 4.0, 6.0, 8.0]);
    let out = uniform_filter_axis(&input, Axis::X, 2, EdgeMode::Nearest);
    assert_close(out.voxels(), &[2.0, 3.0, 5.0, 7.0]);
}

#[test]
fn test_uniform_filter_reflect_preserves_constant() {
    let input = Buffer3::new_filled(5, 4, 6, 2.5f32);
    let out = uniform_filter(&input, [3, 2, 5], EdgeMode::Reflect);
    assert!(out.iter().all(|v| (v - 2.5).abs() < 1e-5));
}

#[test]
fn test_uniform_filter_along_depth() {
    let mut input = Buffer3::new_default(2, 2, 5);
    input[(1, 0, 2)] = 5.0;
    let out = uniform_filter_axis(&input, Axis::Z, 5, EdgeMode::Constant);
    for z in 0..5 {
        assert!((out[(1, 0, z)] - 1.0).abs() < 1e-6, "z={}", z);
        assert_eq!(out[(0, 0, z)], 0.0);
        assert_eq!(out[(1, 1, z)], 0.0);
    }
}

#[test]
fn test_uniform_size_one_is_identity() {
    let input = line_x(&[1.0, -2.0, 3.0]);
    assert_eq!(uniform_filter_axis(&input, Axis::X, 1, EdgeMode::Constant), input);
}

// ============================================================================
// Gaussian filter
// ============================================================================

#[test]
fn test_gaussian_filter_conserves_flux_in_interior() {
    let mut input = Buffer3::new_default(31, 31, 31);
    input[(15, 15, 15)] = 1000.0;
    let out = gaussian_filter(&input, [1.5, 2.0, 2.5], EdgeMode::Constant);
    let total: f32 = out.iter().sum();
    assert!((total - 1000.0).abs() < 0.5, "total {}", total);

    // Peak stays at the impulse, profile is symmetric
    let peak = out[(15, 15, 15)];
    assert!(out.iter().all(|&v| v <= peak));
    assert!((out[(14, 15, 15)] - out[(16, 15, 15)]).abs() < 1e-4);
    assert!((out[(15, 12, 15)] - out[(15, 18, 15)]).abs() < 1e-4);
}

#[test]
fn test_gaussian_incremental_matches_direct() {
    // Two passes with s1 and sqrt(s2^2 - s1^2) equal one pass with s2.
    let mut input = Buffer3::new_default(1, 1, 61);
    input[(0, 0, 30)] = 1.0;
    let direct = gaussian_filter_axis(&input, Axis::Z, 3.0, EdgeMode::Constant);
    let step = gaussian_filter_axis(&input, Axis::Z, 1.5, EdgeMode::Constant);
    let incremental = gaussian_filter_axis(&step, Axis::Z, (9.0f32 - 2.25).sqrt(), EdgeMode::Constant);
    for z in 0..61 {
        assert!(
            (direct[(0, 0, z)] - incremental[(0, 0, z)]).abs() < 1e-3,
            "z={}: {} vs {}",
            z,
            direct[(0, 0, z)],
            incremental[(0, 0, z)]
        );
    }
}

#[test]
fn test_gaussian_zero_sigma_axes_untouched() {
    let mut input = Buffer3::new_default(9, 9, 3);
    input[(4, 4, 1)] = 1.0;
    let out = gaussian_filter(&input, [1.0, 0.0, 0.0], EdgeMode::Constant);
    for z in [0, 2] {
        for y in 0..9 {
            for x in 0..9 {
                assert_eq!(out[(x, y, z)], 0.0);
            }
        }
    }
    assert_eq!(out[(4, 3, 1)], 0.0);
    assert!(out[(3, 4, 1)] > 0.0);
}

// ============================================================================
// Median filter
// ============================================================================

#[test]
fn test_median_filter_removes_spike() {
    let mut input = Buffer3::new_filled(5, 5, 5, 1.0f32);
    input[(2, 2, 2)] = 100.0;
    let out = median_filter(&input, [3, 3, 3], EdgeMode::Reflect);
    assert!(out.iter().all(|&v| v == 1.0));
}

#[test]
fn test_median_filter_constant_padding_counts_zeros() {
    let input = line_x(&[5.0, 5.0, 5.0]);
    let out = median_filter(&input, [3, 1, 1], EdgeMode::Constant);
    // Edges see (0, 5, 5)
    assert_eq!(out.voxels(), &[5.0, 5.0, 5.0]);
    let out = median_filter(&input, [5, 1, 1], EdgeMode::Constant);
    assert_eq!(out.voxels(), &[5.0, 5.0, 5.0]);
    // Every width-7 window holds four padding zeros
    let out = median_filter(&input, [7, 1, 1], EdgeMode::Constant);
    assert_eq!(out.voxels(), &[0.0, 0.0, 0.0]);
}

#[test]
#[should_panic(expected = "median window sizes must be positive")]
fn test_median_filter_zero_size_panics() {
    let input = line_x(&[1.0]);
    median_filter(&input, [0, 1, 1], EdgeMode::Constant);
}
