//! Separable smoothing filters for 3D cubes.
//!
//! All filters are correlations along one axis at a time, so a 3D filter is
//! the product of three 1D passes. Out-of-range samples are resolved through
//! an [`EdgeMode`]. Each output row `(y, z)` is computed independently in
//! parallel.

mod median;

#[cfg(test)]
mod tests;

use common::Buffer3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cube::Axis;

pub use median::median_filter;

/// Gaussian kernels are cut off at this many sigmas.
pub const GAUSSIAN_TRUNCATE: f32 = 4.0;

/// Boundary handling for samples that fall outside the cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeMode {
    /// Zero padding.
    #[default]
    Constant,
    /// Reflect about the edge of the last voxel: `d c b a | a b c d | d c b a`.
    Reflect,
    /// Reflect about the centre of the last voxel: `d c b | a b c d | c b a`.
    Mirror,
    /// Repeat the edge voxel.
    Nearest,
    /// Periodic.
    Wrap,
}

impl EdgeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeMode::Constant => "constant",
            EdgeMode::Reflect => "reflect",
            EdgeMode::Mirror => "mirror",
            EdgeMode::Nearest => "nearest",
            EdgeMode::Wrap => "wrap",
        }
    }

    /// Map a possibly out-of-range position onto `0..n`.
    ///
    /// Returns `None` when the sample lies in the zero padding of
    /// [`EdgeMode::Constant`]. `n` must be non-zero.
    #[inline]
    pub fn resolve(self, i: isize, n: usize) -> Option<usize> {
        let len = n as isize;
        if (0..len).contains(&i) {
            return Some(i as usize);
        }
        let resolved = match self {
            EdgeMode::Constant => return None,
            EdgeMode::Nearest => i.clamp(0, len - 1),
            EdgeMode::Wrap => i.rem_euclid(len),
            EdgeMode::Reflect => {
                let period = 2 * len;
                let m = i.rem_euclid(period);
                if m >= len { period - m - 1 } else { m }
            }
            EdgeMode::Mirror => {
                if len == 1 {
                    return Some(0);
                }
                let period = 2 * len - 2;
                let m = i.rem_euclid(period);
                if m >= len { period - m } else { m }
            }
        };
        Some(resolved as usize)
    }
}

/// Normalized 1D Gaussian kernel with radius `round(4 * sigma)`.
pub fn gaussian_kernel_1d(sigma: f32) -> Vec<f32> {
    assert!(sigma > 0.0, "Sigma must be positive");

    let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as usize;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..=2 * radius)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();

    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Gaussian smoothing along one axis. `sigma <= 0` returns a copy.
pub fn gaussian_filter_axis(input: &Buffer3<f32>, axis: Axis, sigma: f32, mode: EdgeMode) -> Buffer3<f32> {
    if sigma <= 0.0 {
        return input.clone();
    }
    let kernel = gaussian_kernel_1d(sigma);
    let origin = kernel.len() / 2;
    correlate_axis(input, axis, &kernel, origin, mode)
}

/// Separable Gaussian smoothing with per-axis sigmas `[x, y, z]`.
///
/// Axes with a zero sigma are left untouched.
pub fn gaussian_filter(input: &Buffer3<f32>, sigmas: [f32; 3], mode: EdgeMode) -> Buffer3<f32> {
    let mut output = input.clone();
    for axis in Axis::ALL {
        let sigma = sigmas[axis.index()];
        if sigma > 0.0 {
            output = gaussian_filter_axis(&output, axis, sigma, mode);
        }
    }
    output
}

/// Running mean of `size` samples along one axis. `size <= 1` returns a copy.
///
/// The window for position `i` is `[i - size / 2, i - size / 2 + size - 1]`.
pub fn uniform_filter_axis(input: &Buffer3<f32>, axis: Axis, size: usize, mode: EdgeMode) -> Buffer3<f32> {
    if size <= 1 {
        return input.clone();
    }
    let kernel = vec![1.0 / size as f32; size];
    correlate_axis(input, axis, &kernel, size / 2, mode)
}

/// Separable boxcar smoothing with per-axis sizes `[x, y, z]`.
pub fn uniform_filter(input: &Buffer3<f32>, sizes: [usize; 3], mode: EdgeMode) -> Buffer3<f32> {
    let mut output = input.clone();
    for axis in Axis::ALL {
        let size = sizes[axis.index()];
        if size > 1 {
            output = uniform_filter_axis(&output, axis, size, mode);
        }
    }
    output
}

/// `(stride, length)` of `axis` in the linear voxel layout.
#[inline]
pub(crate) fn axis_layout<T>(buf: &Buffer3<T>, axis: Axis) -> (usize, usize) {
    match axis {
        Axis::X => (1, buf.width()),
        Axis::Y => (buf.width(), buf.height()),
        Axis::Z => (buf.plane_len(), buf.depth()),
    }
}

/// Coordinate of voxel `(x, y, z)` along `axis`.
#[inline]
pub(crate) fn axis_coord(axis: Axis, x: usize, y: usize, z: usize) -> usize {
    match axis {
        Axis::X => x,
        Axis::Y => y,
        Axis::Z => z,
    }
}

/// `out[i] = sum_k weights[k] * in[i - origin + k]` along `axis`.
fn correlate_axis(
    input: &Buffer3<f32>,
    axis: Axis,
    weights: &[f32],
    origin: usize,
    mode: EdgeMode,
) -> Buffer3<f32> {
    if input.is_empty() {
        return input.clone();
    }

    let width = input.width();
    let height = input.height();
    let (stride, n) = axis_layout(input, axis);
    let src = input.voxels();
    let mut output = vec![0.0f32; input.len()];

    output
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(row, out_row)| {
            let y = row % height;
            let z = row / height;
            let row_start = row * width;

            for (x, out) in out_row.iter_mut().enumerate() {
                let c = axis_coord(axis, x, y, z);
                let line_start = row_start + x - c * stride;
                let mut sum = 0.0f32;
                for (k, &w) in weights.iter().enumerate() {
                    let pos = c as isize + k as isize - origin as isize;
                    if let Some(j) = mode.resolve(pos, n) {
                        sum += w * src[line_start + j * stride];
                    }
                }
                *out = sum;
            }
        });

    Buffer3::new(width, height, input.depth(), output)
}
