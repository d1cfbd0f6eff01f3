//! Removal of detections smaller than the current smoothing scale.

use common::{BitBuffer3, Buffer3};

use super::config::SpectralShape;
use crate::cube::Axis;
use crate::math::fwhm_to_sigma;
use crate::smoothing::{EdgeMode, gaussian_filter, gaussian_filter_axis, uniform_filter_axis};

/// Minimum spectral smoothing applied by the size filter, in channels.
const MIN_SPECTRAL_SIZE: f32 = 3.0;

/// Smooth a detection mask to the resolution of the kernel convolved with
/// the beam and keep voxels where the smoothed mask reaches `threshold`.
///
/// `kernel` is `(x, y, z)` in pixels; `beam` is the beam FWHM `(x, y)`.
pub(crate) fn size_filter(
    mask: &BitBuffer3,
    kernel: (f32, f32, f32),
    shape: SpectralShape,
    beam: (f32, f32),
    threshold: f32,
    edge_mode: EdgeMode,
) -> BitBuffer3 {
    let (kx, ky, kz) = kernel;
    let values: Vec<f32> = mask.iter().map(|set| if set { 1.0 } else { 0.0 }).collect();
    let values = Buffer3::new(mask.width(), mask.height(), mask.depth(), values);

    let sigma_x = fwhm_to_sigma((kx * kx + beam.0 * beam.0).sqrt());
    let sigma_y = fwhm_to_sigma((ky * ky + beam.1 * beam.1).sqrt());
    let smoothed = gaussian_filter(&values, [sigma_x, sigma_y, 0.0], edge_mode);

    let smoothed = match shape {
        SpectralShape::Boxcar => {
            let size = kz.max(MIN_SPECTRAL_SIZE).round() as usize;
            uniform_filter_axis(&smoothed, Axis::Z, size, edge_mode)
        }
        SpectralShape::Gaussian => {
            let sigma = fwhm_to_sigma(kz).max(MIN_SPECTRAL_SIZE);
            gaussian_filter_axis(&smoothed, Axis::Z, sigma, edge_mode)
        }
    };

    let mut filtered = BitBuffer3::new_default(mask.width(), mask.height(), mask.depth());
    for (idx, &v) in smoothed.iter().enumerate() {
        if v >= threshold {
            filtered.set(idx, true);
        }
    }
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolated_voxel_removed_extended_region_kept() {
        let (w, h, d) = (24, 24, 24);
        let mut mask = BitBuffer3::new_default(w, h, d);
        // Single noise spike
        mask.set_xyz(3, 3, 3, true);
        // Solid 9x9x9 block
        for z in 10..19 {
            for y in 10..19 {
                for x in 10..19 {
                    mask.set_xyz(x, y, z, true);
                }
            }
        }

        let filtered = size_filter(
            &mask,
            (3.0, 3.0, 3.0),
            SpectralShape::Boxcar,
            (0.0, 0.0),
            0.5,
            EdgeMode::Constant,
        );

        assert!(!filtered.get_xyz(3, 3, 3));
        assert!(filtered.get_xyz(14, 14, 14));
        assert!(filtered.count_ones() > 0);
    }

    #[test]
    fn test_empty_mask_stays_empty() {
        let mask = BitBuffer3::new_default(8, 8, 8);
        let filtered = size_filter(
            &mask,
            (0.0, 0.0, 0.0),
            SpectralShape::Gaussian,
            (2.0, 2.0),
            0.1,
            EdgeMode::Reflect,
        );
        assert_eq!(filtered.count_ones(), 0);
    }
}
