//! Robust noise (σ) estimation for data cubes.
//!
//! Three interchangeable statistics are available through [`NoiseMode`]:
//!
//! - **Negative**: fits a zero-mean Gaussian to the histogram of the
//!   negative voxel values. Real emission only adds a positive tail, so the
//!   negative half of the distribution is a clean sample of the noise.
//! - **Mad**: median absolute deviation scaled to an equivalent σ.
//! - **Std**: plain standard deviation.
//!
//! NaN voxels, and optionally voxels in an exclusion mask, never contribute.

mod histogram;


use common::{BitBuffer3, Buffer3};
use serde::{Deserialize, Serialize};

use crate::cube::Region;
use crate::error::{Error, Result};
use crate::math::statistics::{mad_sigma_f32_mut, mean_and_std};

/// Statistic used to measure the noise level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseMode {
    /// Gaussian fit to the negative half of the flux histogram.
    #[default]
    Negative,
    /// Median absolute deviation divided by 0.6745.
    Mad,
    /// Standard deviation.
    Std,
}

impl NoiseMode {
    pub fn as_str(self) -> &'static str {
        match self {
            NoiseMode::Negative => "negative",
            NoiseMode::Mad => "mad",
            NoiseMode::Std => "std",
        }
    }
}

/// Noise estimator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub mode: NoiseMode,
    /// Zoom factors `[x, y, z]`; the statistic is measured on the central
    /// `1 / zoom` of each axis. 1 uses the whole axis.
    pub zoom: [f64; 3],
    /// Initial number of histogram bins between the cube minimum and zero.
    pub histogram_bins: usize,
    /// Minimum fraction of the counted voxels that the bin nearest zero
    /// must hold; finer histograms are coarsened until it does.
    pub min_hist_peak: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            mode: NoiseMode::Negative,
            zoom: [1.0, 1.0, 1.0],
            histogram_bins: 10_000,
            min_hist_peak: 0.05,
        }
    }
}

impl NoiseConfig {
    pub fn with_mode(mode: NoiseMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn validate(&self) {
        for (axis, &zoom) in ["x", "y", "z"].iter().zip(self.zoom.iter()) {
            assert!(
                zoom >= 1.0 && zoom.is_finite(),
                "zoom factor along {} must be >= 1, got {}",
                axis,
                zoom
            );
        }
        assert!(
            self.histogram_bins >= 2,
            "histogram_bins must be at least 2, got {}",
            self.histogram_bins
        );
        assert!(
            self.min_hist_peak > 0.0 && self.min_hist_peak < 1.0,
            "min_hist_peak must be in (0, 1), got {}",
            self.min_hist_peak
        );
    }

    pub(crate) fn provenance_entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("mode", self.mode.as_str().to_string()),
            (
                "zoom",
                format!("{},{},{}", self.zoom[0], self.zoom[1], self.zoom[2]),
            ),
            ("histogram_bins", self.histogram_bins.to_string()),
            ("min_hist_peak", self.min_hist_peak.to_string()),
        ]
    }
}

/// Estimate the noise level of `cube`.
///
/// Fails with [`Error::EmptyRegion`] if the measured region holds no
/// finite voxel.
pub fn estimate_noise(cube: &Buffer3<f32>, config: &NoiseConfig) -> Result<f32> {
    estimate_noise_excluding(cube, None, config)
}

/// Estimate the noise level, ignoring voxels set in `exclude`.
///
/// Used on smoothed working copies whose NaNs were zeroed before
/// smoothing: `exclude` holds the original NaN positions.
pub fn estimate_noise_excluding(
    cube: &Buffer3<f32>,
    exclude: Option<&BitBuffer3>,
    config: &NoiseConfig,
) -> Result<f32> {
    config.validate();

    let region = Region::central(cube.width(), cube.height(), cube.depth(), config.zoom);
    let usable = |idx: usize| {
        let v = cube[idx];
        !v.is_nan() && exclude.is_none_or(|mask| !mask.get(idx))
    };
    let mut values: Vec<f32> = region
        .indices(cube)
        .filter(|&idx| usable(idx))
        .map(|idx| cube[idx])
        .collect();

    if values.is_empty() {
        return Err(Error::EmptyRegion);
    }

    let sigma = match config.mode {
        NoiseMode::Std => mean_and_std(values.iter().copied()).map(|(_, std)| std),
        NoiseMode::Mad => mad_sigma_f32_mut(&mut values),
        NoiseMode::Negative => {
            // Histogram range is set by the minimum of the whole cube.
            let cube_min = (0..cube.len())
                .filter(|&idx| usable(idx))
                .map(|idx| cube[idx])
                .fold(f32::INFINITY, f32::min);
            match histogram::fit_negative_gaussian(&values, cube_min, config) {
                Some(sigma) => Some(sigma),
                None => {
                    tracing::warn!(
                        cube_min,
                        "Negative-histogram noise fit failed; falling back to MAD"
                    );
                    mad_sigma_f32_mut(&mut values)
                }
            }
        }
    };

    let sigma = sigma.ok_or(Error::EmptyRegion)? as f32;
    tracing::debug!(mode = config.mode.as_str(), sigma, voxels = region.len(), "Noise estimated");
    Ok(sigma)
}
