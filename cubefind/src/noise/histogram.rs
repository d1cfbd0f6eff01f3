//! Gaussian fit to the negative half of the flux histogram.

use super::NoiseConfig;
use crate::math::FWHM_TO_SIGMA_DIVISOR;
use crate::math::lm::{CurveModel, FitConfig, fit_curve};

/// Lower bound on the bin count when coarsening.
const MIN_BINS: usize = 8;

/// Histogram of values in `[min, 0]` with equal-width bins.
#[derive(Debug)]
struct NegativeHistogram {
    counts: Vec<f64>,
    centers: Vec<f64>,
}

impl NegativeHistogram {
    fn build(values: &[f32], min: f32, bins: usize) -> Self {
        let min = min as f64;
        let width = min.abs() / bins as f64;
        let mut counts = vec![0.0f64; bins];

        for &v in values {
            let v = v as f64;
            if v < min || v > 0.0 {
                continue;
            }
            // The right edge (exactly 0) belongs to the last bin.
            let idx = (((v - min) / width) as usize).min(bins - 1);
            counts[idx] += 1.0;
        }

        let centers = (0..bins).map(|i| min + (i as f64 + 0.5) * width).collect();
        Self { counts, centers }
    }

    fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Number of extra bins next to zero that must be merged so the bins
    /// nearest zero hold at least `min_fraction` of all counts.
    fn bins_to_merge(&self, min_fraction: f64) -> usize {
        let target = min_fraction * self.total();
        let mut summed = 0usize;
        let mut tail = 0.0f64;
        for &count in self.counts.iter().rev() {
            tail += count;
            if tail >= target {
                break;
            }
            summed += 1;
        }
        summed.min(self.counts.len().saturating_sub(1))
    }

    /// Share of all counts in the bin next to zero.
    fn zero_bin_fraction(&self) -> f64 {
        let total = self.total();
        match self.counts.last() {
            Some(&last) if total > 0.0 => last / total,
            _ => 0.0,
        }
    }

    fn peak(&self) -> f64 {
        self.counts.iter().copied().fold(0.0, f64::max)
    }
}

/// Histogram of the negative values, coarsened until the bin next to zero
/// holds at least `min_hist_peak` of all counts or `MIN_BINS` is reached.
fn coarsened_histogram(values: &[f32], cube_min: f32, config: &NoiseConfig) -> (usize, NegativeHistogram) {
    let mut bins = config.histogram_bins;
    let mut histogram = NegativeHistogram::build(values, cube_min, bins);

    loop {
        let merge = histogram.bins_to_merge(config.min_hist_peak);
        if merge == 0 {
            break;
        }
        // The zero bin must span the merged bins plus itself.
        let coarser = (bins / (merge + 1)).max(MIN_BINS);
        if coarser >= bins {
            break;
        }
        tracing::debug!(
            from = bins,
            to = coarser,
            min_hist_peak = config.min_hist_peak,
            "Coarsening noise histogram"
        );
        bins = coarser;
        histogram = NegativeHistogram::build(values, cube_min, bins);
    }

    (bins, histogram)
}

/// `N0 * exp(-F^2 / (2 s^2))`.
struct ZeroMeanGaussian {
    min_sigma: f64,
}

impl CurveModel<2> for ZeroMeanGaussian {
    fn eval(&self, x: f64, p: &[f64; 2]) -> (f64, [f64; 2]) {
        let s = p[1];
        let e = (-x * x / (2.0 * s * s)).exp();
        (p[0] * e, [e, p[0] * e * x * x / (s * s * s)])
    }

    fn clamp(&self, p: &mut [f64; 2]) {
        p[1] = p[1].abs().max(self.min_sigma);
    }
}

/// Fit σ to the negative-value histogram of `values`.
///
/// `cube_min` sets the histogram range. Returns `None` when there are no
/// negative values or the fit produces no usable σ.
pub(super) fn fit_negative_gaussian(values: &[f32], cube_min: f32, config: &NoiseConfig) -> Option<f64> {
    if !(cube_min < 0.0) || !cube_min.is_finite() {
        return None;
    }

    let (bins, histogram) = coarsened_histogram(values, cube_min, config);
    if histogram.total() == 0.0 {
        return None;
    }

    let peak = histogram.peak();
    let half_max_flux = histogram
        .counts
        .iter()
        .zip(histogram.centers.iter())
        .filter(|(count, _)| **count < peak / 2.0)
        .map(|(_, center)| *center)
        .fold(f64::NEG_INFINITY, f64::max);
    let sigma_guess = if half_max_flux.is_finite() && half_max_flux < 0.0 {
        -half_max_flux * 2.0 / FWHM_TO_SIGMA_DIVISOR as f64
    } else {
        (cube_min as f64).abs() / 4.0
    };

    let bin_width = (cube_min as f64).abs() / bins as f64;
    let model = ZeroMeanGaussian {
        min_sigma: bin_width * 1e-3,
    };
    let result = fit_curve(
        &model,
        &histogram.centers,
        &histogram.counts,
        [peak, sigma_guess],
        &FitConfig::default(),
    );

    if !result.converged {
        tracing::warn!(
            iterations = result.iterations,
            sigma = result.params[1],
            "Noise histogram fit did not converge; using best estimate"
        );
    }

    let sigma = result.params[1].abs();
    (sigma.is_finite() && sigma > 0.0).then_some(sigma)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::noise_cube;

    #[test]
    fn test_histogram_ignores_positive_values() {
        let values = [-4.0f32, -3.0, -0.5, 0.0, 1.0, 7.0];
        let hist = NegativeHistogram::build(&values, -4.0, 4);
        assert_eq!(hist.counts, vec![1.0, 1.0, 0.0, 2.0]);
        assert_eq!(hist.centers, vec![-3.5, -2.5, -1.5, -0.5]);
    }

    #[test]
    fn test_bins_to_merge() {
        let hist = NegativeHistogram {
            counts: vec![50.0, 30.0, 10.0, 5.0, 3.0, 2.0],
            centers: vec![0.0; 6],
        };
        // 20% of 100 needs the last 4 bins: 2 + 3 + 5 + 10
        assert_eq!(hist.bins_to_merge(0.2), 3);
        assert_eq!(hist.bins_to_merge(0.01), 0);
    }

    #[test]
    fn test_coarsening_reaches_min_peak() {
        let cube = noise_cube(40, 40, 40, 1.0, 5);
        let values: Vec<f32> = cube.iter().copied().collect();
        let cube_min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let config = NoiseConfig::default();

        let (bins, hist) = coarsened_histogram(&values, cube_min, &config);
        assert!(bins < config.histogram_bins);
        assert!(
            hist.zero_bin_fraction() >= config.min_hist_peak,
            "{} bins, zero bin fraction {}",
            bins,
            hist.zero_bin_fraction()
        );
        assert_eq!(hist.bins_to_merge(config.min_hist_peak), 0);
    }

    #[test]
    fn test_coarsening_stops_at_min_bins() {
        let mut values = vec![-100.0f32; 1000];
        values.push(-0.01);
        let config = NoiseConfig::default();
        let (bins, hist) = coarsened_histogram(&values, -100.0, &config);
        assert_eq!(bins, MIN_BINS);
        assert!(hist.zero_bin_fraction() < config.min_hist_peak);
    }

    #[test]
    fn test_no_negative_values() {
        let config = NoiseConfig::default();
        assert!(fit_negative_gaussian(&[1.0, 2.0], 1.0, &config).is_none());
    }
}
