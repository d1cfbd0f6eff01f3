//! Gaussian kernel density estimate with a fixed diagonal covariance.

use rayon::prelude::*;

/// Point in the three-dimensional log-parameter space.
pub(super) type Point = [f64; 3];

#[derive(Debug, Clone)]
pub(super) struct GaussianKde {
    points: Vec<Point>,
    inv_bandwidth: [f64; 3],
    /// `n · Π sqrt(2π) · bandwidth`, so the density integrates to 1.
    norm: f64,
}

impl GaussianKde {
    pub(super) fn new(points: Vec<Point>, bandwidth: [f64; 3]) -> Self {
        debug_assert!(bandwidth.iter().all(|&b| b > 0.0));
        let per_point: f64 = bandwidth
            .iter()
            .map(|&b| (2.0 * std::f64::consts::PI).sqrt() * b)
            .product();
        Self {
            norm: per_point * points.len() as f64,
            inv_bandwidth: bandwidth.map(|b| 1.0 / b),
            points,
        }
    }

    #[inline]
    pub(super) fn len(&self) -> usize {
        self.points.len()
    }

    /// Probability density at `q`; 0 for an empty sample.
    pub(super) fn density(&self, q: &Point) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .points
            .iter()
            .map(|p| {
                let mut chi2 = 0.0;
                for axis in 0..3 {
                    let d = (q[axis] - p[axis]) * self.inv_bandwidth[axis];
                    chi2 += d * d;
                }
                (-0.5 * chi2).exp()
            })
            .sum();
        sum / self.norm
    }

    /// Density at every query point, evaluated in parallel.
    pub(super) fn evaluate(&self, queries: &[Point]) -> Vec<f64> {
        queries.par_iter().map(|q| self.density(q)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_point_peak() {
        let bw = [0.5, 1.0, 2.0];
        let kde = GaussianKde::new(vec![[1.0, 2.0, 3.0]], bw);
        let expected = 1.0 / (2.0 * std::f64::consts::PI).powf(1.5) / (0.5 * 1.0 * 2.0);
        assert!((kde.density(&[1.0, 2.0, 3.0]) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_falls_off_by_bandwidth() {
        let kde = GaussianKde::new(vec![[0.0; 3]], [0.1, 1.0, 1.0]);
        let peak = kde.density(&[0.0; 3]);
        // One bandwidth away along any axis: exp(-1/2)
        let ratio_x = kde.density(&[0.1, 0.0, 0.0]) / peak;
        let ratio_y = kde.density(&[0.0, 1.0, 0.0]) / peak;
        assert!((ratio_x - (-0.5f64).exp()).abs() < 1e-12);
        assert!((ratio_y - ratio_x).abs() < 1e-12);
    }

    #[test]
    fn test_normalised_by_sample_size() {
        let one = GaussianKde::new(vec![[0.0; 3]], [1.0; 3]);
        let two = GaussianKde::new(vec![[0.0; 3], [0.0; 3]], [1.0; 3]);
        assert!((one.density(&[0.3, 0.0, 0.0]) - two.density(&[0.3, 0.0, 0.0])).abs() < 1e-12);
    }

    #[test]
    fn test_empty_sample_is_zero() {
        let kde = GaussianKde::new(vec![], [1.0; 3]);
        assert_eq!(kde.density(&[0.0; 3]), 0.0);
        assert_eq!(kde.evaluate(&[[0.0; 3], [1.0; 3]]), vec![0.0, 0.0]);
    }
}
