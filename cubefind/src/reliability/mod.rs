//! Reliability of detected sources from positive/negative symmetry.
//!
//! Noise produces positive and negative detections in equal measure, while
//! real emission is positive only. Comparing the density of positive and
//! negative sources at a positive source's location in a log-parameter space
//! therefore estimates the chance that the source is real:
//!
//! ```text
//! R = (Np - Nn) / Np
//! ```
//!
//! where `Np` and `Nn` are Gaussian kernel density estimates of the two
//! populations, each scaled by its population size.

mod kde;


use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, ReliabilityScore, SourceRecord};
use crate::error::{Error, Result};
use crate::math::statistics::median_f64;

use kde::{GaussianKde, Point};

/// Scale from density to source count within the ±1σ kernel box.
const ONE_SIGMA_BOX_FRACTION: f64 = 0.85;

/// Source measurement used as one axis of the parameter space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    /// `|Ftot|`.
    TotalFlux,
    /// `Fmax` for positive sources, `-Fmin` for negative ones.
    PeakFlux,
    VoxelCount,
    ChannelCount,
}

impl Parameter {
    pub fn as_str(self) -> &'static str {
        match self {
            Parameter::TotalFlux => "total_flux",
            Parameter::PeakFlux => "peak_flux",
            Parameter::VoxelCount => "voxel_count",
            Parameter::ChannelCount => "channel_count",
        }
    }

    /// Sign-independent value of this parameter for `record`.
    pub fn value(self, record: &SourceRecord) -> f64 {
        match self {
            Parameter::TotalFlux => record.flux_total.abs(),
            Parameter::PeakFlux => {
                if record.is_positive() {
                    record.flux_max
                } else {
                    -record.flux_min
                }
            }
            Parameter::VoxelCount => record.n_voxels as f64,
            Parameter::ChannelCount => record.channel_count() as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityConfig {
    /// Parameter-space axes; each is used as `log10(value)`.
    pub parameters: [Parameter; 3],
    /// Kernel standard deviation along each axis, in dex.
    pub bandwidths: [f64; 3],
    /// Minimum reliability of a reliable source.
    pub threshold: f64,
    /// Minimum `(Np + Nn)` within the ±1σ kernel box of a reliable source.
    pub min_neighbours: f64,
    /// Minimum total flux of a reliable source.
    pub min_flux: f64,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            parameters: [
                Parameter::TotalFlux,
                Parameter::PeakFlux,
                Parameter::VoxelCount,
            ],
            bandwidths: [0.15, 0.05, 0.1],
            threshold: 0.9,
            min_neighbours: 0.0,
            min_flux: 0.0,
        }
    }
}

impl ReliabilityConfig {
    pub fn validate(&self) {
        for (&parameter, &bw) in self.parameters.iter().zip(self.bandwidths.iter()) {
            assert!(
                bw > 0.0 && bw.is_finite(),
                "bandwidth for {} must be positive, got {}",
                parameter.as_str(),
                bw
            );
        }
        assert!(
            (0.0..=1.0).contains(&self.threshold),
            "reliability threshold must be in [0, 1], got {}",
            self.threshold
        );
        assert!(
            self.min_neighbours >= 0.0,
            "min_neighbours must be non-negative, got {}",
            self.min_neighbours
        );
    }

    /// `Π 2·bandwidth`: volume of the ±1σ kernel box.
    pub fn kernel_volume(&self) -> f64 {
        self.bandwidths.iter().map(|b| 2.0 * b).product()
    }

    pub(crate) fn provenance_entries(&self) -> Vec<(&'static str, String)> {
        let parameters: Vec<&str> = self.parameters.iter().map(|p| p.as_str()).collect();
        vec![
            ("parameters", parameters.join(",")),
            (
                "bandwidths",
                format!(
                    "{},{},{}",
                    self.bandwidths[0], self.bandwidths[1], self.bandwidths[2]
                ),
            ),
            ("threshold", self.threshold.to_string()),
            ("min_neighbours", self.min_neighbours.to_string()),
            ("min_flux", self.min_flux.to_string()),
        ]
    }
}

/// Summary statistics of a reliability run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityDiagnostics {
    pub positive: usize,
    pub negative: usize,
    /// Positive sources with `R >= threshold`, before the other floors.
    pub above_threshold: usize,
    pub reliable: usize,
    /// Median statistical error of R at positive sources.
    pub median_error_positive: f64,
    /// Median statistical error of R at negative sources.
    pub median_error_negative: f64,
    /// Positive sources with R < 0.
    pub positive_below_zero: usize,
    /// Negative sources at whose location R < 0.
    pub negative_below_zero: usize,
}

/// Result of [`estimate_reliability`].
#[derive(Debug, Clone)]
pub struct Reliability {
    /// Input catalog with every record annotated; negative sources carry
    /// reliability -1.
    pub catalog: Catalog,
    /// IDs of reliable positive sources, in catalog order.
    pub reliable_ids: Vec<u32>,
    pub diagnostics: ReliabilityDiagnostics,
}

/// Score every source of `catalog` and select the reliable ones.
///
/// Fails if either population is empty, or if any reliability exceeds 1.
pub fn estimate_reliability(catalog: &Catalog, config: &ReliabilityConfig) -> Result<Reliability> {
    config.validate();

    let (positive, negative): (Vec<&SourceRecord>, Vec<&SourceRecord>) =
        catalog.iter().partition(|r| r.is_positive());
    if positive.is_empty() {
        return Err(Error::NoPositiveSources);
    }
    if negative.is_empty() {
        return Err(Error::NoNegativeSources);
    }

    let pos_points: Vec<Point> = positive.iter().map(|r| log_parameters(r, config)).collect();
    let neg_points: Vec<Point> = negative.iter().map(|r| log_parameters(r, config)).collect();

    let pos_kde = GaussianKde::new(finite_points(&pos_points, "positive"), config.bandwidths);
    let neg_kde = GaussianKde::new(finite_points(&neg_points, "negative"), config.bandwidths);
    let n_pos = positive.len() as f64;
    let n_neg = negative.len() as f64;
    tracing::debug!(
        positive = positive.len(),
        negative = negative.len(),
        pos_samples = pos_kde.len(),
        neg_samples = neg_kde.len(),
        "Density fields built"
    );

    let scaled = |kde: &GaussianKde, points: &[Point], n: f64| -> Vec<f64> {
        kde.evaluate(points).into_iter().map(|d| d * n).collect()
    };
    let nps = scaled(&pos_kde, &pos_points, n_pos);
    let nns = scaled(&neg_kde, &pos_points, n_neg);

    let reliabilities: Vec<f64> = nps
        .iter()
        .zip(&nns)
        .map(|(&p, &n)| if p > 0.0 { (p - n) / p } else { 0.0 })
        .collect();
    let max_reliability = reliabilities.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max_reliability > 1.0 {
        return Err(Error::DensityInversion { max_reliability });
    }

    let box_volume = ONE_SIGMA_BOX_FRACTION * config.kernel_volume();
    let mut diagnostics = ReliabilityDiagnostics {
        positive: positive.len(),
        negative: negative.len(),
        ..Default::default()
    };

    let mut scores = Vec::with_capacity(positive.len());
    let mut reliable_ids = Vec::new();
    for (i, record) in positive.iter().enumerate() {
        let r = reliabilities[i];
        let above = r.max(0.0) >= config.threshold;
        let enough_neighbours = (nps[i] + nns[i]) * box_volume > config.min_neighbours;
        if above {
            diagnostics.above_threshold += 1;
        }
        if r < 0.0 {
            diagnostics.positive_below_zero += 1;
        }
        if above && enough_neighbours && record.flux_total > config.min_flux {
            reliable_ids.push(record.id);
        }
        scores.push(ReliabilityScore {
            n_pos: nps[i],
            n_neg: nns[i],
            reliability: r.max(0.0),
        });
    }
    diagnostics.reliable = reliable_ids.len();

    let errors_pos: Vec<f64> = nps
        .iter()
        .zip(&nns)
        .map(|(&p, &n)| reliability_error(p, n, box_volume))
        .filter(|e| e.is_finite())
        .collect();
    diagnostics.median_error_positive = median_f64(&errors_pos);

    // Same field evaluated at the negative sources, as a noise-only check.
    let neg_nps = scaled(&pos_kde, &neg_points, n_pos);
    let neg_nns = scaled(&neg_kde, &neg_points, n_neg);
    let errors_neg: Vec<f64> = neg_nps
        .iter()
        .zip(&neg_nns)
        .map(|(&p, &n)| reliability_error(p, n, box_volume))
        .filter(|e| e.is_finite())
        .collect();
    diagnostics.median_error_negative = median_f64(&errors_neg);
    diagnostics.negative_below_zero = neg_nps.iter().zip(&neg_nns).filter(|(p, n)| p < n).count();

    // Positive scores are in catalog order.
    let mut scores = scores.into_iter();
    let mut annotated = catalog.clone();
    for record in annotated.records_mut() {
        record.reliability = Some(if record.is_positive() {
            scores.next().unwrap_or_default()
        } else {
            ReliabilityScore {
                n_pos: 0.0,
                n_neg: 0.0,
                reliability: -1.0,
            }
        });
    }

    tracing::info!(
        positive = diagnostics.positive,
        negative = diagnostics.negative,
        above_threshold = diagnostics.above_threshold,
        reliable = diagnostics.reliable,
        threshold = config.threshold,
        median_error = diagnostics.median_error_positive,
        "Reliability estimated"
    );

    Ok(Reliability {
        catalog: annotated,
        reliable_ids,
        diagnostics,
    })
}

fn log_parameters(record: &SourceRecord, config: &ReliabilityConfig) -> Point {
    config.parameters.map(|p| p.value(record).log10())
}

/// Points usable as KDE samples; sources with non-positive parameters
/// have no logarithm and are left out.
fn finite_points(points: &[Point], population: &str) -> Vec<Point> {
    let finite: Vec<Point> = points
        .iter()
        .filter(|p| p.iter().all(|v| v.is_finite()))
        .copied()
        .collect();
    if finite.len() < points.len() {
        tracing::warn!(
            population,
            skipped = points.len() - finite.len(),
            "Sources with non-positive parameters left out of density field"
        );
    }
    finite
}

/// Poisson error of `R = (p - n) / p` for counts within the kernel box.
#[inline]
fn reliability_error(p: f64, n: f64, box_volume: f64) -> f64 {
    (p * n * (p + n)).sqrt() / (p * p) / box_volume.sqrt()
}
