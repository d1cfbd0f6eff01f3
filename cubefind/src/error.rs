//! Error type shared by every stage of the source finder.

use thiserror::Error;

use crate::pipeline::Stage;

/// Fatal conditions that abort a source-finding run.
///
/// Recoverable numerical conditions (histogram coarsening, fit
/// non-convergence, empty detection masks) are logged instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unsupported cube dimensionality: {naxis} axes with shape {shape:?}")]
    UnsupportedDimensionality { naxis: usize, shape: Vec<usize> },

    #[error("Unsupported spectral kernel shape '{0}', expected 'b' (boxcar) or 'g' (gaussian)")]
    UnsupportedKernelShape(String),

    #[error("No finite voxels in noise statistics region")]
    EmptyRegion,

    #[error("No positive sources found; reliability cannot be estimated")]
    NoPositiveSources,

    #[error("No negative sources found; reliability cannot be estimated")]
    NoNegativeSources,

    #[error("Density inversion: maximum reliability {max_reliability} exceeds 1")]
    DensityInversion { max_reliability: f64 },

    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Invalid weights function '{expression}': {reason}")]
    InvalidWeightsFunction { expression: String, reason: String },

    #[error("Weights function evaluated to non-finite value {value} at voxel ({x}, {y}, {z})")]
    NonFiniteWeight {
        x: usize,
        y: usize,
        z: usize,
        value: f64,
    },

    #[error("Invalid flag region {region}: {reason}")]
    InvalidFlagRegion { region: String, reason: String },

    #[error("Invalid {format} configuration: {message}")]
    Config {
        format: &'static str,
        message: String,
    },

    #[error("Run cancelled before stage {0}")]
    Cancelled(Stage),
}

pub type Result<T> = std::result::Result<T, Error>;
