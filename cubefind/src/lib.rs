//! Cubefind - source finding in three-dimensional spectral-line data cubes.
//!
//! The engine takes a fully loaded cube (two spatial axes, one spectral axis)
//! and runs it through four stages:
//!
//! 1. **Noise estimation**: robust σ from the negative half of the flux
//!    histogram, the median absolute deviation, or the standard deviation.
//! 2. **Multi-scale detection**: smooth-and-clip over a set of spatial and
//!    spectral kernels, accumulating a boolean detection mask.
//! 3. **Linking**: 3D connected components, merged by bounding-box proximity
//!    and filtered by minimum extent, measured into a source catalog.
//! 4. **Reliability**: kernel density estimates of the positive and negative
//!    source populations give each positive source a reliability score.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use cubefind::prelude::*;
//!
//! let cube = Cube::from_shape(&[depth, height, width], voxels)?;
//! let pipeline = Pipeline::new(PipelineConfig::default());
//! let result = pipeline.run(&cube, &CubeHeader::default(), &CancellationToken::new())?;
//!
//! for source in result.catalog.iter() {
//!     println!("{} {:?}", source.id, source.flux_center);
//! }
//! ```

pub mod catalog;
pub mod cube;
pub mod detection;
mod error;
pub mod linking;
pub(crate) mod math;
pub mod noise;
pub mod pipeline;
pub mod precondition;
pub mod reliability;
pub mod smoothing;

#[cfg(test)]
pub(crate) mod testing;

pub mod prelude;

pub use error::{Error, Result};

pub use catalog::{Catalog, Column, ColumnFormat, ReliabilityScore, SourceRecord, relabel_mask};
pub use cube::{Axis, AxisMeta, Cube, CubeHeader, Region};
pub use detection::{
    Detection, DetectionConfig, Kernel, KernelUnit, ScaleStats, SpectralShape, ThresholdConfig,
    ThresholdMode, default_kernels, detect, detect_with_rms, threshold_filter,
};
pub use linking::{Connectivity, DEFAULT_CONNECTIVITY, LinkConfig, link};
pub use math::Aabb3;
pub use noise::{NoiseConfig, NoiseMode, estimate_noise};
pub use pipeline::{
    CancellationToken, Pipeline, PipelineConfig, PipelineDiagnostics, PipelineResult, Stage,
};
pub use precondition::{
    AxisRange, FlagRegion, NoiseScaleConfig, PreconditionConfig, ScaleStatistic, SmoothConfig,
    SmoothKind, WeightsFunction, precondition,
};
pub use reliability::{
    Parameter, Reliability, ReliabilityConfig, ReliabilityDiagnostics, estimate_reliability,
};
pub use smoothing::EdgeMode;
