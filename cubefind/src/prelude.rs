//! Common imports for driving the source finder.
//!
//! ```rust,ignore
//! use cubefind::prelude::*;
//! ```

pub use crate::{
    CancellationToken, Catalog, Cube, CubeHeader, DetectionConfig, EdgeMode, Error, Kernel,
    KernelUnit, LinkConfig, NoiseConfig, NoiseMode, Pipeline, PipelineConfig, PipelineResult,
    PreconditionConfig, ReliabilityConfig, Result, SourceRecord, SpectralShape, Stage,
};

pub use common::{BitBuffer3, Buffer3};
