//! Input conditioning applied to a working copy before detection.
//!
//! Steps run in this order, each optional:
//!
//! 1. Flag regions to NaN.
//! 2. Multiply by a weights cube or plane.
//! 3. Multiply by a weights function of the voxel coordinates.
//! 4. Smooth with a Gaussian, boxcar or median filter.
//! 5. Divide by the noise per channel, row and column.
//!
//! The caller's cube is never modified; linking later measures sources on
//! the original values.

mod expr;
mod flag;
mod scale;


use common::Buffer3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::smoothing::{EdgeMode, gaussian_filter, median_filter, uniform_filter};

pub use expr::{BinOp, Expr, Func1, Func2, Var, WeightsFunction};
pub use flag::{AxisRange, FlagRegion, flag_regions};
pub use scale::{NoiseProfile, NoiseScaleConfig, ScaleStatistic, scale_noise};

/// Filter used for pre-smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmoothKind {
    /// Kernel entries are standard deviations.
    #[default]
    Gaussian,
    /// Kernel entries are window sizes.
    Boxcar,
    /// Kernel entries are window sizes.
    Median,
}

impl SmoothKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SmoothKind::Gaussian => "gaussian",
            SmoothKind::Boxcar => "boxcar",
            SmoothKind::Median => "median",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothConfig {
    pub kind: SmoothKind,
    /// Kernel `[x, y, z]` in pixels.
    pub kernel: [f32; 3],
    pub edge_mode: EdgeMode,
}

impl Default for SmoothConfig {
    fn default() -> Self {
        Self {
            kind: SmoothKind::Gaussian,
            kernel: [3.0, 3.0, 3.0],
            edge_mode: EdgeMode::Constant,
        }
    }
}

impl SmoothConfig {
    pub fn validate(&self) {
        for (axis, &k) in ["x", "y", "z"].iter().zip(self.kernel.iter()) {
            assert!(
                k >= 0.0 && k.is_finite(),
                "smoothing kernel along {} must be non-negative, got {}",
                axis,
                k
            );
        }
    }

    fn window_sizes(&self) -> [usize; 3] {
        self.kernel.map(|k| k.round() as usize)
    }
}

/// Preconditioning options. Every step is skipped unless configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreconditionConfig {
    pub flag_regions: Vec<FlagRegion>,
    /// Expression in `x`, `y` and `z` multiplied into the cube.
    pub weights_function: Option<String>,
    pub smoothing: Option<SmoothConfig>,
    pub noise_scaling: Option<NoiseScaleConfig>,
}

impl PreconditionConfig {
    pub fn validate(&self) {
        if let Some(smoothing) = &self.smoothing {
            smoothing.validate();
        }
    }

    /// Whether any step changes the data.
    pub fn is_noop(&self) -> bool {
        self.flag_regions.is_empty()
            && self.weights_function.is_none()
            && self.smoothing.is_none()
            && self.noise_scaling.is_none()
    }

    pub(crate) fn provenance_entries(&self) -> Vec<(&'static str, String)> {
        let regions: Vec<String> = self.flag_regions.iter().map(|r| r.to_string()).collect();
        let mut entries = vec![
            ("flag_regions", regions.join(" ")),
            (
                "weights_function",
                self.weights_function.clone().unwrap_or_default(),
            ),
        ];
        match &self.smoothing {
            Some(s) => entries.extend([
                ("smooth_kind", s.kind.as_str().to_string()),
                (
                    "smooth_kernel",
                    format!("{},{},{}", s.kernel[0], s.kernel[1], s.kernel[2]),
                ),
                ("smooth_edge_mode", s.edge_mode.as_str().to_string()),
            ]),
            None => entries.push(("smooth_kind", "none".to_string())),
        }
        match &self.noise_scaling {
            Some(s) => entries.extend(s.provenance_entries()),
            None => entries.push(("scale_statistic", "none".to_string())),
        }
        entries
    }
}

/// Run every configured step on a copy of `cube`.
///
/// `weights` is an optional weights cube of the same shape, or a single
/// plane that applies to every channel.
pub fn precondition(
    cube: &Buffer3<f32>,
    config: &PreconditionConfig,
    weights: Option<&Buffer3<f32>>,
) -> Result<Buffer3<f32>> {
    config.validate();
    // Parse before doing any work.
    let function = config
        .weights_function
        .as_deref()
        .map(WeightsFunction::parse)
        .transpose()?;

    let mut working = cube.clone();
    if !config.flag_regions.is_empty() {
        flag_regions(&mut working, &config.flag_regions)?;
    }
    if let Some(weights) = weights {
        apply_weights(&mut working, weights)?;
    }
    if let Some(function) = &function {
        apply_weights_function(&mut working, function)?;
    }
    if let Some(smoothing) = &config.smoothing {
        working = presmooth(&working, smoothing);
    }
    if let Some(scaling) = &config.noise_scaling {
        scale_noise(&mut working, scaling);
    }
    Ok(working)
}

/// Multiply `cube` by `weights`, broadcasting a single weights plane along
/// the spectral axis.
pub fn apply_weights(cube: &mut Buffer3<f32>, weights: &Buffer3<f32>) -> Result<()> {
    let spatial_match = weights.width() == cube.width() && weights.height() == cube.height();
    let depth_match = weights.depth() == cube.depth() || weights.depth() == 1;
    if !spatial_match || !depth_match {
        return Err(Error::ShapeMismatch {
            what: "weights cube",
            expected: vec![cube.depth(), cube.height(), cube.width()],
            actual: vec![weights.depth(), weights.height(), weights.width()],
        });
    }

    let plane_len = cube.plane_len();
    let broadcast = weights.depth() == 1;
    cube.voxels_mut()
        .par_chunks_mut(plane_len)
        .enumerate()
        .for_each(|(z, plane)| {
            let weight_plane = weights.plane(if broadcast { 0 } else { z });
            for (v, &w) in plane.iter_mut().zip(weight_plane) {
                *v *= w;
            }
        });
    tracing::info!(broadcast, "Weights cube applied");
    Ok(())
}

/// Multiply `cube` by `function` evaluated at every voxel.
///
/// A non-finite weight fails with [`Error::NonFiniteWeight`] naming the
/// first offending voxel in raster order; the cube is then partially
/// weighted and should be discarded.
pub fn apply_weights_function(cube: &mut Buffer3<f32>, function: &WeightsFunction) -> Result<()> {
    let width = cube.width();
    let plane_len = cube.plane_len();

    if function.expr().is_constant() {
        let w = function.eval(0, 0, 0);
        if !w.is_finite() {
            return Err(Error::NonFiniteWeight {
                x: 0,
                y: 0,
                z: 0,
                value: w,
            });
        }
        cube.voxels_mut().par_iter_mut().for_each(|v| *v *= w as f32);
        return Ok(());
    }

    let failures: Vec<Option<Error>> = cube
        .voxels_mut()
        .par_chunks_mut(plane_len)
        .enumerate()
        .map(|(z, plane)| {
            for (i, v) in plane.iter_mut().enumerate() {
                let (x, y) = (i % width, i / width);
                let w = function.eval(x, y, z);
                if !w.is_finite() {
                    return Some(Error::NonFiniteWeight { x, y, z, value: w });
                }
                *v *= w as f32;
            }
            None
        })
        .collect();

    if let Some(err) = failures.into_iter().flatten().next() {
        return Err(err);
    }
    tracing::info!(function = function.source(), "Weights function applied");
    Ok(())
}

/// Smooth `cube` as configured. NaN voxels are treated as zero by the
/// filter and stay NaN in the output.
pub fn presmooth(cube: &Buffer3<f32>, config: &SmoothConfig) -> Buffer3<f32> {
    config.validate();
    let sizes = config.window_sizes();

    let skip = match config.kind {
        SmoothKind::Gaussian => config.kernel.iter().all(|&k| k == 0.0),
        SmoothKind::Boxcar => sizes.iter().all(|&s| s == 0),
        SmoothKind::Median => sizes.contains(&0),
    };
    if skip {
        tracing::warn!(
            kind = config.kind.as_str(),
            kernel = ?config.kernel,
            "Smoothing kernel is zero; no smoothing applied"
        );
        return cube.clone();
    }

    let zeroed = cube.map(|&v| if v.is_nan() { 0.0 } else { v });
    let mut smoothed = match config.kind {
        SmoothKind::Gaussian => gaussian_filter(&zeroed, config.kernel, config.edge_mode),
        SmoothKind::Boxcar => uniform_filter(&zeroed, sizes, config.edge_mode),
        SmoothKind::Median => median_filter(&zeroed, sizes, config.edge_mode),
    };
    smoothed
        .voxels_mut()
        .par_iter_mut()
        .zip(cube.voxels().par_iter())
        .for_each(|(out, &orig)| {
            if orig.is_nan() {
                *out = f32::NAN;
            }
        });

    tracing::info!(
        kind = config.kind.as_str(),
        kernel = ?config.kernel,
        edge_mode = config.edge_mode.as_str(),
        "Cube smoothed"
    );
    smoothed
}
