//! End-to-end source finding on one cube.
//!
//! A run moves through [`Stage`]s in order:
//!
//! ```text
//! Idle -> NoiseEstimated -> MaskDetected -> Linked -> ReliabilityFiltered -> Done
//! ```
//!
//! Detection works on a preconditioned copy of the input; linking measures
//! the sources on the caller's original cube. A [`CancellationToken`] is
//! checked before every stage.

#[cfg(test)]
mod tests;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use common::{BitBuffer3, Buffer3};
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, SourceRecord, relabel_mask};
use crate::cube::{Cube, CubeHeader};
use crate::detection::{
    DetectionConfig, ScaleStats, SpectralShape, ThresholdConfig, detect_with_rms, threshold_filter,
};
use crate::error::{Error, Result};
use crate::linking::{LinkConfig, link};
use crate::noise::{NoiseConfig, estimate_noise};
use crate::precondition::{PreconditionConfig, precondition};
use crate::reliability::{ReliabilityConfig, ReliabilityDiagnostics, estimate_reliability};

/// Progress of a run. Each stage names the work completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Idle,
    NoiseEstimated,
    MaskDetected,
    Linked,
    ReliabilityFiltered,
    Done,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::NoiseEstimated => "noise_estimated",
            Stage::MaskDetected => "mask_detected",
            Stage::Linked => "linked",
            Stage::ReliabilityFiltered => "reliability_filtered",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cooperative cancellation flag shared between a run and its controller.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Fail with [`Error::Cancelled`] if cancellation was requested before
    /// `next` started.
    pub fn check(&self, next: Stage) -> Result<()> {
        if self.is_cancelled() {
            tracing::info!(stage = next.as_str(), "Run cancelled");
            return Err(Error::Cancelled(next));
        }
        Ok(())
    }
}

/// Options of every stage plus the switches that enable them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub noise: NoiseConfig,
    pub precondition: PreconditionConfig,
    pub detection: DetectionConfig,
    pub threshold: ThresholdConfig,
    pub link: LinkConfig,
    pub reliability: ReliabilityConfig,
    pub do_precondition: bool,
    /// Multi-scale smooth-and-clip detection.
    pub do_detect: bool,
    /// Plain threshold of the preconditioned cube, OR-ed into the mask.
    pub do_threshold: bool,
    pub do_link: bool,
    pub do_reliability: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            noise: NoiseConfig::default(),
            precondition: PreconditionConfig::default(),
            detection: DetectionConfig::default(),
            threshold: ThresholdConfig::default(),
            link: LinkConfig::default(),
            reliability: ReliabilityConfig::default(),
            do_precondition: true,
            do_detect: true,
            do_threshold: false,
            do_link: true,
            do_reliability: true,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) {
        self.noise.validate();
        self.precondition.validate();
        self.detection.validate();
        self.threshold.validate();
        self.link.validate();
        self.reliability.validate();
    }

    /// Every option as a `group.key=value` line, in a fixed order.
    pub fn provenance(&self) -> Vec<String> {
        let steps = vec![
            ("do_precondition", self.do_precondition.to_string()),
            ("do_detect", self.do_detect.to_string()),
            ("do_threshold", self.do_threshold.to_string()),
            ("do_link", self.do_link.to_string()),
            ("do_reliability", self.do_reliability.to_string()),
        ];
        let groups = [
            ("steps", steps),
            ("noise", self.noise.provenance_entries()),
            ("precondition", self.precondition.provenance_entries()),
            ("detection", self.detection.provenance_entries()),
            ("threshold", self.threshold.provenance_entries()),
            ("linking", self.link.provenance_entries()),
            ("reliability", self.reliability.provenance_entries()),
        ];
        groups
            .into_iter()
            .flat_map(|(group, entries)| {
                entries
                    .into_iter()
                    .map(move |(key, value)| format!("{}.{}={}", group, key, value))
            })
            .collect()
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yml::from_str(text).map_err(|e| {
            let kernels = serde_yml::from_str::<KernelShapeScan>(text).ok();
            config_error("yaml", e.to_string(), kernels)
        })
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yml::to_string(self).map_err(|e| Error::Config {
            format: "yaml",
            message: e.to_string(),
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| {
            let kernels = serde_json::from_str::<KernelShapeScan>(text).ok();
            config_error("json", e.to_string(), kernels)
        })
    }
}

/// Just the kernel shape codes of a configuration document.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KernelShapeScan {
    detection: DetectionShapes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DetectionShapes {
    kernels: Vec<KernelShape>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KernelShape {
    shape: Option<String>,
}

/// An unknown kernel shape code is reported ahead of the generic parse error.
fn config_error(format: &'static str, message: String, kernels: Option<KernelShapeScan>) -> Error {
    let unsupported = kernels
        .into_iter()
        .flat_map(|scan| scan.detection.kernels)
        .filter_map(|kernel| kernel.shape)
        .find_map(|code| code.parse::<SpectralShape>().err());
    unsupported.unwrap_or(Error::Config { format, message })
}

/// Counts and measurements gathered along a run.
#[derive(Debug, Clone, Default)]
pub struct PipelineDiagnostics {
    /// Whether the cube was preconditioned before detection.
    pub preconditioned: bool,
    /// Voxels set by the multi-scale detector.
    pub detected_voxels: usize,
    /// Voxels set by the plain threshold filter.
    pub threshold_voxels: usize,
    /// Voxels in the combined detection mask.
    pub mask_voxels: usize,
    pub scales: Vec<ScaleStats>,
    /// Sources after linking, positive and negative.
    pub linked_sources: usize,
    pub reliability: Option<ReliabilityDiagnostics>,
    pub final_sources: usize,
}

/// Output of [`Pipeline::run`].
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Final sources numbered `1..=n`.
    pub catalog: Catalog,
    /// Every voxel of source `id` holds `id`, everything else 0.
    pub mask: Buffer3<u32>,
    /// Noise of the preconditioned, unsmoothed cube.
    pub noise: f32,
    /// Last stage completed.
    pub stage: Stage,
    pub diagnostics: PipelineDiagnostics,
}

#[derive(Debug, Default)]
pub struct Pipeline {
    config: PipelineConfig,
    weights: Option<Buffer3<f32>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            weights: None,
        }
    }

    /// Multiply the cube by `weights` during preconditioning. A single
    /// plane applies to every channel.
    pub fn with_weights(mut self, weights: Buffer3<f32>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Find sources in `cube`. The cube itself is never modified.
    pub fn run(&self, cube: &Cube, header: &CubeHeader, cancel: &CancellationToken) -> Result<PipelineResult> {
        let config = &self.config;
        config.validate();
        tracing::info!(
            width = cube.width(),
            height = cube.height(),
            depth = cube.depth(),
            "Source finding started"
        );

        let mut diagnostics = PipelineDiagnostics::default();

        // Preconditioning and noise
        cancel.check(Stage::NoiseEstimated)?;
        let apply_precondition =
            config.do_precondition && (!config.precondition.is_noop() || self.weights.is_some());
        let working: Cow<'_, Cube> = if apply_precondition {
            let buffer = precondition(cube, &config.precondition, self.weights.as_ref())?;
            Cow::Owned(Cube::from_buffer(buffer))
        } else {
            Cow::Borrowed(cube)
        };
        diagnostics.preconditioned = apply_precondition;
        let noise = estimate_noise(&working, &config.noise)?;
        tracing::info!(noise, mode = config.noise.mode.as_str(), "Noise estimated");

        // Detection
        cancel.check(Stage::MaskDetected)?;
        let mut mask = BitBuffer3::new_default(cube.width(), cube.height(), cube.depth());
        if config.do_detect {
            let detection = detect_with_rms(&working, header, &config.detection, &config.noise, noise)?;
            diagnostics.detected_voxels = detection.detected_voxels();
            diagnostics.scales = detection.scales;
            mask.or_assign(&detection.mask);
        }
        if config.do_threshold {
            let thresholded = threshold_filter(&working, &config.threshold, noise);
            diagnostics.threshold_voxels = thresholded.count_ones();
            mask.or_assign(&thresholded);
        }
        drop(working);
        diagnostics.mask_voxels = mask.count_ones();

        let finish = |catalog: Catalog, labels: Buffer3<u32>, stage: Stage, mut diagnostics: PipelineDiagnostics| {
            diagnostics.final_sources = catalog.len();
            tracing::info!(sources = catalog.len(), stage = %stage, "Source finding finished");
            PipelineResult {
                catalog,
                mask: labels,
                noise,
                stage,
                diagnostics,
            }
        };

        if diagnostics.mask_voxels == 0 {
            tracing::warn!("No voxels detected; catalog is empty");
            let labels = Buffer3::new_default(cube.width(), cube.height(), cube.depth());
            return Ok(finish(Catalog::new(header.data_unit()), labels, Stage::Done, diagnostics));
        }
        if !config.do_link {
            let labels = Buffer3::new(
                cube.width(),
                cube.height(),
                cube.depth(),
                mask.iter().map(u32::from).collect(),
            );
            return Ok(finish(
                Catalog::new(header.data_unit()),
                labels,
                Stage::MaskDetected,
                diagnostics,
            ));
        }

        // Linking on the original values
        cancel.check(Stage::Linked)?;
        let (mut catalog, mut labels) = link(cube, &mask, &config.link)?;
        drop(mask);
        catalog.set_data_unit(header.data_unit());
        diagnostics.linked_sources = catalog.len();

        // Reliability
        cancel.check(Stage::ReliabilityFiltered)?;
        let remap = if config.do_reliability {
            let reliability = estimate_reliability(&catalog, &config.reliability)?;
            let max_id = catalog.iter().map(|r| r.id).max().unwrap_or(0) as usize;
            let mut reliable = vec![false; max_id + 1];
            for &id in &reliability.reliable_ids {
                reliable[id as usize] = true;
            }
            diagnostics.reliability = Some(reliability.diagnostics);
            catalog = reliability.catalog;
            catalog.retain_and_renumber(|r| reliable[r.id as usize])
        } else {
            catalog.retain_and_renumber(SourceRecord::is_positive)
        };
        relabel_mask(&mut labels, &remap);
        tracing::info!(
            kept = catalog.len(),
            dropped = diagnostics.linked_sources - catalog.len(),
            "Catalog filtered and renumbered"
        );

        Ok(finish(catalog, labels, Stage::Done, diagnostics))
    }
}
