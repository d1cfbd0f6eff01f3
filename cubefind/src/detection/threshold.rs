//! Plain clip thresholding of the unsmoothed cube.

use common::{BitBuffer3, Buffer3};
use serde::{Deserialize, Serialize};

/// How [`ThresholdConfig::threshold`] is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    /// Multiple of the measured noise.
    #[default]
    Relative,
    /// Flux value in data units.
    Absolute,
}

impl ThresholdMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ThresholdMode::Relative => "relative",
            ThresholdMode::Absolute => "absolute",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub mode: ThresholdMode,
    pub threshold: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            mode: ThresholdMode::Relative,
            threshold: 4.0,
        }
    }
}

impl ThresholdConfig {
    pub fn validate(&self) {
        assert!(
            self.threshold > 0.0 && self.threshold.is_finite(),
            "threshold must be positive, got {}",
            self.threshold
        );
    }

    /// Absolute clip level for a cube with noise `rms`.
    pub fn clip(&self, rms: f32) -> f32 {
        match self.mode {
            ThresholdMode::Relative => self.threshold * rms,
            ThresholdMode::Absolute => self.threshold,
        }
    }

    pub(crate) fn provenance_entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("mode", self.mode.as_str().to_string()),
            ("threshold", self.threshold.to_string()),
        ]
    }
}

/// Mask of voxels with `|v| >= clip`. NaN voxels are never set.
pub(crate) fn clip_mask(volume: &Buffer3<f32>, clip: f32) -> BitBuffer3 {
    let mut mask = BitBuffer3::new_default(volume.width(), volume.height(), volume.depth());
    for (idx, &v) in volume.iter().enumerate() {
        if v >= clip || v <= -clip {
            mask.set(idx, true);
        }
    }
    mask
}

/// Threshold the cube directly at `±clip`, where the clip level is
/// relative to `rms` or absolute depending on the mode.
pub fn threshold_filter(cube: &Buffer3<f32>, config: &ThresholdConfig, rms: f32) -> BitBuffer3 {
    config.validate();
    let clip = config.clip(rms);
    let mask = clip_mask(cube, clip);
    tracing::debug!(
        mode = config.mode.as_str(),
        clip,
        detected = mask.count_ones(),
        "Threshold filter applied"
    );
    mask
}
