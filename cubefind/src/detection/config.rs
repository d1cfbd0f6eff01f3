//! Configuration types for multi-scale detection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::smoothing::EdgeMode;

// ============================================================================
// Enums
// ============================================================================

/// Profile of the spectral smoothing kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum SpectralShape {
    /// Running mean over `z` channels.
    #[default]
    #[serde(rename = "b")]
    Boxcar,
    /// Gaussian with FWHM `z` channels.
    #[serde(rename = "g")]
    Gaussian,
}

impl SpectralShape {
    pub fn as_char(self) -> char {
        match self {
            SpectralShape::Boxcar => 'b',
            SpectralShape::Gaussian => 'g',
        }
    }
}

impl fmt::Display for SpectralShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for SpectralShape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "b" | "B" => Ok(SpectralShape::Boxcar),
            "g" | "G" => Ok(SpectralShape::Gaussian),
            other => Err(Error::UnsupportedKernelShape(other.to_string())),
        }
    }
}

impl TryFrom<String> for SpectralShape {
    type Error = Error;

    fn try_from(code: String) -> Result<Self, Self::Error> {
        code.parse()
    }
}

/// Unit in which kernel sizes are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelUnit {
    /// Pixels spatially, channels spectrally.
    #[default]
    Pixel,
    /// Arcseconds spatially, km/s spectrally.
    World,
}

impl KernelUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            KernelUnit::Pixel => "pixel",
            KernelUnit::World => "world",
        }
    }
}

// ============================================================================
// Kernel
// ============================================================================

/// One smoothing scale: spatial FWHMs along x and y, spectral size, shape.
///
/// A size of 0 disables smoothing along that axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kernel {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub shape: SpectralShape,
}

impl Kernel {
    pub const fn new(x: f32, y: f32, z: f32, shape: SpectralShape) -> Self {
        Self { x, y, z, shape }
    }

    pub const fn boxcar(xy: f32, z: f32) -> Self {
        Self::new(xy, xy, z, SpectralShape::Boxcar)
    }

    /// Parse the shape from its one-letter code.
    pub fn with_shape_code(x: f32, y: f32, z: f32, code: &str) -> Result<Self, Error> {
        Ok(Self::new(x, y, z, code.parse()?))
    }

    pub fn validate(&self) {
        for (name, v) in [("x", self.x), ("y", self.y), ("z", self.z)] {
            assert!(
                v >= 0.0 && v.is_finite(),
                "kernel size along {} must be finite and >= 0, got {}",
                name,
                v
            );
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.z, self.shape)
    }
}

/// Default kernel set: spatial 0/3/6 crossed with spectral 0/3/7/15 boxcars.
pub fn default_kernels() -> Vec<Kernel> {
    let mut kernels = Vec::with_capacity(12);
    for xy in [0.0, 3.0, 6.0] {
        for z in [0.0, 3.0, 7.0, 15.0] {
            kernels.push(Kernel::boxcar(xy, z));
        }
    }
    kernels
}

// ============================================================================
// DetectionConfig
// ============================================================================

/// Multi-scale smooth-and-clip detection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Smoothing scales, in any order.
    pub kernels: Vec<Kernel>,
    /// Detection threshold in units of the noise at each scale.
    pub threshold: f32,
    /// Size-filter threshold on the smoothed detection mask; 0 disables it.
    pub size_filter: f32,
    /// Before spatial smoothing, values are clipped to
    /// `±mask_scale_xy * threshold * rms`.
    pub mask_scale_xy: f32,
    /// Before spectral smoothing, voxels already detected at the current
    /// spatial scale are clipped to `±mask_scale_z * threshold * rms`.
    pub mask_scale_z: f32,
    pub kernel_unit: KernelUnit,
    pub edge_mode: EdgeMode,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            kernels: default_kernels(),
            threshold: 4.0,
            size_filter: 0.0,
            mask_scale_xy: 2.0,
            mask_scale_z: 2.0,
            kernel_unit: KernelUnit::Pixel,
            edge_mode: EdgeMode::Constant,
        }
    }
}

impl DetectionConfig {
    /// Single unsmoothed scale.
    pub fn single_scale(threshold: f32) -> Self {
        Self {
            kernels: vec![Kernel::boxcar(0.0, 0.0)],
            threshold,
            ..Self::default()
        }
    }

    pub fn validate(&self) {
        assert!(!self.kernels.is_empty(), "at least one kernel is required");
        for kernel in &self.kernels {
            kernel.validate();
        }
        assert!(
            self.threshold > 0.0,
            "threshold must be positive, got {}",
            self.threshold
        );
        assert!(
            self.size_filter >= 0.0,
            "size_filter must be non-negative, got {}",
            self.size_filter
        );
        assert!(
            self.mask_scale_xy > 0.0,
            "mask_scale_xy must be positive, got {}",
            self.mask_scale_xy
        );
        assert!(
            self.mask_scale_z > 0.0,
            "mask_scale_z must be positive, got {}",
            self.mask_scale_z
        );
    }

    pub(crate) fn provenance_entries(&self) -> Vec<(&'static str, String)> {
        let kernels = self
            .kernels
            .iter()
            .map(|k| format!("[{}]", k))
            .collect::<Vec<_>>()
            .join(",");
        vec![
            ("kernels", kernels),
            ("threshold", self.threshold.to_string()),
            ("size_filter", self.size_filter.to_string()),
            ("mask_scale_xy", self.mask_scale_xy.to_string()),
            ("mask_scale_z", self.mask_scale_z.to_string()),
            ("kernel_unit", self.kernel_unit.as_str().to_string()),
            ("edge_mode", self.edge_mode.as_str().to_string()),
        ]
    }
}
