use serde::{Deserialize, Serialize};

use super::Axis;

const PIXEL_UNIT: &str = "pix";
const NO_UNIT: &str = "-";

/// Per-axis world-coordinate metadata as delivered by the cube loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisMeta {
    /// Increment per pixel (`CDELTn`): degrees on spatial axes, m/s on the
    /// spectral axis.
    pub cdelt: Option<f64>,
    /// Axis unit (`CUNITn`).
    pub cunit: Option<String>,
    /// Axis type (`CTYPEn`).
    pub ctype: Option<String>,
}

/// Header metadata the detector needs. Every field is optional; missing
/// fields fall back to pixel units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CubeHeader {
    /// Axis metadata in `[x, y, z]` order.
    pub axes: [AxisMeta; 3],
    /// Beam major axis FWHM in degrees, assumed along y.
    pub bmaj: Option<f64>,
    /// Beam minor axis FWHM in degrees, assumed along x.
    pub bmin: Option<f64>,
    /// Flux unit of the voxel values (`BUNIT`).
    pub bunit: Option<String>,
}

impl CubeHeader {
    pub fn with_increments(cdelt1: f64, cdelt2: f64, cdelt3: f64) -> Self {
        let axis = |cdelt| AxisMeta {
            cdelt: Some(cdelt),
            ..AxisMeta::default()
        };
        Self {
            axes: [axis(cdelt1), axis(cdelt2), axis(cdelt3)],
            ..Self::default()
        }
    }

    pub fn with_beam(mut self, bmaj: f64, bmin: f64) -> Self {
        self.bmaj = Some(bmaj);
        self.bmin = Some(bmin);
        self
    }

    /// Usable increment along `axis`, if the header has a non-zero one.
    pub fn increment(&self, axis: Axis) -> Option<f64> {
        self.axes[axis.index()].cdelt.filter(|c| *c != 0.0 && c.is_finite())
    }

    pub fn unit(&self, axis: Axis) -> &str {
        self.axes[axis.index()].cunit.as_deref().unwrap_or(PIXEL_UNIT)
    }

    pub fn data_unit(&self) -> &str {
        self.bunit.as_deref().unwrap_or(NO_UNIT)
    }

    /// Beam FWHM in pixels as `(x, y)`.
    ///
    /// The major axis is taken along y and the minor along x. A missing
    /// minor axis falls back to the major; a missing major axis gives 0.
    pub fn beam_pixels(&self) -> (f32, f32) {
        let along = |size: Option<f64>, axis| match (size, self.increment(axis)) {
            (Some(size), Some(cdelt)) => Some((size / cdelt.abs()) as f32),
            _ => None,
        };
        let major = along(self.bmaj, Axis::Y).unwrap_or(0.0);
        let minor = along(self.bmin, Axis::X).unwrap_or(major);
        (minor, major)
    }

    /// Convert a spatial kernel size in arcseconds to pixels along `axis`.
    ///
    /// Without an increment the size is already taken as pixels.
    pub fn arcsec_to_pixels(&self, size: f32, axis: Axis) -> f32 {
        debug_assert!(axis != Axis::Z);
        match self.increment(axis) {
            Some(cdelt) => (size as f64 / cdelt / 3600.0).abs() as f32,
            None => {
                tracing::warn!(?axis, size, "No spatial increment in header; kernel size kept in pixels");
                size
            }
        }
    }

    /// Convert a spectral kernel size in km/s to channels.
    pub fn kms_to_channels(&self, size: f32) -> f32 {
        match self.increment(Axis::Z) {
            Some(cdelt) => (size as f64 / cdelt * 1000.0).abs() as f32,
            None => {
                tracing::warn!(size, "No spectral increment in header; kernel size kept in channels");
                size
            }
        }
    }
}
