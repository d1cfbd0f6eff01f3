//! Numerical building blocks: robust statistics, bounding boxes and
//! Levenberg-Marquardt least squares.

mod bbox;
pub(crate) mod linear_solver;
pub(crate) mod lm;
pub(crate) mod statistics;

pub use bbox::Aabb3;

/// FWHM of a Gaussian in units of its sigma, as used for kernel sizes.
pub const FWHM_TO_SIGMA_DIVISOR: f32 = 2.355;

/// Convert a Gaussian FWHM to sigma.
#[inline]
pub fn fwhm_to_sigma(fwhm: f32) -> f32 {
    fwhm / FWHM_TO_SIGMA_DIVISOR
}
