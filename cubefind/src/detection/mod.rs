//! Multi-scale smooth-and-clip source detection.
//!
//! The cube is smoothed with every kernel of [`DetectionConfig::kernels`] and
//! thresholded at `±threshold * rms` after each smoothing, where `rms` is
//! re-measured on the smoothed data. Detections from all scales are OR-ed
//! into one mask.
//!
//! Kernels are processed in groups of identical spatial size, smallest first.
//! Spatial smoothing is incremental: going from FWHM `k0` to `k1` convolves
//! the previous group's volume with FWHM `sqrt(k1² - k0²)`. Before every
//! smoothing bright voxels are clipped so that strong sources do not inflate
//! the noise measured at the next scale.

mod config;
mod kernel;
mod size_filter;
mod threshold;


use std::borrow::Cow;

use common::{BitBuffer3, Buffer3};

use crate::cube::{Axis, Cube, CubeHeader};
use crate::error::Result;
use crate::math::fwhm_to_sigma;
use crate::noise::{NoiseConfig, estimate_noise, estimate_noise_excluding};
use crate::smoothing::{gaussian_filter, gaussian_filter_axis, uniform_filter_axis};

pub use config::{DetectionConfig, Kernel, KernelUnit, SpectralShape, default_kernels};
pub use threshold::{ThresholdConfig, ThresholdMode, threshold_filter};

use kernel::{KernelGroup, SpectralKernel, group_kernels};
use size_filter::size_filter;
use threshold::clip_mask;

/// Per-kernel diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleStats {
    /// Kernel in pixel units.
    pub kernel: Kernel,
    /// Noise measured on the smoothed volume.
    pub rms: f32,
    /// Voxels above threshold at this scale, after size filtering.
    pub detected: usize,
}

/// Output of [`detect`].
#[derive(Debug, Clone)]
pub struct Detection {
    /// Voxels detected at any scale. NaN voxels are never set.
    pub mask: BitBuffer3,
    /// Noise of the unsmoothed cube.
    pub initial_rms: f32,
    pub scales: Vec<ScaleStats>,
}

impl Detection {
    pub fn detected_voxels(&self) -> usize {
        self.mask.count_ones()
    }
}

/// Run the multi-scale detector on `cube`.
///
/// The input is never modified; smoothing works on private copies.
pub fn detect(
    cube: &Cube,
    header: &CubeHeader,
    config: &DetectionConfig,
    noise: &NoiseConfig,
) -> Result<Detection> {
    let rms = estimate_noise(cube, noise)?;
    detect_with_rms(cube, header, config, noise, rms)
}

/// [`detect`] with the noise of the unsmoothed cube already known.
pub fn detect_with_rms(
    cube: &Cube,
    header: &CubeHeader,
    config: &DetectionConfig,
    noise: &NoiseConfig,
    initial_rms: f32,
) -> Result<Detection> {
    config.validate();

    let groups = group_kernels(&config.kernels, config.kernel_unit, header);
    let nan_mask = cube.nan_mask();
    let unsmoothed = cube.nan_to_zero();
    let beam = header.beam_pixels();

    let ctx = ScaleContext {
        config,
        noise,
        nan_mask: nan_mask.as_ref(),
        beam,
    };

    let mut state = SmoothingState::new(unsmoothed.clone(), initial_rms);
    let mut mask = BitBuffer3::new_default(cube.width(), cube.height(), cube.depth());
    let mut scales = Vec::with_capacity(config.kernels.len());

    for group in &groups {
        state.advance_spatial(group, &unsmoothed, initial_rms, &ctx)?;

        let mut group_mask = BitBuffer3::new_default(cube.width(), cube.height(), cube.depth());
        for &spectral in &group.spectral {
            let (volume, rms) = state.spectral_pass(spectral, &group_mask, &ctx)?;

            let mut scale_mask = clip_mask(&volume, config.threshold * rms);
            if config.size_filter > 0.0 {
                scale_mask = size_filter(
                    &scale_mask,
                    (group.x, group.y, spectral.size),
                    spectral.shape,
                    beam,
                    config.size_filter,
                    config.edge_mode,
                );
            }

            let detected = scale_mask.count_ones();
            let kernel = Kernel::new(group.x, group.y, spectral.size, spectral.shape);
            tracing::debug!(%kernel, rms, detected, "Scale thresholded");
            scales.push(ScaleStats {
                kernel,
                rms,
                detected,
            });
            group_mask.or_assign(&scale_mask);
        }
        mask.or_assign(&group_mask);
    }

    if let Some(nan_mask) = &nan_mask {
        for idx in nan_mask.iter_ones() {
            mask.set(idx, false);
        }
    }

    tracing::info!(
        kernels = scales.len(),
        detected = mask.count_ones(),
        initial_rms,
        "Multi-scale detection finished"
    );

    Ok(Detection {
        mask,
        initial_rms,
        scales,
    })
}

/// Read-only inputs shared by every scale.
struct ScaleContext<'a> {
    config: &'a DetectionConfig,
    noise: &'a NoiseConfig,
    nan_mask: Option<&'a BitBuffer3>,
    beam: (f32, f32),
}

impl ScaleContext<'_> {
    /// Measure the noise of a smoothed volume and zero its flagged voxels.
    fn finish_smoothed(&self, volume: &mut Buffer3<f32>) -> Result<f32> {
        let rms = estimate_noise_excluding(volume, self.nan_mask, self.noise)?;
        if let Some(nan_mask) = self.nan_mask {
            for idx in nan_mask.iter_ones() {
                volume[idx] = 0.0;
            }
        }
        Ok(rms)
    }
}

/// State carried from one kernel group to the next.
struct SmoothingState {
    /// Spatial FWHM `(x, y)` already applied to `working_volume`.
    current_fwhm_xy: (f32, f32),
    /// Volume smoothed to `current_fwhm_xy`, flagged voxels zeroed.
    working_volume: Buffer3<f32>,
    rms_xy: f32,
    /// Noise of the last spectrally smoothed volume in the current group.
    rms_z: Option<f32>,
}

impl SmoothingState {
    fn new(unsmoothed: Buffer3<f32>, rms: f32) -> Self {
        Self {
            current_fwhm_xy: (0.0, 0.0),
            working_volume: unsmoothed,
            rms_xy: rms,
            rms_z: None,
        }
    }

    /// Bring the working volume to the spatial scale of `group`.
    fn advance_spatial(
        &mut self,
        group: &KernelGroup,
        unsmoothed: &Buffer3<f32>,
        initial_rms: f32,
        ctx: &ScaleContext<'_>,
    ) -> Result<()> {
        self.rms_z = None;

        if group.is_unsmoothed() {
            if self.current_fwhm_xy != (0.0, 0.0) {
                self.working_volume.copy_from(unsmoothed);
            }
            self.current_fwhm_xy = (0.0, 0.0);
            self.rms_xy = initial_rms;
            return Ok(());
        }

        let (old_x, old_y) = self.current_fwhm_xy;
        let sigmas = [
            fwhm_to_sigma(incremental_fwhm(group.x, old_x)),
            fwhm_to_sigma(incremental_fwhm(group.y, old_y)),
            0.0,
        ];

        let clip = ctx.config.mask_scale_xy * ctx.config.threshold * self.rms_xy;
        let clipped = self.working_volume.map(|&v| v.clamp(-clip, clip));
        let mut smoothed = gaussian_filter(&clipped, sigmas, ctx.config.edge_mode);
        self.rms_xy = ctx.finish_smoothed(&mut smoothed)?;
        self.working_volume = smoothed;
        self.current_fwhm_xy = (group.x.max(old_x), group.y.max(old_y));

        tracing::debug!(
            fwhm_x = group.x,
            fwhm_y = group.y,
            rms = self.rms_xy,
            "Spatial smoothing applied"
        );
        Ok(())
    }

    /// Volume and noise for one spectral member of the current group.
    ///
    /// Every spectral pass starts from the group's spatially smoothed
    /// volume. Voxels already in `group_mask` are clipped to
    /// `±mask_scale_z * threshold * rms` first.
    fn spectral_pass(
        &mut self,
        spectral: SpectralKernel,
        group_mask: &BitBuffer3,
        ctx: &ScaleContext<'_>,
    ) -> Result<(Cow<'_, Buffer3<f32>>, f32)> {
        let kz = spectral.size;
        if kz <= 0.0 {
            self.rms_z = Some(self.rms_xy);
            return Ok((Cow::Borrowed(&self.working_volume), self.rms_xy));
        }

        let clip_rms = self.rms_z.unwrap_or(self.rms_xy / kz.sqrt());
        let clip = ctx.config.mask_scale_z * ctx.config.threshold * clip_rms;
        let mut masked = self.working_volume.clone();
        for idx in group_mask.iter_ones() {
            masked[idx] = masked[idx].clamp(-clip, clip);
        }

        let mut smoothed = match spectral.shape {
            SpectralShape::Boxcar => {
                uniform_filter_axis(&masked, Axis::Z, kz.round() as usize, ctx.config.edge_mode)
            }
            SpectralShape::Gaussian => {
                gaussian_filter_axis(&masked, Axis::Z, fwhm_to_sigma(kz), ctx.config.edge_mode)
            }
        };
        let rms = ctx.finish_smoothed(&mut smoothed)?;
        self.rms_z = Some(rms);
        Ok((Cow::Owned(smoothed), rms))
    }
}

/// FWHM that takes a Gaussian of FWHM `from` to FWHM `to`.
fn incremental_fwhm(to: f32, from: f32) -> f32 {
    if to < from {
        tracing::warn!(
            from,
            to,
            "Spatial kernels are not monotonic along one axis; keeping the larger scale"
        );
        return 0.0;
    }
    (to * to - from * from).sqrt()
}
