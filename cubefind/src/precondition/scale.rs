//! Normalisation of the cube by its local noise level.
//!
//! The noise is measured and divided out per channel, then per row, then per
//! column, each pass working on the output of the previous one. Edge trims
//! exclude the outer voxels of the other two axes from each measurement.

use common::Buffer3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::math::statistics::{mad_sigma_f32_mut, mean_and_std};

/// Statistic measuring the noise of one slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleStatistic {
    #[default]
    Mad,
    Std,
}

impl ScaleStatistic {
    pub fn as_str(self) -> &'static str {
        match self {
            ScaleStatistic::Mad => "mad",
            ScaleStatistic::Std => "std",
        }
    }

    /// Noise of `values`, or `None` if there are none. NaNs must already
    /// be removed.
    fn measure(self, values: &mut [f32]) -> Option<f64> {
        match self {
            ScaleStatistic::Mad => mad_sigma_f32_mut(values),
            ScaleStatistic::Std => mean_and_std(values.iter().copied()).map(|(_, std)| std),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseScaleConfig {
    pub statistic: ScaleStatistic,
    /// Voxels trimmed from both ends of each axis `[x, y, z]` when measuring.
    pub edge: [usize; 3],
}

impl Default for NoiseScaleConfig {
    fn default() -> Self {
        Self {
            statistic: ScaleStatistic::Mad,
            edge: [0, 0, 0],
        }
    }
}

impl NoiseScaleConfig {
    pub(crate) fn provenance_entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("scale_statistic", self.statistic.as_str().to_string()),
            (
                "scale_edge",
                format!("{},{},{}", self.edge[0], self.edge[1], self.edge[2]),
            ),
        ]
    }
}

/// Noise measured along each axis, in the order the passes ran.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoiseProfile {
    /// One entry per channel.
    pub channel: Vec<f64>,
    /// One entry per row, measured after channel scaling.
    pub row: Vec<f64>,
    /// One entry per column, measured after row scaling.
    pub column: Vec<f64>,
}

/// Divide `cube` by its noise per channel, row and column.
///
/// Slices whose noise is zero or cannot be measured are left untouched and
/// report 0.
pub fn scale_noise(cube: &mut Buffer3<f32>, config: &NoiseScaleConfig) -> NoiseProfile {
    let (width, height, depth) = (cube.width(), cube.height(), cube.depth());
    let xs = trimmed(width, config.edge[0]);
    let ys = trimmed(height, config.edge[1]);
    let zs = trimmed(depth, config.edge[2]);
    let stat = config.statistic;
    let plane_len = cube.plane_len();

    // Channels
    let channel: Vec<f64> = cube
        .voxels_mut()
        .par_chunks_mut(plane_len)
        .map(|plane| {
            let mut values: Vec<f32> = ys
                .clone()
                .flat_map(|y| plane[y * width + xs.start..y * width + xs.end].iter().copied())
                .filter(|v| !v.is_nan())
                .collect();
            let rms = stat.measure(&mut values).unwrap_or(0.0);
            divide(plane, rms);
            rms
        })
        .collect();

    // Rows
    let row: Vec<f64> = {
        let cube = &*cube;
        (0..height)
            .into_par_iter()
            .map(|y| {
                let mut values: Vec<f32> = zs
                    .clone()
                    .flat_map(|z| {
                        let start = cube.index(xs.start, y, z);
                        cube[start..start + xs.len()].iter().copied()
                    })
                    .filter(|v| !v.is_nan())
                    .collect();
                stat.measure(&mut values).unwrap_or(0.0)
            })
            .collect()
    };
    cube.voxels_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(line, values)| divide(values, row[line % height]));

    // Columns
    let column: Vec<f64> = {
        let cube = &*cube;
        (0..width)
            .into_par_iter()
            .map(|x| {
                let mut values: Vec<f32> = zs
                    .clone()
                    .flat_map(|z| ys.clone().map(move |y| (y, z)))
                    .map(|(y, z)| *cube.get(x, y, z))
                    .filter(|v| !v.is_nan())
                    .collect();
                stat.measure(&mut values).unwrap_or(0.0)
            })
            .collect()
    };
    cube.voxels_mut().par_chunks_mut(width).for_each(|line| {
        for (v, &rms) in line.iter_mut().zip(&column) {
            if rms > 0.0 {
                *v = (*v as f64 / rms) as f32;
            }
        }
    });

    tracing::info!(
        statistic = stat.as_str(),
        channels = depth,
        rows = height,
        columns = width,
        "Noise scaling applied"
    );
    NoiseProfile {
        channel,
        row,
        column,
    }
}

/// Index range left after trimming `edge` from both ends, never empty for
/// a non-empty axis.
fn trimmed(len: usize, edge: usize) -> std::ops::Range<usize> {
    if 2 * edge >= len {
        tracing::warn!(len, edge, "Noise scaling edge trims whole axis; ignoring it");
        return 0..len;
    }
    edge..len - edge
}

#[inline]
fn divide(values: &mut [f32], rms: f64) {
    if rms > 0.0 {
        for v in values {
            *v = (*v as f64 / rms) as f32;
        }
    }
}
