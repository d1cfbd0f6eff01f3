//! Flagging of rectangular regions to NaN.

use std::fmt;
use std::ops::Range;

use common::Buffer3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Half-open index range along one axis. An open end runs to the end of
/// the axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisRange {
    pub start: usize,
    pub end: Option<usize>,
}

impl AxisRange {
    pub const ALL: AxisRange = AxisRange {
        start: 0,
        end: None,
    };

    pub const fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub const fn open(start: usize) -> Self {
        Self { start, end: None }
    }

    fn resolve(&self, len: usize) -> std::result::Result<Range<usize>, String> {
        let end = self.end.unwrap_or(len);
        if end > len {
            return Err(format!("end {} beyond axis length {}", end, len));
        }
        if self.start >= end {
            return Err(format!("empty range {}..{}", self.start, end));
        }
        Ok(self.start..end)
    }
}

impl fmt::Display for AxisRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}:{}", self.start, end),
            None => write!(f, "{}:", self.start),
        }
    }
}

/// Box of voxels to blank. Without a channel range every channel is flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagRegion {
    pub x: AxisRange,
    pub y: AxisRange,
    #[serde(default)]
    pub z: Option<AxisRange>,
}

impl FlagRegion {
    /// Spatial region covering every channel.
    pub const fn spatial(x: AxisRange, y: AxisRange) -> Self {
        Self { x, y, z: None }
    }

    pub const fn new(x: AxisRange, y: AxisRange, z: AxisRange) -> Self {
        Self { x, y, z: Some(z) }
    }

    /// Region from a flat bound list `[x0, x1, y0, y1]` or
    /// `[x0, x1, y0, y1, z0, z1]`; a `None` upper bound is open-ended.
    pub fn from_bounds(bounds: &[Option<usize>]) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidFlagRegion {
            region: format!("{:?}", bounds),
            reason: reason.to_string(),
        };
        if bounds.len() != 4 && bounds.len() != 6 {
            return Err(invalid("expected 4 or 6 bounds"));
        }
        let ranges: Vec<AxisRange> = bounds
            .chunks_exact(2)
            .map(|pair| {
                pair[0]
                    .map(|start| AxisRange { start, end: pair[1] })
                    .ok_or_else(|| invalid("lower bounds are required"))
            })
            .collect::<Result<_>>()?;
        Ok(Self {
            x: ranges[0],
            y: ranges[1],
            z: ranges.get(2).copied(),
        })
    }

    /// Concrete ranges `[x, y, z]` within a cube of the given size.
    pub fn resolve(&self, width: usize, height: usize, depth: usize) -> Result<[Range<usize>; 3]> {
        let z = self.z.unwrap_or(AxisRange::ALL);
        let wrap = |axis: &str, reason: String| Error::InvalidFlagRegion {
            region: self.to_string(),
            reason: format!("{}: {}", axis, reason),
        };
        Ok([
            self.x.resolve(width).map_err(|r| wrap("x", r))?,
            self.y.resolve(height).map_err(|r| wrap("y", r))?,
            z.resolve(depth).map_err(|r| wrap("z", r))?,
        ])
    }
}

impl fmt::Display for FlagRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}", self.x, self.y)?;
        if let Some(z) = &self.z {
            write!(f, ", {}", z)?;
        }
        f.write_str("]")
    }
}

/// Set every voxel inside `regions` to NaN.
///
/// All regions are checked before any voxel is touched, so an invalid
/// region leaves the cube unchanged. Returns the number of voxels flagged.
pub fn flag_regions(cube: &mut Buffer3<f32>, regions: &[FlagRegion]) -> Result<usize> {
    let (width, height, depth) = (cube.width(), cube.height(), cube.depth());
    let resolved: Vec<[Range<usize>; 3]> = regions
        .iter()
        .map(|r| r.resolve(width, height, depth))
        .collect::<Result<_>>()?;
    if resolved.is_empty() {
        return Ok(0);
    }

    let plane_len = cube.plane_len();
    let flagged: usize = cube
        .voxels_mut()
        .par_chunks_mut(plane_len)
        .enumerate()
        .map(|(z, plane)| {
            let mut count = 0;
            for [xs, ys, zs] in &resolved {
                if !zs.contains(&z) {
                    continue;
                }
                for y in ys.clone() {
                    for v in &mut plane[y * width + xs.start..y * width + xs.end] {
                        if !v.is_nan() {
                            *v = f32::NAN;
                            count += 1;
                        }
                    }
                }
            }
            count
        })
        .sum();

    tracing::info!(regions = regions.len(), voxels = flagged, "Cube flagged");
    Ok(flagged)
}
