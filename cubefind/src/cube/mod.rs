//! Spectral-line data cube and its header metadata.
//!
//! A [`Cube`] wraps a [`Buffer3<f32>`] indexed `(x, y, z)` with the spectral
//! axis slowest. NaN voxels mark flagged or blank data and are excluded from
//! every statistic and from detection.

mod header;


use std::ops::{Deref, DerefMut, Range};

use common::{BitBuffer3, Buffer3};

use crate::error::{Error, Result};

pub use header::{AxisMeta, CubeHeader};

/// Cube axis. `X` and `Y` are spatial, `Z` is spectral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Volume of flux values.
#[derive(Debug, Clone, PartialEq)]
pub struct Cube {
    voxels: Buffer3<f32>,
}

impl Cube {
    pub fn new(width: usize, height: usize, depth: usize, voxels: Vec<f32>) -> Self {
        Self {
            voxels: Buffer3::new(width, height, depth, voxels),
        }
    }

    pub fn from_buffer(voxels: Buffer3<f32>) -> Self {
        Self { voxels }
    }

    /// Build a cube from a loader's shape, outermost axis first.
    ///
    /// * 3 axes `[depth, height, width]` are used as is.
    /// * 4 axes are accepted only when the outermost (Stokes) axis has length 1.
    /// * 2 axes `[height, width]` become a single-channel cube.
    /// * Anything else is [`Error::UnsupportedDimensionality`].
    pub fn from_shape(shape: &[usize], voxels: Vec<f32>) -> Result<Self> {
        let unsupported = || Error::UnsupportedDimensionality {
            naxis: shape.len(),
            shape: shape.to_vec(),
        };

        let [depth, height, width] = match *shape {
            [depth, height, width] => [depth, height, width],
            [1, depth, height, width] => [depth, height, width],
            [height, width] => [1, height, width],
            _ => return Err(unsupported()),
        };

        if voxels.len() != width * height * depth {
            return Err(Error::ShapeMismatch {
                what: "cube data",
                expected: vec![width * height * depth],
                actual: vec![voxels.len()],
            });
        }

        if shape.len() != 3 {
            tracing::debug!(?shape, width, height, depth, "Reshaped input to 3 axes");
        }

        Ok(Self::new(width, height, depth, voxels))
    }

    /// `[depth, height, width]`.
    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        [self.depth(), self.height(), self.width()]
    }

    #[inline]
    pub fn buffer(&self) -> &Buffer3<f32> {
        &self.voxels
    }

    #[inline]
    pub fn buffer_mut(&mut self) -> &mut Buffer3<f32> {
        &mut self.voxels
    }

    #[inline]
    pub fn into_buffer(self) -> Buffer3<f32> {
        self.voxels
    }

    pub fn nan_count(&self) -> usize {
        self.voxels.iter().filter(|v| v.is_nan()).count()
    }

    /// Bit mask of NaN voxels, or `None` if the cube has none.
    pub fn nan_mask(&self) -> Option<BitBuffer3> {
        if !self.voxels.iter().any(|v| v.is_nan()) {
            return None;
        }
        let mut mask = BitBuffer3::new_default(self.width(), self.height(), self.depth());
        for (idx, v) in self.voxels.iter().enumerate() {
            if v.is_nan() {
                mask.set(idx, true);
            }
        }
        Some(mask)
    }

    /// Copy with every NaN replaced by zero.
    pub fn nan_to_zero(&self) -> Buffer3<f32> {
        self.voxels.map(|&v| if v.is_nan() { 0.0 } else { v })
    }

    /// Smallest non-NaN value.
    pub fn finite_min(&self) -> Option<f32> {
        self.voxels
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .reduce(f32::min)
    }
}

impl Deref for Cube {
    type Target = Buffer3<f32>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.voxels
    }
}

impl DerefMut for Cube {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.voxels
    }
}

impl From<Buffer3<f32>> for Cube {
    fn from(voxels: Buffer3<f32>) -> Self {
        Self { voxels }
    }
}

/// Axis-aligned sub-volume, half-open on every axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub x: Range<usize>,
    pub y: Range<usize>,
    pub z: Range<usize>,
}

impl Region {
    pub fn full(width: usize, height: usize, depth: usize) -> Self {
        Self {
            x: 0..width,
            y: 0..height,
            z: 0..depth,
        }
    }

    /// Central window covering `1 / zoom` of each axis.
    ///
    /// `zoom` is `[x, y, z]`; a factor of 1 keeps the full axis. Factors
    /// below 1 are treated as 1.
    pub fn central(width: usize, height: usize, depth: usize, zoom: [f64; 3]) -> Self {
        Self {
            x: zoom_range(width, zoom[0]),
            y: zoom_range(height, zoom[1]),
            z: zoom_range(depth, zoom[2]),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.x.len() * self.y.len() * self.z.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Linear indices of every voxel inside the region, in raster order.
    pub fn indices<'a, T>(&'a self, buf: &'a Buffer3<T>) -> impl Iterator<Item = usize> + 'a {
        self.z.clone().flat_map(move |z| {
            self.y.clone().flat_map(move |y| {
                let row = buf.index(0, y, z);
                self.x.clone().map(move |x| row + x)
            })
        })
    }
}

fn zoom_range(n: usize, zoom: f64) -> Range<usize> {
    let zoom = zoom.max(1.0);
    let half = n as f64 / 2.0;
    let start = ((1.0 - 1.0 / zoom) * half).ceil() as usize;
    let end = ((1.0 + 1.0 / zoom) * half).floor() as usize + 1;
    start.min(n)..end.min(n)
}
