//! Axis-aligned bounding box for voxel regions.

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box with inclusive `usize` voxel bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Aabb3 {
    pub x_min: usize,
    pub x_max: usize,
    pub y_min: usize,
    pub y_max: usize,
    pub z_min: usize,
    pub z_max: usize,
}

impl Default for Aabb3 {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb3 {
    #[inline]
    pub const fn new(
        x_min: usize,
        x_max: usize,
        y_min: usize,
        y_max: usize,
        z_min: usize,
        z_max: usize,
    ) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
            z_min,
            z_max,
        }
    }

    /// Inverted box that any `include()` call overwrites.
    #[inline]
    pub const fn empty() -> Self {
        Self {
            x_min: usize::MAX,
            x_max: 0,
            y_min: usize::MAX,
            y_max: 0,
            z_min: usize::MAX,
            z_max: 0,
        }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.x_min > self.x_max || self.y_min > self.y_max || self.z_min > self.z_max
    }

    #[inline]
    pub fn include(&mut self, x: usize, y: usize, z: usize) {
        self.x_min = self.x_min.min(x);
        self.x_max = self.x_max.max(x);
        self.y_min = self.y_min.min(y);
        self.y_max = self.y_max.max(y);
        self.z_min = self.z_min.min(z);
        self.z_max = self.z_max.max(z);
    }

    /// Smallest box containing both.
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            x_min: self.x_min.min(other.x_min),
            x_max: self.x_max.max(other.x_max),
            y_min: self.y_min.min(other.y_min),
            y_max: self.y_max.max(other.y_max),
            z_min: self.z_min.min(other.z_min),
            z_max: self.z_max.max(other.z_max),
        }
    }

    /// Number of columns covered.
    #[inline]
    pub const fn width(&self) -> usize {
        self.x_max.saturating_sub(self.x_min) + 1
    }

    /// Number of rows covered.
    #[inline]
    pub const fn height(&self) -> usize {
        self.y_max.saturating_sub(self.y_min) + 1
    }

    /// Number of channels covered.
    #[inline]
    pub const fn depth(&self) -> usize {
        self.z_max.saturating_sub(self.z_min) + 1
    }

    #[inline]
    pub const fn contains(&self, x: usize, y: usize, z: usize) -> bool {
        x >= self.x_min
            && x <= self.x_max
            && y >= self.y_min
            && y <= self.y_max
            && z >= self.z_min
            && z <= self.z_max
    }

    /// Empty voxels between the two boxes along each axis as `[x, y, z]`.
    ///
    /// Overlapping or touching boxes have a gap of 0 on that axis.
    #[inline]
    pub fn gap(&self, other: &Self) -> [usize; 3] {
        [
            axis_gap(self.x_min, self.x_max, other.x_min, other.x_max),
            axis_gap(self.y_min, self.y_max, other.y_min, other.y_max),
            axis_gap(self.z_min, self.z_max, other.z_min, other.z_max),
        ]
    }

    /// Box midpoint as `[x, y, z]`.
    #[inline]
    pub fn center(&self) -> [f64; 3] {
        [
            (self.x_min + self.x_max) as f64 * 0.5,
            (self.y_min + self.y_max) as f64 * 0.5,
            (self.z_min + self.z_max) as f64 * 0.5,
        ]
    }

    /// Whether a continuous position lies within the box bounds.
    #[inline]
    pub fn contains_point(&self, p: [f64; 3]) -> bool {
        p[0] >= self.x_min as f64
            && p[0] <= self.x_max as f64
            && p[1] >= self.y_min as f64
            && p[1] <= self.y_max as f64
            && p[2] >= self.z_min as f64
            && p[2] <= self.z_max as f64
    }
}

#[inline]
fn axis_gap(a_min: usize, a_max: usize, b_min: usize, b_max: usize) -> usize {
    if b_min > a_max {
        b_min - a_max - 1
    } else if a_min > b_max {
        a_min - b_max - 1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_then_include() {
        let mut bbox = Aabb3::empty();
        assert!(bbox.is_empty());

        bbox.include(4, 2, 7);
        assert!(!bbox.is_empty());
        assert_eq!(bbox, Aabb3::new(4, 4, 2, 2, 7, 7));

        bbox.include(1, 5, 9);
        assert_eq!(bbox, Aabb3::new(1, 4, 2, 5, 7, 9));
        assert_eq!(bbox.width(), 4);
        assert_eq!(bbox.height(), 4);
        assert_eq!(bbox.depth(), 3);
    }

    #[test]
    fn test_gap_per_axis() {
        let a = Aabb3::new(0, 4, 0, 4, 0, 4);
        // touching on x, 2 empty rows on y, overlapping on z
        let b = Aabb3::new(5, 6, 7, 8, 2, 3);
        assert_eq!(a.gap(&b), [0, 2, 0]);
        assert_eq!(b.gap(&a), [0, 2, 0]);

        let far = Aabb3::new(10, 10, 0, 0, 20, 21);
        assert_eq!(a.gap(&far), [5, 0, 15]);
    }

    #[test]
    fn test_union_and_contains() {
        let a = Aabb3::new(0, 1, 0, 1, 0, 1);
        let b = Aabb3::new(5, 6, 2, 3, 1, 4);
        let u = a.union(&b);
        assert_eq!(u, Aabb3::new(0, 6, 0, 3, 0, 4));
        assert!(u.contains(3, 3, 3));
        assert!(!u.contains(7, 0, 0));
    }

    #[test]
    fn test_center_and_contains_point() {
        let bbox = Aabb3::new(2, 5, 0, 0, 10, 13);
        assert_eq!(bbox.center(), [3.5, 0.0, 11.5]);
        assert!(bbox.contains_point([2.0, 0.0, 13.0]));
        assert!(!bbox.contains_point([1.9, 0.0, 11.0]));
    }
}
