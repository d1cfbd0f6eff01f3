//! Linking of detected voxels into sources.
//!
//! 1. Label connected components of the detection mask.
//! 2. Merge components whose bounding boxes lie within the merge radii,
//!    repeatedly, until no pair qualifies.
//! 3. Drop sources smaller than the minimum extents.
//! 4. Measure the survivors on the flux cube and number them in discovery
//!    order.

mod labeling;
mod merge;


use common::{BitBuffer3, Buffer3};
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, SourceRecord};
use crate::error::{Error, Result};
use crate::math::Aabb3;

/// Voxel connectivity for connected component labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Face neighbours only.
    Six,
    /// Face and edge neighbours.
    Eighteen,
    /// Face, edge and corner neighbours.
    #[default]
    TwentySix,
}

impl Connectivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Connectivity::Six => "six",
            Connectivity::Eighteen => "eighteen",
            Connectivity::TwentySix => "twentysix",
        }
    }
}

/// Connectivity used unless configured otherwise.
pub const DEFAULT_CONNECTIVITY: Connectivity = Connectivity::TwentySix;

/// Linker parameters. Radii and sizes are in voxels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Maximum empty voxels between merged sources along x and y.
    pub merge_xy: usize,
    /// Maximum empty channels between merged sources.
    pub merge_z: usize,
    /// Minimum bounding-box extent along x and y.
    pub min_size_xy: usize,
    /// Minimum bounding-box extent along z.
    pub min_size_z: usize,
    pub connectivity: Connectivity,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            merge_xy: 3,
            merge_z: 5,
            min_size_xy: 3,
            min_size_z: 2,
            connectivity: DEFAULT_CONNECTIVITY,
        }
    }
}

impl LinkConfig {
    pub fn validate(&self) {
        assert!(self.min_size_xy >= 1, "min_size_xy must be at least 1");
        assert!(self.min_size_z >= 1, "min_size_z must be at least 1");
    }

    /// Merge radii as `[x, y, z]`.
    #[inline]
    pub fn merge_radius(&self) -> [usize; 3] {
        [self.merge_xy, self.merge_xy, self.merge_z]
    }

    fn accepts(&self, bbox: &Aabb3) -> bool {
        bbox.width() >= self.min_size_xy
            && bbox.height() >= self.min_size_xy
            && bbox.depth() >= self.min_size_z
    }

    pub(crate) fn provenance_entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("merge_xy", self.merge_xy.to_string()),
            ("merge_z", self.merge_z.to_string()),
            ("min_size_xy", self.min_size_xy.to_string()),
            ("min_size_z", self.min_size_z.to_string()),
            ("connectivity", self.connectivity.as_str().to_string()),
        ]
    }
}

/// Link the detection `mask` into sources measured on `cube`.
///
/// Returns the catalog and a label volume in which every voxel of source
/// `id` holds `id` and everything else 0. IDs run `1..=n` in order of each
/// source's first voxel in raster order.
pub fn link(cube: &Buffer3<f32>, mask: &BitBuffer3, config: &LinkConfig) -> Result<(Catalog, Buffer3<u32>)> {
    config.validate();
    let shape = |w: usize, h: usize, d: usize| vec![d, h, w];
    if mask.width() != cube.width() || mask.height() != cube.height() || mask.depth() != cube.depth() {
        return Err(Error::ShapeMismatch {
            what: "detection mask",
            expected: shape(cube.width(), cube.height(), cube.depth()),
            actual: shape(mask.width(), mask.height(), mask.depth()),
        });
    }

    let (mut labels, num_components) = labeling::label_components(mask, config.connectivity);

    // Component bounding boxes, indexed by label - 1.
    let mut boxes = vec![Aabb3::empty(); num_components];
    for (idx, &label) in labels.iter().enumerate() {
        if label != 0 {
            let (x, y, z) = labels.coords(idx);
            boxes[label as usize - 1].include(x, y, z);
        }
    }

    let groups = merge::merge_by_gap(&boxes, config.merge_radius());
    let num_groups = groups.iter().map(|&g| g + 1).max().unwrap_or(0);

    let mut group_boxes = vec![Aabb3::empty(); num_groups];
    for (component, &group) in groups.iter().enumerate() {
        group_boxes[group] = group_boxes[group].union(&boxes[component]);
    }

    // Label lookup: component label -> final source ID (0 = dropped).
    let mut group_ids = vec![0u32; num_groups];
    let mut next_id = 1u32;
    for (group, bbox) in group_boxes.iter().enumerate() {
        if config.accepts(bbox) {
            group_ids[group] = next_id;
            next_id += 1;
        }
    }
    let mut remap = vec![0u32; num_components + 1];
    for (component, &group) in groups.iter().enumerate() {
        remap[component + 1] = group_ids[group];
    }
    crate::catalog::relabel_mask(&mut labels, &remap);

    let num_sources = (next_id - 1) as usize;
    let records = measure_sources(cube, &labels, num_sources);

    tracing::info!(
        components = num_components,
        merged = num_groups,
        sources = num_sources,
        "Linking finished"
    );

    Ok((Catalog::from_records(records, "-"), labels))
}

/// Running sums for one source.
#[derive(Debug, Clone)]
struct Accumulator {
    bbox: Aabb3,
    n_voxels: usize,
    flux_min: f64,
    flux_max: f64,
    flux_total: f64,
    weight: f64,
    weighted_pos: [f64; 3],
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            bbox: Aabb3::empty(),
            n_voxels: 0,
            flux_min: f64::INFINITY,
            flux_max: f64::NEG_INFINITY,
            flux_total: 0.0,
            weight: 0.0,
            weighted_pos: [0.0; 3],
        }
    }
}

impl Accumulator {
    #[inline]
    fn add(&mut self, x: usize, y: usize, z: usize, flux: f32) {
        self.bbox.include(x, y, z);
        self.n_voxels += 1;
        if flux.is_nan() {
            return;
        }
        let flux = flux as f64;
        self.flux_min = self.flux_min.min(flux);
        self.flux_max = self.flux_max.max(flux);
        self.flux_total += flux;
        let w = flux.abs();
        self.weight += w;
        self.weighted_pos[0] += w * x as f64;
        self.weighted_pos[1] += w * y as f64;
        self.weighted_pos[2] += w * z as f64;
    }

    fn into_record(self, id: u32) -> SourceRecord {
        let geometric_center = self.bbox.center();
        let flux_center = if self.weight > 0.0 {
            self.weighted_pos.map(|p| p / self.weight)
        } else {
            geometric_center
        };
        // Out-of-box centroids fall back to the box midpoint.
        let flux_center = if self.bbox.contains_point(flux_center) {
            flux_center
        } else {
            geometric_center
        };
        let finite_or_nan = |v: f64| if v.is_finite() { v } else { f64::NAN };

        SourceRecord {
            id,
            old_id: None,
            geometric_center,
            flux_center,
            bbox: self.bbox,
            n_voxels: self.n_voxels,
            flux_min: finite_or_nan(self.flux_min),
            flux_max: finite_or_nan(self.flux_max),
            flux_total: self.flux_total,
            reliability: None,
        }
    }
}

fn measure_sources(cube: &Buffer3<f32>, labels: &Buffer3<u32>, num_sources: usize) -> Vec<SourceRecord> {
    let mut acc = vec![Accumulator::default(); num_sources];
    for (idx, &label) in labels.iter().enumerate() {
        if label != 0 {
            let (x, y, z) = labels.coords(idx);
            acc[label as usize - 1].add(x, y, z, cube[idx]);
        }
    }
    (1u32..)
        .zip(acc)
        .map(|(id, acc)| acc.into_record(id))
        .collect()
}
