//! Source catalog produced by linking and annotated by reliability.
//!
//! Each [`SourceRecord`] carries the measurements made by the linker. The
//! column schema ([`Column`]) maps names to unit, printf-style format and
//! accessor in one ordered list, so writers can render any subset of columns
//! without parallel name/unit/format arrays.

mod columns;


use common::Buffer3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::math::Aabb3;

pub use columns::{CellValue, Column, ColumnFormat};

/// Reliability annotation of one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityScore {
    /// Positive-population density at the source, scaled by population size.
    pub n_pos: f64,
    /// Negative-population density at the source, scaled by population size.
    pub n_neg: f64,
    /// `(n_pos - n_neg) / n_pos` clamped at 0; -1 for negative sources.
    pub reliability: f64,
}

/// One linked source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// 1-based identifier, also the source's value in the labeled mask.
    pub id: u32,
    /// Identifier before the final renumbering.
    pub old_id: Option<u32>,
    /// Bounding-box midpoint `[x, y, z]`.
    pub geometric_center: [f64; 3],
    /// `|flux|`-weighted centroid `[x, y, z]`.
    pub flux_center: [f64; 3],
    pub bbox: Aabb3,
    pub n_voxels: usize,
    pub flux_min: f64,
    pub flux_max: f64,
    pub flux_total: f64,
    pub reliability: Option<ReliabilityScore>,
}

impl SourceRecord {
    #[inline]
    pub fn is_positive(&self) -> bool {
        self.flux_total > 0.0
    }

    /// Number of channels spanned.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.bbox.depth()
    }
}

/// Ordered collection of sources with unique IDs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    records: Vec<SourceRecord>,
    data_unit: String,
}

impl Catalog {
    pub fn new(data_unit: impl Into<String>) -> Self {
        Self {
            records: Vec::new(),
            data_unit: data_unit.into(),
        }
    }

    pub fn from_records(records: Vec<SourceRecord>, data_unit: impl Into<String>) -> Self {
        debug_assert!(
            {
                let mut ids: Vec<u32> = records.iter().map(|r| r.id).collect();
                ids.sort_unstable();
                ids.windows(2).all(|w| w[0] != w[1])
            },
            "catalog IDs must be unique"
        );
        Self {
            records,
            data_unit: data_unit.into(),
        }
    }

    pub fn push(&mut self, record: SourceRecord) {
        debug_assert!(self.get(record.id).is_none(), "duplicate source ID {}", record.id);
        self.records.push(record);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn records(&self) -> &[SourceRecord] {
        &self.records
    }

    #[inline]
    pub fn records_mut(&mut self) -> &mut [SourceRecord] {
        &mut self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SourceRecord> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<SourceRecord> {
        self.records
    }

    pub fn get(&self, id: u32) -> Option<&SourceRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn data_unit(&self) -> &str {
        &self.data_unit
    }

    pub fn set_data_unit(&mut self, unit: impl Into<String>) {
        self.data_unit = unit.into();
    }

    pub fn positive_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_positive()).count()
    }

    /// Full column schema for the current state of the catalog.
    ///
    /// `ID_old` appears once sources were renumbered, and the reliability
    /// columns once any source carries a score.
    pub fn columns(&self) -> Vec<Column> {
        let mut columns = columns::base_columns(&self.data_unit);
        if self.records.iter().any(|r| r.old_id.is_some()) {
            columns.insert(1, columns::old_id_column());
        }
        if self.records.iter().any(|r| r.reliability.is_some()) {
            columns.extend(columns::reliability_columns());
        }
        columns
    }

    /// Columns named in `names`, in the order given. An empty list selects
    /// every column. Unknown names are skipped with a warning.
    pub fn select(&self, names: &[&str]) -> Vec<Column> {
        let all = self.columns();
        if names.is_empty() {
            return all;
        }
        names
            .iter()
            .filter_map(|name| {
                let column = all.iter().find(|c| c.name == *name).cloned();
                if column.is_none() {
                    tracing::warn!(column = *name, "Unknown catalog column requested");
                }
                column
            })
            .collect()
    }

    /// Keep records accepted by `keep`, sort them by ID and renumber them
    /// `1..=n`, remembering each previous ID in `old_id`.
    ///
    /// Returns a lookup table indexed by previous ID giving the new ID, 0
    /// for dropped sources. Pass it to [`relabel_mask`].
    pub fn retain_and_renumber(&mut self, mut keep: impl FnMut(&SourceRecord) -> bool) -> Vec<u32> {
        let max_id = self.records.iter().map(|r| r.id).max().unwrap_or(0) as usize;
        let mut remap = vec![0u32; max_id + 1];

        self.records.retain(|r| keep(r));
        self.records.sort_by_key(|r| r.id);
        for (new_id, record) in (1u32..).zip(self.records.iter_mut()) {
            remap[record.id as usize] = new_id;
            record.old_id = Some(record.id);
            record.id = new_id;
        }
        remap
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a SourceRecord;
    type IntoIter = std::slice::Iter<'a, SourceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Rewrite every label through `remap`; labels outside it become 0.
pub fn relabel_mask(labels: &mut Buffer3<u32>, remap: &[u32]) {
    labels.voxels_mut().par_iter_mut().for_each(|label| {
        *label = remap.get(*label as usize).copied().unwrap_or(0);
    });
}
