//! 3D connected component labeling using union-find over voxel runs.
//!
//! Each `(y, z)` row of the mask is run-length encoded in parallel. Rows are
//! then visited in raster order and every run is unioned with the connected
//! runs of the already-visited neighbour rows: `(y - 1, z)` and the three
//! rows `(y - 1..=y + 1, z - 1)`.

use common::{BitBuffer3, Buffer3};
use rayon::prelude::*;

use super::Connectivity;

/// A horizontal run of foreground voxels.
#[derive(Debug, Clone, Copy)]
struct Run {
    start: u32, // inclusive
    end: u32,   // exclusive
    label: u32,
}

/// Neighbour row offset `(dy, dz)` and the x-distance a run may reach into it.
fn neighbour_rows(connectivity: Connectivity) -> &'static [(isize, isize, u32)] {
    match connectivity {
        Connectivity::Six => &[(-1, 0, 0), (0, -1, 0)],
        Connectivity::Eighteen => &[(-1, 0, 1), (0, -1, 1), (-1, -1, 0), (1, -1, 0)],
        Connectivity::TwentySix => &[(-1, 0, 1), (0, -1, 1), (-1, -1, 1), (1, -1, 1)],
    }
}

/// Whether `prev` touches `curr` when runs may connect across `reach` columns.
#[inline]
fn runs_connected(prev: &Run, curr: &Run, reach: u32) -> bool {
    prev.start < curr.end + reach && prev.end + reach > curr.start
}

fn extract_runs(mask: &BitBuffer3, row: usize) -> Vec<Run> {
    let width = mask.width();
    let row_start = row * width;
    let mut runs = Vec::new();
    let mut x = 0;
    while x < width {
        if !mask.get(row_start + x) {
            x += 1;
            continue;
        }
        let start = x;
        while x < width && mask.get(row_start + x) {
            x += 1;
        }
        runs.push(Run {
            start: start as u32,
            end: x as u32,
            label: 0,
        });
    }
    runs
}

/// Label connected components of `mask`.
///
/// Labels are `1..=n` in order of each component's first voxel in raster
/// order; background is 0. Returns the label volume and `n`.
pub(super) fn label_components(mask: &BitBuffer3, connectivity: Connectivity) -> (Buffer3<u32>, usize) {
    let width = mask.width();
    let height = mask.height();
    let depth = mask.depth();
    let mut labels = Buffer3::new_default(width, height, depth);
    if mask.is_empty() {
        return (labels, 0);
    }

    let rows = height * depth;
    let mut row_runs: Vec<Vec<Run>> = (0..rows)
        .into_par_iter()
        .map(|row| extract_runs(mask, row))
        .collect();

    let mut uf = UnionFind::new();
    let neighbours = neighbour_rows(connectivity);

    for row in 0..rows {
        if row_runs[row].is_empty() {
            continue;
        }
        let y = (row % height) as isize;
        let z = (row / height) as isize;

        let (visited, rest) = row_runs.split_at_mut(row);
        let current = &mut rest[0];

        for run in current.iter_mut() {
            let mut assigned: Option<u32> = None;
            for &(dy, dz, reach) in neighbours {
                let (ny, nz) = (y + dy, z + dz);
                if ny < 0 || nz < 0 || ny >= height as isize {
                    continue;
                }
                let neighbour = &visited[nz as usize * height + ny as usize];
                for prev in neighbour.iter().filter(|prev| runs_connected(prev, run, reach)) {
                    match assigned {
                        Some(label) if label != prev.label => uf.union(label, prev.label),
                        None => assigned = Some(prev.label),
                        _ => {}
                    }
                }
            }
            run.label = assigned.unwrap_or_else(|| uf.make_set());
        }
    }

    let remap = uf.sequential_labels();
    let num_labels = remap.iter().copied().max().unwrap_or(0) as usize;

    labels
        .voxels_mut()
        .par_chunks_mut(width)
        .zip(row_runs.par_iter())
        .for_each(|(out_row, runs)| {
            for run in runs {
                let label = remap[run.label as usize];
                out_row[run.start as usize..run.end as usize].fill(label);
            }
        });

    (labels, num_labels)
}

/// Union-find over provisional labels `1..`.
#[derive(Debug)]
pub(super) struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    pub(super) fn new() -> Self {
        // Slot 0 is the background label.
        Self { parent: vec![0] }
    }

    #[inline]
    pub(super) fn make_set(&mut self) -> u32 {
        let label = self.parent.len() as u32;
        self.parent.push(label);
        label
    }

    /// Find root with iterative path compression (two-pass).
    #[inline]
    pub(super) fn find(&mut self, label: u32) -> u32 {
        let mut root = label;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }

        let mut current = label;
        while current != root {
            let next = self.parent[current as usize];
            self.parent[current as usize] = root;
            current = next;
        }
        root
    }

    /// Union keeping the smaller root, so the root is always the label
    /// created first.
    #[inline]
    pub(super) fn union(&mut self, a: u32, b: u32) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            let (smaller, larger) = if root_a < root_b {
                (root_a, root_b)
            } else {
                (root_b, root_a)
            };
            self.parent[larger as usize] = smaller;
        }
    }

    /// Map every provisional label to a final label `1..=n`, numbered in
    /// order of each set's root.
    pub(super) fn sequential_labels(&mut self) -> Vec<u32> {
        let len = self.parent.len();
        let mut remap = vec![0u32; len];
        let mut next = 1u32;
        for label in 1..len as u32 {
            let root = self.find(label);
            if root == label {
                remap[label as usize] = next;
                next += 1;
            } else {
                // Roots are smaller than their members, so already numbered.
                remap[label as usize] = remap[root as usize];
            }
        }
        remap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(width: usize, height: usize, depth: usize, voxels: &[(usize, usize, usize)]) -> BitBuffer3 {
        let mut mask = BitBuffer3::new_default(width, height, depth);
        for &(x, y, z) in voxels {
            mask.set_xyz(x, y, z, true);
        }
        mask
    }

    #[test]
    fn test_empty_mask() {
        let mask = BitBuffer3::new_default(4, 4, 4);
        let (labels, n) = label_components(&mask, Connectivity::TwentySix);
        assert_eq!(n, 0);
        assert!(labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn test_connectivity_variants() {
        // Face, edge and corner neighbours of (1, 1, 1)
        let face = mask_from(4, 4, 4, &[(1, 1, 1), (1, 1, 2)]);
        let edge = mask_from(4, 4, 4, &[(1, 1, 1), (2, 1, 2)]);
        let corner = mask_from(4, 4, 4, &[(1, 1, 1), (2, 2, 2)]);

        let count = |mask: &BitBuffer3, c| label_components(mask, c).1;

        assert_eq!(count(&face, Connectivity::Six), 1);
        assert_eq!(count(&edge, Connectivity::Six), 2);
        assert_eq!(count(&corner, Connectivity::Six), 2);

        assert_eq!(count(&face, Connectivity::Eighteen), 1);
        assert_eq!(count(&edge, Connectivity::Eighteen), 1);
        assert_eq!(count(&corner, Connectivity::Eighteen), 2);

        assert_eq!(count(&face, Connectivity::TwentySix), 1);
        assert_eq!(count(&edge, Connectivity::TwentySix), 1);
        assert_eq!(count(&corner, Connectivity::TwentySix), 1);
    }

    #[test]
    fn test_edge_neighbour_in_same_plane() {
        // Diagonal in the xy plane is an edge neighbour
        let mask = mask_from(4, 4, 1, &[(0, 0, 0), (1, 1, 0)]);
        assert_eq!(label_components(&mask, Connectivity::Six).1, 2);
        assert_eq!(label_components(&mask, Connectivity::Eighteen).1, 1);
    }

    #[test]
    fn test_u_shape_merges_and_labels_in_discovery_order() {
        // Two arms joined at a later row: provisional labels must unify.
        let mut voxels = vec![];
        for y in 0..4 {
            voxels.push((0, y, 0));
            voxels.push((4, y, 0));
        }
        for x in 0..5 {
            voxels.push((x, 4, 0));
        }
        // Separate blob discovered after the U's first voxel
        voxels.push((2, 0, 1));

        let mask = mask_from(6, 6, 2, &voxels);
        let (labels, n) = label_components(&mask, Connectivity::Six);
        assert_eq!(n, 2);
        assert_eq!(labels[(0, 0, 0)], 1);
        assert_eq!(labels[(4, 0, 0)], 1);
        assert_eq!(labels[(2, 4, 0)], 1);
        assert_eq!(labels[(2, 0, 1)], 2);
        assert_eq!(labels[(3, 3, 0)], 0);
    }

    #[test]
    fn test_union_find_keeps_smaller_root() {
        let mut uf = UnionFind::new();
        let a = uf.make_set();
        let b = uf.make_set();
        let c = uf.make_set();
        uf.union(c, b);
        uf.union(b, a);
        assert_eq!(uf.find(c), a);
        assert_eq!(uf.sequential_labels(), vec![0, 1, 1, 1]);
    }
}
