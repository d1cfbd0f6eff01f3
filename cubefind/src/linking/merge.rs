//! Merging of components whose bounding boxes lie close together.

use crate::math::Aabb3;

/// Group of merged components.
#[derive(Debug, Clone)]
struct Group {
    bbox: Aabb3,
    members: Vec<usize>,
}

/// Merge components whose bounding boxes are separated by at most
/// `radius[axis]` empty voxels along every axis.
///
/// Merging is repeated on the merged boxes until no pair qualifies, so it
/// is transitive. Returns, for each input box, the index of its group;
/// groups are numbered in order of their smallest member index.
pub(super) fn merge_by_gap(boxes: &[Aabb3], radius: [usize; 3]) -> Vec<usize> {
    let mut groups: Vec<Group> = boxes
        .iter()
        .enumerate()
        .map(|(i, &bbox)| Group {
            bbox,
            members: vec![i],
        })
        .collect();

    let mut passes = 0usize;
    loop {
        passes += 1;
        groups.sort_by_key(|g| g.bbox.x_min);
        let mut alive = vec![true; groups.len()];
        let mut merged_any = false;

        for i in 0..groups.len() {
            if !alive[i] {
                continue;
            }
            for j in i + 1..groups.len() {
                // Sorted by x_min: every later group starts even further right.
                if groups[j].bbox.x_min > groups[i].bbox.x_max.saturating_add(radius[0] + 1) {
                    break;
                }
                if !alive[j] || !within(&groups[i].bbox, &groups[j].bbox, radius) {
                    continue;
                }
                let absorbed = std::mem::take(&mut groups[j].members);
                let bbox = groups[j].bbox;
                groups[i].bbox = groups[i].bbox.union(&bbox);
                groups[i].members.extend(absorbed);
                alive[j] = false;
                merged_any = true;
            }
        }

        let mut keep = alive.into_iter();
        groups.retain(|_| keep.next().unwrap_or(false));
        if !merged_any {
            break;
        }
    }

    for group in &mut groups {
        group.members.sort_unstable();
    }
    groups.sort_by_key(|g| g.members[0]);

    tracing::debug!(
        components = boxes.len(),
        merged = groups.len(),
        passes,
        "Components merged"
    );

    let mut assignment = vec![0usize; boxes.len()];
    for (group_idx, group) in groups.iter().enumerate() {
        for &member in &group.members {
            assignment[member] = group_idx;
        }
    }
    assignment
}

#[inline]
fn within(a: &Aabb3, b: &Aabb3, radius: [usize; 3]) -> bool {
    let gap = a.gap(b);
    gap[0] <= radius[0] && gap[1] <= radius[1] && gap[2] <= radius[2]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: usize, y: usize, z: usize) -> Aabb3 {
        Aabb3::new(x, x, y, y, z, z)
    }

    #[test]
    fn test_chain_merges_transitively() {
        // a-b and b-c are within 2, a-c is not
        let boxes = [point(0, 0, 0), point(3, 0, 0), point(6, 0, 0), point(20, 0, 0)];
        assert_eq!(merge_by_gap(&boxes, [2, 2, 2]), vec![0, 0, 0, 1]);
    }

    #[test]
    fn test_merged_box_reaches_new_neighbour() {
        // c is close to the union of a and b but to neither on its own
        let a = point(1, 0, 0);
        let b = point(0, 0, 1);
        let c = point(2, 0, 2);
        assert_eq!(merge_by_gap(&[a, c], [0, 0, 0]), vec![0, 1]);
        assert_eq!(merge_by_gap(&[b, c], [0, 0, 0]), vec![0, 1]);
        assert_eq!(merge_by_gap(&[c, a, b], [0, 0, 0]), vec![0, 0, 0]);
    }

    #[test]
    fn test_all_axes_must_be_within_radius() {
        let boxes = [point(0, 0, 0), point(1, 1, 10)];
        assert_eq!(merge_by_gap(&boxes, [3, 3, 5]), vec![0, 1]);
        assert_eq!(merge_by_gap(&boxes, [3, 3, 9]), vec![0, 0]);
    }

    #[test]
    fn test_groups_numbered_by_first_member() {
        let boxes = [point(10, 0, 0), point(0, 0, 0), point(11, 0, 0)];
        assert_eq!(merge_by_gap(&boxes, [0, 0, 0]), vec![0, 1, 0]);
    }
}
