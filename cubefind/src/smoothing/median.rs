//! 3D running median.

use common::Buffer3;
use rayon::prelude::*;

use super::EdgeMode;

/// Median over a `[x, y, z]` box window centred on every voxel.
///
/// The window spans `[i - size / 2, i - size / 2 + size - 1]` on each axis.
/// Even-sized windows take the upper of the two middle values. With
/// [`EdgeMode::Constant`] padding samples count as zero.
pub fn median_filter(input: &Buffer3<f32>, sizes: [usize; 3], mode: EdgeMode) -> Buffer3<f32> {
    assert!(
        sizes.iter().all(|&s| s > 0),
        "median window sizes must be positive, got {:?}",
        sizes
    );
    if input.is_empty() {
        return input.clone();
    }

    let width = input.width();
    let height = input.height();
    let depth = input.depth();
    let window_len = sizes[0] * sizes[1] * sizes[2];
    let mut output = vec![0.0f32; input.len()];

    output.par_chunks_mut(width).enumerate().for_each_init(
        || Vec::with_capacity(window_len),
        |window, (row, out_row)| {
            let y = row % height;
            let z = row / height;

            for (x, out) in out_row.iter_mut().enumerate() {
                window.clear();
                for dz in 0..sizes[2] {
                    let sz = mode.resolve(offset(z, dz, sizes[2]), depth);
                    for dy in 0..sizes[1] {
                        let sy = mode.resolve(offset(y, dy, sizes[1]), height);
                        for dx in 0..sizes[0] {
                            let sx = mode.resolve(offset(x, dx, sizes[0]), width);
                            let v = match (sx, sy, sz) {
                                (Some(sx), Some(sy), Some(sz)) => input[(sx, sy, sz)],
                                _ => 0.0,
                            };
                            window.push(v);
                        }
                    }
                }
                let mid = window.len() / 2;
                let (_, median, _) = window.select_nth_unstable_by(mid, f32::total_cmp);
                *out = *median;
            }
        },
    );

    Buffer3::new(width, height, depth, output)
}

#[inline]
fn offset(center: usize, k: usize, size: usize) -> isize {
    center as isize + k as isize - (size / 2) as isize
}
