//! Kernel grouping by spatial scale.

use super::config::{Kernel, KernelUnit, SpectralShape};
use crate::cube::{Axis, CubeHeader};

/// Spectral member of a [`KernelGroup`], in pixel units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SpectralKernel {
    pub size: f32,
    pub shape: SpectralShape,
}

/// Kernels sharing one spatial scale, in pixel units.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct KernelGroup {
    pub x: f32,
    pub y: f32,
    pub spectral: Vec<SpectralKernel>,
}

impl KernelGroup {
    #[inline]
    pub fn is_unsmoothed(&self) -> bool {
        self.x + self.y == 0.0
    }
}

/// Convert kernels to pixels and group them by identical `(x, y)`.
///
/// Groups are sorted ascending by `(x, y)` so spatial smoothing can be
/// applied incrementally; members of a group are sorted ascending by
/// spectral size. Duplicate kernels collapse into one.
pub(crate) fn group_kernels(kernels: &[Kernel], unit: KernelUnit, header: &CubeHeader) -> Vec<KernelGroup> {
    let mut groups: Vec<KernelGroup> = Vec::new();

    for kernel in kernels {
        let (x, y, z) = match unit {
            KernelUnit::Pixel => (kernel.x, kernel.y, kernel.z),
            KernelUnit::World => (
                header.arcsec_to_pixels(kernel.x, Axis::X),
                header.arcsec_to_pixels(kernel.y, Axis::Y),
                header.kms_to_channels(kernel.z),
            ),
        };
        let member = SpectralKernel {
            size: z,
            shape: kernel.shape,
        };

        match groups.iter_mut().find(|g| g.x == x && g.y == y) {
            Some(group) => {
                if !group.spectral.contains(&member) {
                    group.spectral.push(member);
                }
            }
            None => groups.push(KernelGroup {
                x,
                y,
                spectral: vec![member],
            }),
        }
    }

    groups.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    for group in &mut groups {
        group.spectral.sort_by(|a, b| a.size.total_cmp(&b.size));
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_sorted_by_spatial_scale() {
        let kernels = [
            Kernel::boxcar(6.0, 3.0),
            Kernel::boxcar(0.0, 7.0),
            Kernel::boxcar(3.0, 0.0),
            Kernel::boxcar(0.0, 0.0),
            Kernel::new(6.0, 6.0, 0.0, SpectralShape::Gaussian),
            Kernel::boxcar(0.0, 7.0),
        ];
        let groups = group_kernels(&kernels, KernelUnit::Pixel, &CubeHeader::default());

        let scales: Vec<(f32, f32)> = groups.iter().map(|g| (g.x, g.y)).collect();
        assert_eq!(scales, vec![(0.0, 0.0), (3.0, 3.0), (6.0, 6.0)]);

        let sizes: Vec<f32> = groups[0].spectral.iter().map(|k| k.size).collect();
        assert_eq!(sizes, vec![0.0, 7.0], "duplicates collapse, sorted ascending");

        assert_eq!(groups[2].spectral[0].shape, SpectralShape::Gaussian);
        assert_eq!(groups[2].spectral[1].size, 3.0);
        assert!(groups[0].is_unsmoothed());
        assert!(!groups[1].is_unsmoothed());
    }

    #[test]
    fn test_world_units_converted() {
        // 10 arcsec pixels, 5 km/s channels
        let header = CubeHeader::with_increments(-10.0 / 3600.0, 10.0 / 3600.0, 5000.0);
        let groups = group_kernels(&[Kernel::boxcar(30.0, 15.0)], KernelUnit::World, &header);
        assert_eq!(groups.len(), 1);
        assert!((groups[0].x - 3.0).abs() < 1e-4);
        assert!((groups[0].y - 3.0).abs() < 1e-4);
        assert!((groups[0].spectral[0].size - 3.0).abs() < 1e-4);
    }
}
