//! Synthetic cubes and helpers for unit tests.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cube::Cube;

/// Initialize tracing subscriber for tests.
/// Safe to call multiple times - will only initialize once.
/// Respects RUST_LOG env var, defaults to "info".
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Fill `values` with zero-mean Gaussian noise via Box-Muller.
pub fn fill_gaussian(values: &mut [f32], sigma: f32, rng: &mut StdRng) {
    for chunk in values.chunks_mut(2) {
        let u1: f32 = rng.random_range(1e-10f32..1.0);
        let u2: f32 = rng.random_range(0.0f32..1.0);
        let r = (-2.0 * u1.ln()).sqrt() * sigma;
        let theta = 2.0 * std::f32::consts::PI * u2;
        chunk[0] = r * theta.cos();
        if chunk.len() > 1 {
            chunk[1] = r * theta.sin();
        }
    }
}

/// Cube of pure Gaussian noise.
pub fn noise_cube(width: usize, height: usize, depth: usize, sigma: f32, seed: u64) -> Cube {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut voxels = vec![0.0f32; width * height * depth];
    fill_gaussian(&mut voxels, sigma, &mut rng);
    Cube::new(width, height, depth, voxels)
}

/// Add a 3D Gaussian blob with per-axis sigmas `[sx, sy, sz]`.
pub fn add_gaussian_blob(cube: &mut Cube, center: [f32; 3], sigmas: [f32; 3], amplitude: f32) {
    for z in 0..cube.depth() {
        for y in 0..cube.height() {
            for x in 0..cube.width() {
                let dx = (x as f32 - center[0]) / sigmas[0];
                let dy = (y as f32 - center[1]) / sigmas[1];
                let dz = (z as f32 - center[2]) / sigmas[2];
                let r2 = dx * dx + dy * dy + dz * dz;
                if r2 < 64.0 {
                    cube[(x, y, z)] += amplitude * (-0.5 * r2).exp();
                }
            }
        }
    }
}

/// Set every voxel of the inclusive box to `value`.
pub fn fill_box(
    cube: &mut Cube,
    x: (usize, usize),
    y: (usize, usize),
    z: (usize, usize),
    value: f32,
) {
    for zz in z.0..=z.1 {
        for yy in y.0..=y.1 {
            for xx in x.0..=x.1 {
                cube[(xx, yy, zz)] = value;
            }
        }
    }
}

/// Empty cube of zeros.
pub fn zero_cube(width: usize, height: usize, depth: usize) -> Cube {
    Cube::new(width, height, depth, vec![0.0; width * height * depth])
}
