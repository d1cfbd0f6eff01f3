//! Benchmarks for noise estimation, multi-scale detection and linking.
//!
//! Run with: cargo bench -p cubefind --bench detection

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use cubefind::prelude::*;
use cubefind::{NoiseMode, detect, estimate_noise, link};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SIZES: [(usize, usize, usize); 2] = [(64, 64, 64), (128, 128, 64)];

/// Unit Gaussian noise with a few bright blobs.
fn synthetic_cube(width: usize, height: usize, depth: usize) -> Cube {
    let mut rng = StdRng::seed_from_u64(42);
    let mut voxels: Vec<f32> = (0..width * height * depth)
        .map(|_| {
            let u1: f32 = rng.random_range(1e-10f32..1.0);
            let u2: f32 = rng.random_range(0.0f32..1.0);
            (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
        })
        .collect();

    for i in 1..=4 {
        let (cx, cy, cz) = (i * width / 5, i * height / 5, depth / 2);
        for z in cz.saturating_sub(4)..(cz + 4).min(depth) {
            for y in cy.saturating_sub(3)..(cy + 3).min(height) {
                for x in cx.saturating_sub(3)..(cx + 3).min(width) {
                    voxels[(z * height + y) * width + x] += 6.0;
                }
            }
        }
    }
    Cube::new(width, height, depth, voxels)
}

fn noise_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("noise");
    for &(w, h, d) in &SIZES {
        let cube = synthetic_cube(w, h, d);
        group.throughput(Throughput::Elements((w * h * d) as u64));
        for mode in [NoiseMode::Negative, NoiseMode::Mad, NoiseMode::Std] {
            let config = NoiseConfig::with_mode(mode);
            group.bench_with_input(
                BenchmarkId::new(mode.as_str(), format!("{}x{}x{}", w, h, d)),
                &cube,
                |b, cube| b.iter(|| black_box(estimate_noise(black_box(cube), &config))),
            );
        }
    }
    group.finish();
}

fn detection_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("detection");
    group.sample_size(10);
    let header = CubeHeader::default();
    let noise = NoiseConfig::default();
    for &(w, h, d) in &SIZES {
        let cube = synthetic_cube(w, h, d);
        group.throughput(Throughput::Elements((w * h * d) as u64));
        for (name, config) in [
            ("single_scale", DetectionConfig::single_scale(4.0)),
            ("default_kernels", DetectionConfig::default()),
        ] {
            group.bench_with_input(
                BenchmarkId::new(name, format!("{}x{}x{}", w, h, d)),
                &cube,
                |b, cube| b.iter(|| black_box(detect(black_box(cube), &header, &config, &noise))),
            );
        }
    }
    group.finish();
}

fn linking_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("linking");
    let header = CubeHeader::default();
    for &(w, h, d) in &SIZES {
        let cube = synthetic_cube(w, h, d);
        let Ok(detection) = detect(
            &cube,
            &header,
            &DetectionConfig::default(),
            &NoiseConfig::default(),
        ) else {
            eprintln!("Skipping linking benchmark: detection failed");
            continue;
        };
        group.throughput(Throughput::Elements((w * h * d) as u64));
        group.bench_function(BenchmarkId::new("link", format!("{}x{}x{}", w, h, d)), |b| {
            b.iter(|| black_box(link(black_box(&cube), &detection.mask, &LinkConfig::default())))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    noise_benchmarks,
    detection_benchmarks,
    linking_benchmarks
);
criterion_main!(benches);
