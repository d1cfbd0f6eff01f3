//! Example: find sources in a synthetic spectral-line cube
//!
//! Builds a noise cube with a handful of emission lines and one absorption
//! feature, runs the full pipeline and prints the catalog.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example find_sources
//! cargo run --example find_sources -- config.yaml
//! ```
//!
//! The optional argument is a YAML pipeline configuration; any option left
//! out keeps its default.

use std::env;
use std::time::Instant;

use anyhow::Context;
use cubefind::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WIDTH: usize = 96;
const HEIGHT: usize = 96;
const DEPTH: usize = 64;
const NOISE_SIGMA: f32 = 0.002;

/// Emission lines as `(x, y, z, spatial sigma, spectral sigma, peak)`.
const LINES: [(f32, f32, f32, f32, f32, f32); 5] = [
    (20.0, 24.0, 16.0, 2.0, 3.0, 0.012),
    (70.0, 30.0, 40.0, 3.0, 5.0, 0.008),
    (48.0, 70.0, 24.0, 2.5, 2.0, 0.015),
    (80.0, 80.0, 50.0, 1.5, 4.0, 0.010),
    (30.0, 60.0, 44.0, 4.0, 6.0, 0.005),
];

fn main() -> anyhow::Result<()> {
    common::setup_logging("find_sources", "info", common::log_setup::LOG_DIR);

    let config = match env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read configuration {}", path))?;
            PipelineConfig::from_yaml_str(&text)
                .with_context(|| format!("Failed to parse configuration {}", path))?
        }
        None => PipelineConfig::default(),
    };
    for line in config.provenance() {
        tracing::debug!("{}", line);
    }

    let cube = synthetic_cube();
    let header = CubeHeader::with_increments(-1.0 / 3600.0, 1.0 / 3600.0, 5000.0)
        .with_beam(3.0 / 3600.0, 3.0 / 3600.0);

    let start = Instant::now();
    let result = Pipeline::new(config)
        .run(&cube, &header, &CancellationToken::new())
        .context("Source finding failed")?;
    tracing::info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        sources = result.catalog.len(),
        noise = result.noise,
        stage = %result.stage,
        "Pipeline finished"
    );

    print_catalog(&result.catalog);
    Ok(())
}

fn synthetic_cube() -> Cube {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut voxels = vec![0.0f32; WIDTH * HEIGHT * DEPTH];
    for pair in voxels.chunks_mut(2) {
        let u1: f32 = rng.random_range(1e-10f32..1.0);
        let u2: f32 = rng.random_range(0.0f32..1.0);
        let r = (-2.0 * u1.ln()).sqrt() * NOISE_SIGMA;
        let theta = 2.0 * std::f32::consts::PI * u2;
        pair[0] = r * theta.cos();
        if let Some(second) = pair.get_mut(1) {
            *second = r * theta.sin();
        }
    }

    let mut cube = Cube::new(WIDTH, HEIGHT, DEPTH, voxels);
    for &(cx, cy, cz, sxy, sz, peak) in &LINES {
        add_line(&mut cube, [cx, cy, cz], [sxy, sxy, sz], peak);
    }
    // Absorption against a continuum source
    add_line(&mut cube, [60.0, 12.0, 10.0], [1.5, 1.5, 2.0], -0.009);
    cube
}

fn add_line(cube: &mut Cube, center: [f32; 3], sigmas: [f32; 3], peak: f32) {
    for z in 0..DEPTH {
        for y in 0..HEIGHT {
            for x in 0..WIDTH {
                let dx = (x as f32 - center[0]) / sigmas[0];
                let dy = (y as f32 - center[1]) / sigmas[1];
                let dz = (z as f32 - center[2]) / sigmas[2];
                let r2 = dx * dx + dy * dy + dz * dz;
                if r2 < 36.0 {
                    cube[(x, y, z)] += peak * (-0.5 * r2).exp();
                }
            }
        }
    }
}

fn print_catalog(catalog: &Catalog) {
    let columns = catalog.columns();
    let header: Vec<String> = columns
        .iter()
        .map(|c| format!("{:>width$}", c.name, width = c.format.width()))
        .collect();
    let units: Vec<String> = columns
        .iter()
        .map(|c| format!("{:>width$}", c.unit, width = c.format.width()))
        .collect();
    println!("#{}", header.join(" "));
    println!("#{}", units.join(" "));
    for record in catalog {
        let row: Vec<String> = columns.iter().map(|c| c.format_value(record)).collect();
        println!(" {}", row.join(" "));
    }
}
