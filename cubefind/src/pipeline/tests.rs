use std::collections::HashSet;

use super::*;
use crate::detection::Kernel;
use crate::noise::NoiseMode;
use crate::precondition::{AxisRange, FlagRegion, NoiseScaleConfig, SmoothConfig};
use crate::reliability::Parameter;
use crate::testing::{fill_box, init_tracing, noise_cube};

const WIDTH: usize = 48;
const HEIGHT: usize = 48;
const DEPTH: usize = 24;

/// Unit noise with three bright positive boxes and one faint negative box.
///
/// Linking discovers the negative box first, so the positive sources get
/// IDs 2, 3 and 4 before renumbering.
fn scene(with_negative: bool) -> Cube {
    let mut cube = noise_cube(WIDTH, HEIGHT, DEPTH, 1.0, 7);
    if with_negative {
        fill_box(&mut cube, (38, 40), (38, 40), (2, 3), -10.0);
    }
    fill_box(&mut cube, (10, 14), (10, 14), (8, 11), 20.0);
    fill_box(&mut cube, (30, 34), (10, 14), (8, 11), 20.0);
    fill_box(&mut cube, (20, 24), (32, 36), (14, 17), 20.0);
    cube
}

/// Unsmoothed detection at 5σ, which picks up exactly the boxes.
fn single_scale_config() -> PipelineConfig {
    PipelineConfig {
        detection: DetectionConfig::single_scale(5.0),
        ..PipelineConfig::default()
    }
}

fn run(config: PipelineConfig, cube: &Cube) -> Result<PipelineResult> {
    Pipeline::new(config).run(cube, &CubeHeader::default(), &CancellationToken::new())
}

// ============================================================================
// Full runs
// ============================================================================

#[test]
fn test_run_keeps_reliable_sources_and_renumbers() {
    init_tracing();
    let cube = scene(true);
    let result = run(single_scale_config(), &cube).unwrap();

    assert_eq!(result.stage, Stage::Done);
    assert!((result.noise - 1.0).abs() < 0.1, "noise {}", result.noise);

    let catalog = &result.catalog;
    assert_eq!(catalog.len(), 3);
    let ids: Vec<u32> = catalog.iter().map(|r| r.id).collect();
    let old_ids: Vec<Option<u32>> = catalog.iter().map(|r| r.old_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(old_ids, vec![Some(2), Some(3), Some(4)]);
    for record in catalog {
        assert_eq!(record.n_voxels, 100);
        assert!((record.flux_total - 2000.0).abs() < 1e-3);
        let score = record.reliability.unwrap();
        assert!(score.reliability > 0.9, "reliability {}", score.reliability);
    }

    assert_eq!(result.mask[(12, 12, 9)], 1);
    assert_eq!(result.mask[(32, 12, 9)], 2);
    assert_eq!(result.mask[(22, 34, 15)], 3);
    assert_eq!(result.mask[(39, 39, 2)], 0);
    assert_eq!(result.mask.iter().filter(|&&l| l != 0).count(), 300);

    let diagnostics = &result.diagnostics;
    assert_eq!(diagnostics.linked_sources, 4);
    assert_eq!(diagnostics.final_sources, 3);
    assert_eq!(diagnostics.mask_voxels, 3 * 100 + 18);
    let reliability = diagnostics.reliability.as_ref().unwrap();
    assert_eq!(reliability.positive, 3);
    assert_eq!(reliability.negative, 1);
    assert_eq!(reliability.reliable, 3);
}

#[test]
fn test_run_is_idempotent() {
    init_tracing();
    let cube = scene(true);
    let token = CancellationToken::new();
    // Multi-scale halos merge the negative box into a positive source, so
    // the default kernels run without reliability.
    let configs = [
        single_scale_config(),
        PipelineConfig {
            do_reliability: false,
            ..PipelineConfig::default()
        },
    ];

    for config in configs {
        let pipeline = Pipeline::new(config);
        let first = pipeline.run(&cube, &CubeHeader::default(), &token).unwrap();
        let second = pipeline.run(&cube, &CubeHeader::default(), &token).unwrap();
        assert_eq!(first.catalog, second.catalog);
        assert_eq!(first.mask, second.mask);
        assert_eq!(first.noise, second.noise);
        assert!(!first.catalog.is_empty());
    }
}

#[test]
fn test_threshold_only_matches_single_scale_detection() {
    let cube = scene(true);
    let detected = run(single_scale_config(), &cube).unwrap();

    let config = PipelineConfig {
        do_detect: false,
        do_threshold: true,
        threshold: ThresholdConfig {
            threshold: 5.0,
            ..ThresholdConfig::default()
        },
        ..PipelineConfig::default()
    };
    let thresholded = run(config, &cube).unwrap();
    assert_eq!(thresholded.diagnostics.detected_voxels, 0);
    assert_eq!(thresholded.diagnostics.threshold_voxels, 318);
    assert_eq!(thresholded.catalog, detected.catalog);
    assert_eq!(thresholded.mask, detected.mask);
}

#[test]
fn test_zero_detections_give_empty_catalog() {
    init_tracing();
    let cube = noise_cube(24, 24, 12, 1.0, 3);
    let config = PipelineConfig {
        detection: DetectionConfig::single_scale(8.0),
        ..PipelineConfig::default()
    };
    let result = run(config, &cube).unwrap();
    assert_eq!(result.stage, Stage::Done);
    assert!(result.catalog.is_empty());
    assert!(result.mask.iter().all(|&l| l == 0));
    assert_eq!(result.diagnostics.mask_voxels, 0);
    assert!(result.diagnostics.reliability.is_none());
}

#[test]
fn test_reliability_disabled_keeps_positive_sources() {
    let cube = scene(true);
    let config = PipelineConfig {
        do_reliability: false,
        ..single_scale_config()
    };
    let result = run(config, &cube).unwrap();
    assert_eq!(result.catalog.len(), 3);
    assert!(result.catalog.iter().all(|r| r.is_positive()));
    assert!(result.catalog.iter().all(|r| r.reliability.is_none()));
    assert!(result.diagnostics.reliability.is_none());
    assert_eq!(result.mask[(39, 39, 2)], 0);
}

#[test]
fn test_missing_negative_population_aborts() {
    let cube = scene(false);
    let err = run(single_scale_config(), &cube).unwrap_err();
    assert!(matches!(err, Error::NoNegativeSources));
}

#[test]
fn test_linking_disabled_returns_detection_mask() {
    let cube = scene(true);
    let config = PipelineConfig {
        do_link: false,
        ..single_scale_config()
    };
    let result = run(config, &cube).unwrap();
    assert_eq!(result.stage, Stage::MaskDetected);
    assert!(result.catalog.is_empty());
    assert_eq!(result.mask.iter().filter(|&&l| l == 1).count(), 318);
    assert_eq!(result.mask[(39, 39, 2)], 1);
}

// ============================================================================
// Preconditioning
// ============================================================================

#[test]
fn test_flagged_region_hides_source_and_input_is_untouched() {
    let cube = scene(true);
    let original = cube.clone();
    let mut config = single_scale_config();
    config.precondition.flag_regions = vec![FlagRegion::spatial(
        AxisRange::new(28, 37),
        AxisRange::new(8, 17),
    )];

    let result = run(config, &cube).unwrap();
    assert!(result.diagnostics.preconditioned);
    assert_eq!(cube, original);
    let old_ids: Vec<Option<u32>> = result.catalog.iter().map(|r| r.old_id).collect();
    assert_eq!(old_ids, vec![Some(2), Some(3)]);
    assert_eq!(result.mask[(32, 12, 9)], 0);
}

#[test]
fn test_weights_affect_detection_not_measurement() {
    let cube = scene(true);
    let weights = Buffer3::new_filled(WIDTH, HEIGHT, 1, 2.0f32);
    let result = Pipeline::new(single_scale_config())
        .with_weights(weights)
        .run(&cube, &CubeHeader::default(), &CancellationToken::new())
        .unwrap();

    assert!((result.noise - 2.0).abs() < 0.2, "noise {}", result.noise);
    assert_eq!(result.catalog.len(), 3);
    assert!((result.catalog.records()[0].flux_total - 2000.0).abs() < 1e-3);
}

#[test]
fn test_weights_shape_mismatch_aborts() {
    let cube = scene(true);
    let err = Pipeline::new(single_scale_config())
        .with_weights(Buffer3::new_filled(10, 10, 1, 1.0f32))
        .run(&cube, &CubeHeader::default(), &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
}

#[test]
fn test_invalid_weights_function_aborts() {
    let cube = scene(true);
    let mut config = single_scale_config();
    config.precondition.weights_function = Some("x +* 2".to_string());
    let err = run(config, &cube).unwrap_err();
    assert!(matches!(err, Error::InvalidWeightsFunction { .. }));
}

// ============================================================================
// Cancellation and stages
// ============================================================================

#[test]
fn test_cancelled_before_first_stage() {
    let cube = scene(true);
    let token = CancellationToken::new();
    let controller = token.clone();
    controller.cancel();
    assert!(token.is_cancelled());

    let err = Pipeline::new(single_scale_config())
        .run(&cube, &CubeHeader::default(), &token)
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled(Stage::NoiseEstimated)));
}

#[test]
fn test_token_check() {
    let token = CancellationToken::new();
    assert!(token.check(Stage::Linked).is_ok());
    token.cancel();
    assert!(matches!(
        token.check(Stage::Linked),
        Err(Error::Cancelled(Stage::Linked))
    ));
}

#[test]
fn test_stage_order_and_names() {
    assert!(Stage::Idle < Stage::NoiseEstimated);
    assert!(Stage::Linked < Stage::ReliabilityFiltered);
    assert!(Stage::ReliabilityFiltered < Stage::Done);
    assert_eq!(Stage::MaskDetected.to_string(), "mask_detected");
    assert_eq!(Stage::ReliabilityFiltered.to_string(), "reliability_filtered");
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_provenance_lines() {
    let lines = PipelineConfig::default().provenance();
    for expected in [
        "steps.do_reliability=true",
        "steps.do_threshold=false",
        "noise.mode=negative",
        "detection.threshold=4",
        "linking.merge_z=5",
        "linking.connectivity=twentysix",
        "reliability.bandwidths=0.15,0.05,0.1",
        "precondition.smooth_kind=none",
    ] {
        assert!(lines.iter().any(|l| l == expected), "missing {}", expected);
    }

    let keys: HashSet<&str> = lines
        .iter()
        .map(|l| l.split_once('=').unwrap().0)
        .collect();
    assert_eq!(keys.len(), lines.len());
    assert!(keys.iter().all(|k| k.contains('.')));
}

#[test]
fn test_yaml_round_trip() {
    let mut config = PipelineConfig::default();
    config.detection.threshold = 5.5;
    config.do_threshold = true;
    config.noise.mode = NoiseMode::Mad;
    config.reliability.parameters = [
        Parameter::PeakFlux,
        Parameter::TotalFlux,
        Parameter::ChannelCount,
    ];
    config.precondition.flag_regions = vec![FlagRegion::new(
        AxisRange::new(0, 4),
        AxisRange::open(2),
        AxisRange::new(1, 3),
    )];
    config.precondition.weights_function = Some("1 + x".to_string());
    config.precondition.smoothing = Some(SmoothConfig::default());
    config.precondition.noise_scaling = Some(NoiseScaleConfig::default());

    let text = config.to_yaml_string().unwrap();
    let parsed = PipelineConfig::from_yaml_str(&text).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_partial_yaml_uses_defaults() {
    let config =
        PipelineConfig::from_yaml_str("detection:\n  threshold: 5.0\ndo_reliability: false\n")
            .unwrap();
    assert_eq!(config.detection.threshold, 5.0);
    assert_eq!(config.detection.kernels, DetectionConfig::default().kernels);
    assert!(!config.do_reliability);
    assert!(config.do_detect);
    assert_eq!(config.link, LinkConfig::default());
}

#[test]
fn test_config_parse_errors() {
    let err = PipelineConfig::from_yaml_str("detection: [1, 2").unwrap_err();
    assert!(matches!(err, Error::Config { format: "yaml", .. }));

    let err = PipelineConfig::from_json_str("{\"do_link\": 3}").unwrap_err();
    assert!(matches!(err, Error::Config { format: "json", .. }));
}

#[test]
fn test_config_unknown_kernel_shape() {
    let yaml = "detection:\n  kernels:\n    - {x: 3.0, y: 3.0, z: 5.0, shape: g}\n    - {x: 0.0, y: 0.0, z: 3.0, shape: x}\n";
    let err = PipelineConfig::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, Error::UnsupportedKernelShape(ref s) if s == "x"), "{:?}", err);

    let json = r#"{"detection": {"kernels": [{"x": 0, "y": 0, "z": 3, "shape": "q"}]}}"#;
    let err = PipelineConfig::from_json_str(json).unwrap_err();
    assert!(matches!(err, Error::UnsupportedKernelShape(ref s) if s == "q"), "{:?}", err);

    let config = PipelineConfig::from_yaml_str("detection:\n  kernels:\n    - {x: 0.0, y: 0.0, z: 3.0, shape: G}\n").unwrap();
    assert_eq!(config.detection.kernels, vec![Kernel::new(0.0, 0.0, 3.0, SpectralShape::Gaussian)]);
}

#[test]
fn test_json_config() {
    let config =
        PipelineConfig::from_json_str(r#"{"link": {"merge_xy": 1}, "noise": {"mode": "mad"}}"#)
            .unwrap();
    assert_eq!(config.link.merge_xy, 1);
    assert_eq!(config.link.merge_z, 5);
    assert_eq!(config.noise.mode, NoiseMode::Mad);
}
