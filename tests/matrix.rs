// PCHASE-SWEEP MATRIX AND PROJECTION PROPERTIES
// PURE LIBRARY TYPES. NO PROCESSES, NO FILESYSTEM.

use pchase_sweep::aggregate::{Aggregator, RAW_MARKER};
use pchase_sweep::config::RunConfig;
use pchase_sweep::invoke::RunResult;
use pchase_sweep::matrix::{AggregateMode, Study};
use pchase_sweep::pattern::{parse_sweep, Placement};
use pchase_sweep::presets;
use pchase_sweep::project::{project_str, ProjectOptions};

// === INVOCATION COUNTS ===

#[test]
fn every_preset_invokes_access_times_placement_times_stride() {
    for study in [presets::pollution(1, 2), presets::threads(1), presets::stride_pairs(1)] {
        let cells = study.access.len() * study.placements.len();
        let headers = if study.header { cells } else { 0 };
        assert_eq!(study.points().count(), cells * study.strides.len(), "{}", study.name);
        assert_eq!(study.invocation_count(), cells * study.strides.len() + headers, "{}", study.name);
    }
}

#[test]
fn every_config_names_one_entry_per_thread() {
    let study = presets::threads(0);
    for point in study.points() {
        let cfg = RunConfig::for_point(&study, &point);
        let text = cfg.render();
        let mut lines = text.lines();
        let count: usize = lines.next().unwrap().parse().unwrap();
        assert_eq!(count, lines.count());
        assert_eq!(count as u32, point.combination.placement.thread_count());
        assert!(!text.ends_with('\n'));
    }
}

#[test]
fn intra_topology_stacks_aggressors_on_victim_core() {
    let study = presets::threads(0);
    let point = study
        .points()
        .find(|p| matches!(p.combination.placement, Placement::Topology(t) if t.kind.label() == "intra"))
        .unwrap();
    let cfg = RunConfig::for_point(&study, &point);
    assert!(cfg.threads.iter().all(|t| t.core == 0));
}

// === AGGREGATION ===

#[test]
fn pivot_rows_follow_sweep_order() {
    let mut study = presets::pollution(1, 2);
    study.strides = parse_sweep("8,1,4").unwrap();
    let combo = study.combinations().remove(0);
    let mut agg = Aggregator::new(&study, &combo);
    for point in study.points_for(combo.clone()) {
        let result = RunResult::new(format!("2,{},9.0,10.0\n", point.stride));
        agg.push(&point, result).unwrap();
    }
    let text = agg.finish();
    let labels: Vec<&str> = text
        .lines()
        .skip(4)
        .map(|l| l.split(',').next().unwrap())
        .collect();
    assert_eq!(labels, vec!["8", "1", "4"]);
}

#[test]
fn raw_capture_keeps_one_marker_per_run() {
    let study = presets::stride_pairs(0);
    assert_eq!(study.mode, AggregateMode::Raw);
    let combo = study.combinations().remove(0);
    let mut agg = Aggregator::new(&study, &combo);
    for point in study.points_for(combo.clone()) {
        agg.push(&point, RunResult::new("2,1,1.0,1.0\n")).unwrap();
    }
    let text = agg.finish();
    assert_eq!(text.matches(RAW_MARKER).count(), study.strides.len());
}

// === PROJECTION ===

const CAPTURE: &str = "\
threads,stride,chain,memory latency (ns),memory bandwidth (MB/s)
2,1,1m,95.12,672.950
2,4,1m,97.40,657.218
2,8,1m,99.01,640.100
";

#[test]
fn projecting_full_header_is_identity() {
    let header: Vec<&str> = CAPTURE.lines().next().unwrap().split(',').collect();
    let out = project_str(CAPTURE, &header, &ProjectOptions::default()).unwrap();
    assert_eq!(out, CAPTURE);
}

#[test]
fn projecting_twice_equals_once() {
    let wanted = ["memory latency (ns)", "stride"];
    let once = project_str(CAPTURE, &wanted, &ProjectOptions::default()).unwrap();
    let twice = project_str(&once, &wanted, &ProjectOptions::default()).unwrap();
    assert_eq!(once, twice);
    assert!(once.starts_with("memory latency (ns),stride\n95.12,1\n"));
}

#[test]
fn study_file_round_trips_through_presets_shape() {
    let study = Study::from_toml(
        r#"
        name = "pollution-like"
        access = ["load_load", "store_load", "load_store", "store_store"]
        placements = ["base_base", "base_1", "1_base", "1_1", "1_2"]
        strides = [1, 2, 3, 4, 6, 8, 12, 16, 24, 32]
        node = 1
        victim_size = "1m"
        aggressor_size = "2m"
        mode = "pivot"
        layout = "combined"
        "#,
    )
    .unwrap();
    assert_eq!(study.access, presets::pollution(1, 2).access);
    assert_eq!(study.placements, presets::pollution(1, 2).placements);
    assert_eq!(study.invocation_count(), presets::pollution(1, 2).invocation_count());
}
