//! The bundled demo scenarios must parse, validate and describe the
//! traffic shapes they are named after.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};
use std::time::Duration;
use surge::{RampScheduler, Scenario, Step};

fn demo(name: &str) -> Scenario {
    let path: PathBuf = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos")
        .join(name);
    Scenario::load(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

fn scheduler(scenario: &Scenario) -> RampScheduler {
    RampScheduler::with_start(scenario.start_concurrency, scenario.stages.clone())
}

#[test]
fn test_normal_holds_fifty() {
    let scenario = demo("normal.yaml");
    let s = scheduler(&scenario);
    assert_eq!(s.peak_target(), 50);
    assert_eq!(s.total_duration(), Duration::from_secs(19 * 60));
    assert_eq!(s.target_at(Duration::from_secs(10 * 60)), Some(50));
    assert_eq!(scenario.thresholds().unwrap().len(), 4);
}

#[test]
fn test_peak_mixes_reads_and_writes() {
    let scenario = demo("peak.yaml");
    assert!(matches!(&scenario.steps[0], Step::OneOf { one_of } if one_of.len() == 3));
    let names: Vec<_> = scenario.operations().iter().map(|op| op.name.clone()).collect();
    assert!(names.contains(&"create_project".to_string()));
    assert!(scenario.thresholds().unwrap().iter().any(|t| t.abort_on_fail));
}

#[test]
fn test_stress_has_breaking_point() {
    let scenario = demo("stress.yaml");
    let bp = scenario.breaking_point.as_ref().unwrap();
    assert!(bp.abort);
    assert!((bp.error_rate_ceiling - 0.1).abs() < f64::EPSILON);
    assert_eq!(scheduler(&scenario).peak_target(), 400);
}

#[test]
fn test_spike_jumps_instantly() {
    let scenario = demo("spike.yaml");
    let s = scheduler(&scenario);
    assert_eq!(s.target_at(Duration::from_millis(119_999)), Some(20));
    assert_eq!(s.target_at(Duration::from_secs(120)), Some(200));
    assert_eq!(s.target_at(Duration::from_secs(300)), Some(20));
}

#[test]
fn test_soak_runs_for_hours() {
    let scenario = demo("soak.yaml");
    let s = scheduler(&scenario);
    assert!(s.total_duration() > Duration::from_secs(4 * 3600));
    let create = scenario
        .operations()
        .into_iter()
        .find(|op| op.name == "create_project")
        .unwrap();
    assert_eq!(create.probability, Some(0.1));
    assert_eq!(
        scenario.auth.as_ref().unwrap().token_ttl,
        Some(Duration::from_secs(30 * 60))
    );
}
