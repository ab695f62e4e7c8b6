//! Cold-start analysis against real child processes.
//!
//! `cat` plays a line-protocol server (it echoes each request line) and a
//! short `sleep` plays the one-shot baseline.

#![cfg(unix)]

use std::time::Duration;
use toolcall_bench::coldstart::{analyze_cold_start, ColdStartConfig, COLD_START_CATEGORY};
use toolcall_bench::harness::BenchmarkConfig;
use toolcall_bench::logging::init_test_logging;
use toolcall_bench::schema::{ProbeStatus, RunMeta};
use toolcall_bench::subject::{CommandOp, LineServer};
use toolcall_bench::suite::{BenchmarkSuite, WarningKind};
use toolcall_bench::BenchError;

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn cfg() -> ColdStartConfig {
    let fixed = |n| BenchmarkConfig {
        warmup_iterations: 1,
        ..BenchmarkConfig::fixed(n)
    };
    ColdStartConfig {
        warm: fixed(10),
        baseline: fixed(3),
        propagate_std_dev: false,
    }
}

#[test]
fn echo_server_beats_sleeping_baseline() {
    init_test_logging();
    let mut server = LineServer::new(&argv(&["cat"]), "{\"tool\":\"status\"}").unwrap();
    let mut baseline = CommandOp::new(&argv(&["sleep", "0.05"])).unwrap();

    let report = analyze_cold_start(&mut server, || baseline.run(), &cfg()).unwrap();
    server.shutdown();

    let m = &report.metrics;
    assert!(m.server_startup_time >= m.first_query_time);
    assert!(m.average_warm_query_time > Duration::ZERO);
    assert!(report.baseline.mean >= Duration::from_millis(50));
    assert!(m.break_even_operations >= 1, "{}", m.break_even_reason);
    assert!(m.break_even_reason.contains("recovered"));
    assert!(m.break_even_bounds.is_none());
    assert!(report.pid.is_some());

    // The probe may be unavailable in minimal containers, but it was attempted.
    assert_ne!(report.memory.process_probe, ProbeStatus::NotRequested);

    let row = report.to_result("status");
    assert_eq!(row.category, COLD_START_CATEGORY);
    assert!(row.success);
    assert!(row.speedup_factor > 1.0);

    let suite = BenchmarkSuite::build(RunMeta::capture("quick"), vec![row], Some(report.metrics.clone()));
    assert_eq!(suite.summary.successful, 1);
    assert!(suite
        .warnings
        .iter()
        .all(|w| w.kind != WarningKind::Failed));
}

#[test]
fn missing_server_binary_is_a_setup_error() {
    let mut server = LineServer::new(&argv(&["definitely-not-a-real-server-xyz"]), "ping").unwrap();
    let err = analyze_cold_start(&mut server, || Duration::from_millis(1), &cfg()).unwrap_err();
    assert!(matches!(err, BenchError::Setup { stage: "spawn", .. }));
}

#[test]
fn server_that_exits_immediately_fails_first_query() {
    let mut server = LineServer::new(&argv(&["true"]), "ping").unwrap();
    let err = analyze_cold_start(&mut server, || Duration::from_millis(1), &cfg()).unwrap_err();
    assert!(matches!(err, BenchError::Setup { stage: "first query", .. }));
}

#[test]
fn failing_baseline_yields_failed_row_not_error() {
    let mut server = LineServer::new(&argv(&["cat"]), "ping").unwrap();
    let mut baseline = CommandOp::new(&argv(&["false"])).unwrap();

    let report = analyze_cold_start(&mut server, || baseline.run(), &cfg()).unwrap();
    assert_eq!(report.metrics.break_even_operations, -1);

    let suite = BenchmarkSuite::build(RunMeta::capture("quick"), vec![report.to_result("ping")], None);
    assert_eq!(suite.summary.failed, 1);
    assert!(suite.warnings.iter().any(|w| w.kind == WarningKind::Failed));
}
