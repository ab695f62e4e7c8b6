//! Paired baseline/candidate measurement.

use std::time::Duration;

use tracing::{info, warn};

use crate::harness::{sample, BenchmarkConfig};
use crate::schema::BenchmarkResult;
use crate::stats::Stats;

/// Identity of one comparison in the report.
#[derive(Clone, Debug)]
pub struct BenchmarkId {
    pub name: String,
    pub category: String,
}

impl BenchmarkId {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
        }
    }
}

/// Per-side sampler settings. Process spawns and protocol calls have very
/// different noise, so each side gets its own bounds and CV target.
#[derive(Clone, Debug, PartialEq)]
pub struct ComparisonConfig {
    pub baseline: BenchmarkConfig,
    pub candidate: BenchmarkConfig,
}

impl ComparisonConfig {
    pub fn uniform(cfg: BenchmarkConfig) -> Self {
        Self {
            baseline: cfg.clone(),
            candidate: cfg,
        }
    }
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            baseline: BenchmarkConfig::cli(),
            candidate: BenchmarkConfig::in_process(),
        }
    }
}

/// Sample both sides and derive the speedup.
///
/// Never fails: a side whose mean is zero turns the result into an
/// unsuccessful one with `speedup_factor == 0`.
pub fn compare(
    id: &BenchmarkId,
    baseline_op: impl FnMut() -> Duration,
    candidate_op: impl FnMut() -> Duration,
    cfg: &ComparisonConfig,
) -> BenchmarkResult {
    let baseline = sample(baseline_op, &cfg.baseline).stats();
    let candidate = sample(candidate_op, &cfg.candidate).stats();
    compare_stats(id, &baseline, &candidate)
}

/// Build a comparison result from already computed stats.
pub fn compare_stats(id: &BenchmarkId, baseline: &Stats, candidate: &Stats) -> BenchmarkResult {
    let result = BenchmarkResult::from_stats(&id.name, &id.category, candidate).with_baseline(baseline);

    if candidate.mean.is_zero() {
        warn!(name = %id.name, samples = candidate.count, "candidate produced no valid samples");
        return result.failed("candidate tool failed");
    }
    if baseline.mean.is_zero() {
        warn!(name = %id.name, samples = baseline.count, "baseline produced no valid samples");
        return result.failed("baseline tool failed");
    }

    let speedup_factor = speedup(baseline.mean, candidate.mean);
    let comparison_note = format!(
        "baseline {} ± {} (n={}), candidate {} ± {} (n={}): {}",
        fmt_duration(baseline.mean),
        fmt_duration(baseline.std_dev),
        baseline.count,
        fmt_duration(candidate.mean),
        fmt_duration(candidate.std_dev),
        candidate.count,
        describe_speedup(speedup_factor),
    );
    info!(name = %id.name, speedup = speedup_factor, "{comparison_note}");

    BenchmarkResult {
        speedup_factor,
        comparison_note,
        ..result
    }
}

/// `baseline / candidate`; values below one mean the candidate is slower.
pub fn speedup(baseline: Duration, candidate: Duration) -> f64 {
    if candidate.is_zero() {
        return 0.0;
    }
    baseline.as_nanos() as f64 / candidate.as_nanos() as f64
}

fn describe_speedup(factor: f64) -> String {
    if factor >= 1.0 {
        format!("candidate {factor:.1}x faster")
    } else {
        format!("candidate {:.1}x slower", 1.0 / factor)
    }
}

/// Human-scale rendering used in notes and reasons.
pub fn fmt_duration(d: Duration) -> String {
    let ns = d.as_nanos();
    if ns >= 1_000_000_000 {
        format!("{:.2}s", d.as_secs_f64())
    } else if ns >= 1_000_000 {
        format!("{:.2}ms", d.as_secs_f64() * 1e3)
    } else if ns >= 1_000 {
        format!("{:.2}µs", d.as_secs_f64() * 1e6)
    } else {
        format!("{ns}ns")
    }
}
