//! Cold-start cost of a long-running server and the number of operations
//! needed before it beats one-shot invocations.
//!
//! The analysis times `spawn` plus the very first query, samples warm
//! queries and the baseline, then solves
//! `startup + n * warm <= n * baseline` for the smallest `n`.

use std::fmt::Display;
use std::time::{Duration, Instant};

use tracing::{info, info_span};

use crate::compare::{fmt_duration, speedup};
use crate::error::{BenchError, Result};
use crate::harness::{sample, time_op, BenchmarkConfig};
use crate::memory::capture_with_process;
use crate::schema::{BenchmarkResult, BreakEvenBounds, ColdStartMetrics, MemoryMetrics};
use crate::stats::Stats;

pub const COLD_START_CATEGORY: &str = "cold_start";

/// A server the analysis can bring up and query.
///
/// The analysis never tears the target down; the owner does that once
/// every measurement that uses it has finished.
pub trait ColdStartTarget {
    type Error: Display;

    /// Start the server. Returns its process id when there is one to probe.
    fn spawn(&mut self) -> std::result::Result<Option<u32>, Self::Error>;

    /// Perform one logical operation against the running server.
    fn query(&mut self) -> std::result::Result<(), Self::Error>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColdStartConfig {
    /// Sampler settings for warm queries.
    pub warm: BenchmarkConfig,
    /// Sampler settings for the one-shot baseline.
    pub baseline: BenchmarkConfig,
    /// Also report break-even bounds using ±1σ of both means.
    pub propagate_std_dev: bool,
}

impl Default for ColdStartConfig {
    fn default() -> Self {
        Self {
            warm: BenchmarkConfig::in_process(),
            baseline: BenchmarkConfig::cli(),
            propagate_std_dev: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BreakEven {
    pub operations: i64,
    pub reason: String,
}

/// Smallest number of operations after which the server's startup cost is
/// recovered, or `-1` when warm queries are not cheaper than the baseline.
pub fn break_even(startup: Duration, baseline_mean: Duration, warm_mean: Duration) -> BreakEven {
    let Some(saved) = baseline_mean.checked_sub(warm_mean).filter(|d| !d.is_zero()) else {
        return BreakEven {
            operations: -1,
            reason: format!(
                "no break-even: a warm query ({}) is not cheaper than the baseline ({}), \
                 so the {} startup cost is never recovered",
                fmt_duration(warm_mean),
                fmt_duration(baseline_mean),
                fmt_duration(startup),
            ),
        };
    };

    let operations = ceil_ops(startup, saved).max(1);
    let noun = if operations == 1 { "operation" } else { "operations" };
    BreakEven {
        operations,
        reason: format!(
            "each warm query saves {} over the baseline; after {operations} {noun} \
             the fixed {} startup cost is recovered",
            fmt_duration(saved),
            fmt_duration(startup),
        ),
    }
}

/// Break-even from sampled stats. A zero mean on either side is the failure
/// sentinel, so no break-even is derived from it and no bounds are given.
pub fn solve_break_even(
    startup: Duration,
    baseline: &Stats,
    warm: &Stats,
    with_bounds: bool,
) -> (BreakEven, Option<BreakEvenBounds>) {
    let failed_side = if warm.mean.is_zero() {
        Some("warm query")
    } else if baseline.mean.is_zero() {
        Some("baseline")
    } else {
        None
    };
    if let Some(side) = failed_side {
        let be = BreakEven {
            operations: -1,
            reason: format!("no break-even: the {side} measurement failed, so there is nothing to amortize against"),
        };
        return (be, None);
    }
    let bounds = with_bounds.then(|| break_even_bounds(startup, baseline, warm));
    (break_even(startup, baseline.mean, warm.mean), bounds)
}

fn ceil_ops(startup: Duration, saved: Duration) -> i64 {
    let (s, d) = (startup.as_nanos(), saved.as_nanos());
    i64::try_from(s.div_ceil(d)).unwrap_or(i64::MAX)
}

/// Break-even with both means shifted by one standard deviation in the
/// favourable and unfavourable direction.
pub fn break_even_bounds(startup: Duration, baseline: &Stats, warm: &Stats) -> BreakEvenBounds {
    let optimistic = break_even(
        startup,
        baseline.mean.saturating_add(baseline.std_dev),
        warm.mean.saturating_sub(warm.std_dev),
    );
    let pessimistic = break_even(
        startup,
        baseline.mean.saturating_sub(baseline.std_dev),
        warm.mean.saturating_add(warm.std_dev),
    );
    BreakEvenBounds {
        optimistic: optimistic.operations,
        pessimistic: pessimistic.operations,
    }
}

#[derive(Clone, Debug)]
pub struct ColdStartReport {
    pub metrics: ColdStartMetrics,
    pub memory: MemoryMetrics,
    pub warm: Stats,
    pub baseline: Stats,
    pub pid: Option<u32>,
}

impl ColdStartReport {
    /// Report row for the suite; the candidate side is the warm query.
    pub fn to_result(&self, name: &str) -> BenchmarkResult {
        let mut result = BenchmarkResult::from_stats(name, COLD_START_CATEGORY, &self.warm)
            .with_baseline(&self.baseline);
        result.memory = Some(self.memory.clone());
        if self.warm.mean.is_zero() {
            return result.failed("warm query failed");
        }
        if self.baseline.mean.is_zero() {
            return result.failed("baseline tool failed");
        }
        result.speedup_factor = speedup(self.baseline.mean, self.warm.mean);
        result.comparison_note = format!(
            "startup {}, first query {}, warm {} ± {}, baseline {} ± {}; {}",
            fmt_duration(self.metrics.server_startup_time),
            fmt_duration(self.metrics.first_query_time),
            fmt_duration(self.warm.mean),
            fmt_duration(self.warm.std_dev),
            fmt_duration(self.baseline.mean),
            fmt_duration(self.baseline.std_dev),
            self.metrics.break_even_reason,
        );
        result
    }
}

/// Measure startup, warm and baseline costs and solve for break-even.
///
/// Only a failing `spawn` or first `query` is an error. Later failures
/// show up as zero means; memory probe failures leave zeroed fields.
pub fn analyze_cold_start<T: ColdStartTarget>(
    target: &mut T,
    baseline_op: impl FnMut() -> Duration,
    cfg: &ColdStartConfig,
) -> Result<ColdStartReport> {
    cfg.warm.validate()?;
    cfg.baseline.validate()?;
    let _span = info_span!("cold_start").entered();

    let start = Instant::now();
    let pid = target.spawn().map_err(|e| BenchError::setup("spawn", e))?;
    let query_start = Instant::now();
    target.query().map_err(|e| BenchError::setup("first query", e))?;
    let first_query_time = query_start.elapsed();
    let server_startup_time = start.elapsed();
    info!(
        startup = %fmt_duration(server_startup_time),
        first_query = %fmt_duration(first_query_time),
        ?pid,
        "server ready"
    );

    let warm = sample(|| time_op(|| target.query()), &cfg.warm).stats();
    let baseline = sample(baseline_op, &cfg.baseline).stats();

    let (be, bounds) =
        solve_break_even(server_startup_time, &baseline, &warm, cfg.propagate_std_dev);
    info!(operations = be.operations, "{}", be.reason);

    let memory = capture_with_process(pid);

    Ok(ColdStartReport {
        metrics: ColdStartMetrics {
            server_startup_time,
            first_query_time,
            average_warm_query_time: warm.mean,
            break_even_operations: be.operations,
            break_even_reason: be.reason,
            break_even_bounds: bounds,
        },
        memory,
        warm,
        baseline,
        pid,
    })
}
