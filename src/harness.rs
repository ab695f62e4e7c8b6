use std::fmt::Display;
use std::hint::black_box;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{BenchError, Result};
use crate::stats::{RunningStats, Stats};

/// Pause after warmup so caches and allocators settle before measuring.
pub const SETTLE_PAUSE: Duration = Duration::from_millis(5);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Quick,
    Full,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Quick => "quick",
            Profile::Full => "full",
        }
    }

    /// Sampler settings for one-shot process invocations.
    pub fn cli(&self) -> BenchmarkConfig {
        match self {
            Profile::Quick => BenchmarkConfig::cli(),
            Profile::Full => BenchmarkConfig {
                min_iterations: 10,
                max_iterations: 100,
                warmup_iterations: 3,
                ..BenchmarkConfig::cli()
            },
        }
    }

    /// Sampler settings for calls against an already running server.
    pub fn in_process(&self) -> BenchmarkConfig {
        match self {
            Profile::Quick => BenchmarkConfig::in_process(),
            Profile::Full => BenchmarkConfig {
                min_iterations: 20,
                max_iterations: 500,
                warmup_iterations: 10,
                ..BenchmarkConfig::in_process()
            },
        }
    }
}

/// Bounds and stopping rule for one sampler run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    pub min_iterations: usize,
    pub max_iterations: usize,
    /// Stop once the coefficient of variation (percent) is at or below this.
    pub target_cv: f64,
    pub warmup_iterations: usize,
    pub warmup_enabled: bool,
    pub adaptive_enabled: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            min_iterations: 5,
            max_iterations: 50,
            target_cv: 10.0,
            warmup_iterations: 2,
            warmup_enabled: true,
            adaptive_enabled: true,
        }
    }
}

impl BenchmarkConfig {
    /// Process spawns are noisy; accept a looser CV.
    pub fn cli() -> Self {
        Self {
            min_iterations: 5,
            max_iterations: 30,
            target_cv: 15.0,
            warmup_iterations: 1,
            ..Self::default()
        }
    }

    pub fn in_process() -> Self {
        Self {
            min_iterations: 10,
            max_iterations: 200,
            target_cv: 5.0,
            warmup_iterations: 5,
            ..Self::default()
        }
    }

    /// Fixed-count mode: exactly `iterations` measured samples.
    pub fn fixed(iterations: usize) -> Self {
        Self {
            min_iterations: iterations,
            max_iterations: iterations,
            adaptive_enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_iterations > self.max_iterations {
            return Err(BenchError::InvalidConfig {
                reason: format!(
                    "min_iterations ({}) exceeds max_iterations ({})",
                    self.min_iterations, self.max_iterations
                ),
            });
        }
        if !self.target_cv.is_finite() || self.target_cv < 0.0 {
            return Err(BenchError::InvalidConfig {
                reason: format!("target_cv must be a non-negative number, got {}", self.target_cv),
            });
        }
        Ok(())
    }
}

/// Measured samples of one sampler run. Warmup calls are never recorded.
#[derive(Clone, Debug, Default)]
pub struct SampleSeries {
    samples: Vec<Duration>,
    running: RunningStats,
}

impl SampleSeries {
    fn with_capacity(n: usize) -> Self {
        Self {
            samples: Vec::with_capacity(n),
            running: RunningStats::new(),
        }
    }

    fn push(&mut self, d: Duration) {
        self.samples.push(d);
        self.running.push(d);
    }

    pub fn samples(&self) -> &[Duration] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn stats(&self) -> Stats {
        self.running.stats()
    }

    /// Number of attempts that reported the zero-duration failure sentinel.
    pub fn failures(&self) -> usize {
        self.samples.iter().filter(|d| d.is_zero()).count()
    }
}

/// Time one fallible call. Failures yield `Duration::ZERO`; successes are
/// at least one nanosecond so a coarse clock cannot fake a failure.
pub fn time_op<T, E: Display>(mut f: impl FnMut() -> std::result::Result<T, E>) -> Duration {
    let start = Instant::now();
    match f() {
        Ok(v) => {
            let elapsed = start.elapsed().max(Duration::from_nanos(1));
            black_box(v);
            elapsed
        }
        Err(e) => {
            debug!(error = %e, "timed operation failed");
            Duration::ZERO
        }
    }
}

/// Run `op` under `cfg`: optional warmup, then measure until the
/// coefficient of variation settles or `max_iterations` is reached.
///
/// An operation that always fails still yields `min_iterations` zero
/// samples; callers decide what a zero mean means.
pub fn sample(mut op: impl FnMut() -> Duration, cfg: &BenchmarkConfig) -> SampleSeries {
    if cfg.warmup_enabled && cfg.warmup_iterations > 0 {
        for _ in 0..cfg.warmup_iterations {
            black_box(op());
        }
        thread::sleep(SETTLE_PAUSE);
    }

    let mut series = SampleSeries::with_capacity(cfg.min_iterations);
    while series.len() < cfg.max_iterations {
        series.push(op());

        let n = series.len();
        if n < cfg.min_iterations {
            continue;
        }
        if !cfg.adaptive_enabled {
            break;
        }
        let cv = series.running.cv_percent();
        trace!(n, cv, "sample");
        if cv <= cfg.target_cv {
            debug!(n, cv, target = cfg.target_cv, "converged");
            break;
        }
    }

    if series.len() == cfg.max_iterations && cfg.adaptive_enabled {
        debug!(
            n = series.len(),
            cv = series.running.cv_percent(),
            "hit max_iterations before converging"
        );
    }
    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn scripted(durations: Vec<u64>) -> impl FnMut() -> Duration {
        let mut i = 0usize;
        move || {
            let d = Duration::from_millis(durations[i % durations.len()]);
            i += 1;
            d
        }
    }

    #[test]
    fn stable_op_stops_at_min() {
        let cfg = BenchmarkConfig {
            min_iterations: 4,
            max_iterations: 40,
            target_cv: 5.0,
            warmup_enabled: false,
            ..Default::default()
        };
        let series = sample(scripted(vec![10]), &cfg);
        assert_eq!(series.len(), 4);
    }

    #[test]
    fn noisy_op_runs_to_max() {
        let cfg = BenchmarkConfig {
            min_iterations: 3,
            max_iterations: 12,
            target_cv: 1.0,
            warmup_enabled: false,
            ..Default::default()
        };
        let series = sample(scripted(vec![1, 100]), &cfg);
        assert_eq!(series.len(), 12);
    }

    #[test]
    fn fixed_mode_ignores_variance() {
        let cfg = BenchmarkConfig {
            min_iterations: 7,
            max_iterations: 50,
            target_cv: 0.0,
            warmup_enabled: false,
            adaptive_enabled: false,
            ..Default::default()
        };
        let series = sample(scripted(vec![1, 100, 3]), &cfg);
        assert_eq!(series.len(), 7);

        let series = sample(scripted(vec![5]), &BenchmarkConfig::fixed(9));
        assert_eq!(series.len(), 9);
    }

    #[test]
    fn warmup_calls_are_not_recorded() {
        let calls = Cell::new(0usize);
        let cfg = BenchmarkConfig {
            min_iterations: 3,
            max_iterations: 3,
            warmup_iterations: 4,
            warmup_enabled: true,
            ..Default::default()
        };
        // Warmup returns a huge outlier; it must not show up in stats.
        let series = sample(
            || {
                let n = calls.get();
                calls.set(n + 1);
                if n < 4 {
                    Duration::from_secs(10)
                } else {
                    Duration::from_millis(2)
                }
            },
            &cfg,
        );
        assert_eq!(calls.get(), 7);
        assert_eq!(series.len(), 3);
        assert_eq!(series.stats().max, Duration::from_millis(2));
    }

    #[test]
    fn disabled_warmup_skips_calls() {
        let calls = Cell::new(0usize);
        let cfg = BenchmarkConfig {
            min_iterations: 2,
            max_iterations: 2,
            warmup_iterations: 10,
            warmup_enabled: false,
            ..Default::default()
        };
        sample(
            || {
                calls.set(calls.get() + 1);
                Duration::from_millis(1)
            },
            &cfg,
        );
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn all_failures_stop_at_min() {
        let cfg = BenchmarkConfig {
            min_iterations: 5,
            max_iterations: 100,
            warmup_enabled: false,
            ..Default::default()
        };
        let series = sample(|| Duration::ZERO, &cfg);
        assert_eq!(series.len(), 5);
        assert_eq!(series.failures(), 5);
        assert_eq!(series.stats().mean, Duration::ZERO);
    }

    #[test]
    fn time_op_maps_errors_to_zero() {
        let d = time_op(|| Err::<(), _>("boom"));
        assert_eq!(d, Duration::ZERO);
        let d = time_op(|| {
            thread::sleep(Duration::from_millis(1));
            Ok::<_, String>(())
        });
        assert!(d >= Duration::from_millis(1));
    }

    #[test]
    fn instant_success_is_never_the_failure_sentinel() {
        for _ in 0..1_000 {
            assert!(time_op(|| Ok::<_, String>(())) >= Duration::from_nanos(1));
        }
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        let cfg = BenchmarkConfig {
            min_iterations: 10,
            max_iterations: 5,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(BenchError::InvalidConfig { .. })));

        let cfg = BenchmarkConfig {
            target_cv: -1.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        assert!(BenchmarkConfig::default().validate().is_ok());
        assert!(Profile::Full.cli().validate().is_ok());
        assert!(Profile::Full.in_process().validate().is_ok());
    }
}
