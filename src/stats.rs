//! Summary statistics over a series of timing samples.
//!
//! [`RunningStats`] keeps a Welford accumulator so the sampler can ask for a
//! fresh [`Stats`] snapshot after every sample without rescanning the series.

use std::time::Duration;

/// Read-only snapshot over a sample series.
///
/// `count == 0` means "no data"; the zero mean is not a measurement.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Stats {
    pub mean: Duration,
    pub min: Duration,
    pub max: Duration,
    /// Population standard deviation.
    pub std_dev: Duration,
    pub count: usize,
}

impl Stats {
    /// Coefficient of variation in percent. Zero when the mean is zero.
    pub fn cv_percent(&self) -> f64 {
        let mean = self.mean.as_secs_f64();
        if mean == 0.0 {
            return 0.0;
        }
        100.0 * self.std_dev.as_secs_f64() / mean
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Incremental aggregate: count, min, max, mean and the sum of squared
/// deviations (`m2`), all in nanoseconds.
#[derive(Clone, Debug, Default)]
pub struct RunningStats {
    count: usize,
    mean_ns: f64,
    m2: f64,
    min: Duration,
    max: Duration,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: Duration) {
        let x = sample.as_nanos() as f64;
        if self.count == 0 {
            self.min = sample;
            self.max = sample;
        } else {
            self.min = self.min.min(sample);
            self.max = self.max.max(sample);
        }
        self.count += 1;
        let delta = x - self.mean_ns;
        self.mean_ns += delta / self.count as f64;
        self.m2 += delta * (x - self.mean_ns);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Coefficient of variation in percent, computed at full precision.
    pub fn cv_percent(&self) -> f64 {
        if self.mean_ns == 0.0 {
            return 0.0;
        }
        100.0 * self.std_dev_ns() / self.mean_ns
    }

    fn std_dev_ns(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        (self.m2.max(0.0) / self.count as f64).sqrt()
    }

    pub fn stats(&self) -> Stats {
        if self.count == 0 {
            return Stats::default();
        }
        // Rounding the mean can push it a nanosecond past an extreme.
        let mean = nanos(self.mean_ns).clamp(self.min, self.max);
        Stats {
            mean,
            min: self.min,
            max: self.max,
            std_dev: nanos(self.std_dev_ns()),
            count: self.count,
        }
    }
}

impl Extend<Duration> for RunningStats {
    fn extend<I: IntoIterator<Item = Duration>>(&mut self, iter: I) {
        for d in iter {
            self.push(d);
        }
    }
}

fn nanos(ns: f64) -> Duration {
    if !ns.is_finite() || ns <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(ns.round() as u64)
}

/// Compute statistics over a complete series.
pub fn compute_stats(series: &[Duration]) -> Stats {
    let mut acc = RunningStats::new();
    acc.extend(series.iter().copied());
    acc.stats()
}
