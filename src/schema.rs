//! Report records. Every duration serializes as integer nanoseconds under a
//! `*_ns` key so reports from different runs diff cleanly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stats::Stats;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub bench_version: String,
    pub profile: String,
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
    pub os: String,
    pub arch: String,
    pub cpus: usize,
}

impl RunMeta {
    pub fn capture(profile: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            bench_version: env!("CARGO_PKG_VERSION").to_string(),
            profile: profile.to_string(),
            timestamp_utc: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            git_sha: git_sha_short(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpus: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

fn git_sha_short() -> Option<String> {
    // Set by CI/build scripts.
    std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .map(|s| s.chars().take(12).collect())
}

/// Outcome of one named benchmark. Built once, then only read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub name: String,
    pub category: String,

    #[serde(rename = "duration_ns", with = "duration_ns")]
    pub duration: Duration,
    #[serde(rename = "min_duration_ns", with = "duration_ns")]
    pub min_duration: Duration,
    #[serde(rename = "max_duration_ns", with = "duration_ns")]
    pub max_duration: Duration,
    #[serde(rename = "std_dev_ns", with = "duration_ns")]
    pub std_dev: Duration,
    pub iterations: usize,

    pub success: bool,
    pub error: Option<String>,

    #[serde(rename = "traditional_mean_ns", with = "opt_duration_ns")]
    pub traditional_mean: Option<Duration>,
    #[serde(rename = "traditional_min_ns", with = "opt_duration_ns")]
    pub traditional_min: Option<Duration>,
    #[serde(rename = "traditional_max_ns", with = "opt_duration_ns")]
    pub traditional_max: Option<Duration>,
    pub speedup_factor: f64,
    pub comparison_note: String,

    pub items_found: Option<u64>,
    pub bytes_processed: Option<u64>,
    pub memory: Option<MemoryMetrics>,
}

impl BenchmarkResult {
    pub(crate) fn from_stats(name: &str, category: &str, stats: &Stats) -> Self {
        Self {
            name: name.to_string(),
            category: category.to_string(),
            duration: stats.mean,
            min_duration: stats.min,
            max_duration: stats.max,
            std_dev: stats.std_dev,
            iterations: stats.count,
            success: true,
            ..Default::default()
        }
    }

    pub(crate) fn with_baseline(mut self, baseline: &Stats) -> Self {
        self.traditional_mean = Some(baseline.mean);
        self.traditional_min = Some(baseline.min);
        self.traditional_max = Some(baseline.max);
        self
    }

    pub(crate) fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self.speedup_factor = 0.0;
        self
    }

    /// Row for a benchmark that could not be measured at all.
    pub fn failure(name: &str, category: &str, error: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            category: category.to_string(),
            ..Default::default()
        }
        .failed(error)
    }

    /// Attach payload counts gathered by the caller.
    pub fn with_payload(mut self, items_found: Option<u64>, bytes_processed: Option<u64>) -> Self {
        self.items_found = items_found;
        self.bytes_processed = bytes_processed;
        self
    }
}

/// Whether OS-level process memory was read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ProbeStatus {
    Collected,
    Unavailable(String),
    #[default]
    NotRequested,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    /// Live heap bytes seen by the tracking allocator.
    pub heap_allocated: u64,
    pub heap_peak: u64,
    pub allocation_count: u64,
    pub deallocation_count: u64,
    pub thread_count: u64,

    /// Resident set size of the probed process, bytes.
    pub process_rss: u64,
    /// Virtual size of the probed process, bytes.
    pub process_vsz: u64,
    pub process_probe: ProbeStatus,
}

impl MemoryMetrics {
    /// True when no figure at all was collected.
    pub fn is_all_zero(&self) -> bool {
        self.heap_allocated == 0
            && self.heap_peak == 0
            && self.allocation_count == 0
            && self.deallocation_count == 0
            && self.thread_count == 0
            && self.process_rss == 0
            && self.process_vsz == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakEvenBounds {
    /// Break-even using `warm - σ` and `baseline + σ`.
    pub optimistic: i64,
    /// Break-even using `warm + σ` and `baseline - σ`.
    pub pessimistic: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColdStartMetrics {
    #[serde(rename = "server_startup_time_ns", with = "duration_ns")]
    pub server_startup_time: Duration,
    #[serde(rename = "first_query_time_ns", with = "duration_ns")]
    pub first_query_time: Duration,
    #[serde(rename = "average_warm_query_time_ns", with = "duration_ns")]
    pub average_warm_query_time: Duration,
    /// Positive when the server eventually pays off, `-1` when it never does.
    pub break_even_operations: i64,
    pub break_even_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_even_bounds: Option<BreakEvenBounds>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    #[serde(rename = "average_duration_ns", with = "duration_ns")]
    pub average_duration: Duration,
    pub total_items_found: u64,
    pub speedup_range: String,
}

pub(crate) mod duration_ns {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_nanos)
    }
}

pub(crate) mod opt_duration_ns {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => super::duration_ns::serialize(d, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|v| v.map(Duration::from_nanos))
    }
}
