//! Suite-level aggregation and advisory validation.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coldstart::COLD_START_CATEGORY;
use crate::schema::{BenchmarkResult, ColdStartMetrics, RunMeta, Summary};

/// Speedups above this usually mean a broken measurement.
pub const IMPLAUSIBLE_SPEEDUP: f64 = 1000.0;

/// Payloads smaller than this (but non-empty) suggest an error response.
pub const SMALL_PAYLOAD_BYTES: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    Failed,
    SmallPayload,
    ImplausibleSpeedup,
    MissingMemory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub benchmark: String,
    pub kind: WarningKind,
    pub message: String,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.benchmark, self.message)
    }
}

/// Counts, average successful duration and the speedup range.
pub fn summarize(results: &[BenchmarkResult]) -> Summary {
    let successful: Vec<&BenchmarkResult> = results.iter().filter(|r| r.success).collect();
    let total_items_found = results.iter().filter_map(|r| r.items_found).sum();

    let average_duration = if successful.is_empty() {
        Duration::ZERO
    } else {
        let total: u128 = successful.iter().map(|r| r.duration.as_nanos()).sum();
        let avg = total / successful.len() as u128;
        Duration::from_nanos(u64::try_from(avg).unwrap_or(u64::MAX))
    };

    Summary {
        total: results.len(),
        successful: successful.len(),
        failed: results.len() - successful.len(),
        average_duration,
        total_items_found,
        speedup_range: speedup_range(results),
    }
}

fn speedup_range(results: &[BenchmarkResult]) -> String {
    let (min, max) = results
        .iter()
        .map(|r| r.speedup_factor)
        .filter(|s| *s != 0.0 && s.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
            (lo.min(s), hi.max(s))
        });
    if min > max {
        return "n/a".to_string();
    }
    format!("{min:.1}x - {max:.1}x")
}

/// Advisory checks. Never fails; every finding is a warning.
pub fn validate(results: &[BenchmarkResult]) -> Vec<ValidationWarning> {
    let mut out = Vec::new();
    for r in results {
        let mut warn = |kind, message: String| {
            out.push(ValidationWarning {
                benchmark: r.name.clone(),
                kind,
                message,
            })
        };

        if !r.success {
            warn(
                WarningKind::Failed,
                format!("failed: {}", r.error.as_deref().unwrap_or("unknown error")),
            );
        }
        if let Some(bytes) = r.bytes_processed.filter(|b| (1..SMALL_PAYLOAD_BYTES).contains(b)) {
            warn(
                WarningKind::SmallPayload,
                format!("only {bytes} bytes processed; the comparison may be measuring an error path"),
            );
        }
        if r.speedup_factor > IMPLAUSIBLE_SPEEDUP {
            warn(
                WarningKind::ImplausibleSpeedup,
                format!(
                    "speedup of {:.0}x is unusually large; verify manually",
                    r.speedup_factor
                ),
            );
        }
        if r.category == COLD_START_CATEGORY && r.memory.as_ref().map_or(true, |m| m.is_all_zero()) {
            warn(
                WarningKind::MissingMemory,
                "memory metrics are all zero; collection likely failed".to_string(),
            );
        }
    }
    out
}

/// Top-level report. Summary and warnings are computed once in [`build`](Self::build).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSuite {
    pub run: RunMeta,
    pub results: Vec<BenchmarkResult>,
    pub summary: Summary,
    pub warnings: Vec<ValidationWarning>,
    pub cold_start: Option<ColdStartMetrics>,
}

impl BenchmarkSuite {
    pub fn build(
        run: RunMeta,
        results: Vec<BenchmarkResult>,
        cold_start: Option<ColdStartMetrics>,
    ) -> Self {
        let summary = summarize(&results);
        let warnings = validate(&results);
        Self {
            run,
            results,
            summary,
            warnings,
            cold_start,
        }
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MemoryMetrics;

    fn ok(name: &str, ms: u64, speedup: f64) -> BenchmarkResult {
        BenchmarkResult {
            name: name.into(),
            category: "lookup".into(),
            duration: Duration::from_millis(ms),
            success: true,
            speedup_factor: speedup,
            ..Default::default()
        }
    }

    #[test]
    fn summary_counts_and_averages() {
        let mut failed = ok("broken", 0, 0.0);
        failed.success = false;
        failed.error = Some("candidate tool failed".into());
        let results = vec![
            ok("a", 10, 4.0).with_payload(Some(3), Some(2048)),
            ok("b", 30, 0.5).with_payload(Some(7), None),
            failed,
        ];
        let s = summarize(&results);
        assert_eq!(s.total, 3);
        assert_eq!(s.successful, 2);
        assert_eq!(s.failed, 1);
        assert_eq!(s.average_duration, Duration::from_millis(20));
        assert_eq!(s.total_items_found, 10);
        assert_eq!(s.speedup_range, "0.5x - 4.0x");
    }

    #[test]
    fn empty_summary() {
        let s = summarize(&[]);
        assert_eq!(s.total, 0);
        assert_eq!(s.average_duration, Duration::ZERO);
        assert_eq!(s.speedup_range, "n/a");
    }

    #[test]
    fn flags_small_payload_and_huge_speedup() {
        let results = vec![
            ok("tiny", 1, 2.0).with_payload(None, Some(50)),
            ok("huge", 1, 5000.0),
            ok("fine", 1, 3.0).with_payload(None, Some(4096)),
            ok("empty", 1, 3.0).with_payload(None, Some(0)),
        ];
        let warnings = validate(&results);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].benchmark, "tiny");
        assert_eq!(warnings[0].kind, WarningKind::SmallPayload);
        assert_eq!(warnings[1].benchmark, "huge");
        assert_eq!(warnings[1].kind, WarningKind::ImplausibleSpeedup);
    }

    #[test]
    fn flags_failures_and_zero_cold_start_memory() {
        let mut failed = ok("broken", 0, 0.0);
        failed.success = false;
        failed.error = Some("baseline tool failed".into());

        let mut cold = ok("startup", 5, 2.0);
        cold.category = COLD_START_CATEGORY.into();
        cold.memory = Some(MemoryMetrics::default());

        let mut cold_ok = cold.clone();
        cold_ok.name = "startup2".into();
        cold_ok.memory = Some(MemoryMetrics {
            process_rss: 4096,
            ..Default::default()
        });

        let warnings = validate(&[failed, cold, cold_ok]);
        let kinds: Vec<_> = warnings.iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WarningKind::Failed, WarningKind::MissingMemory]);
        assert!(warnings[0].to_string().contains("baseline tool failed"));
    }

    #[test]
    fn cold_start_without_memory_is_flagged() {
        let mut cold = ok("startup", 5, 2.0);
        cold.category = COLD_START_CATEGORY.into();
        cold.memory = None;

        let plain = ok("lookup", 5, 2.0);
        let warnings = validate(&[cold, plain]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].benchmark, "startup");
        assert_eq!(warnings[0].kind, WarningKind::MissingMemory);
    }

    #[test]
    fn suite_serializes_stable_keys() {
        let suite = BenchmarkSuite::build(
            RunMeta::capture("quick"),
            vec![ok("a", 2, 1.5)],
            None,
        );
        let v: serde_json::Value = serde_json::from_str(&suite.to_json().unwrap()).unwrap();
        assert_eq!(v["summary"]["total"], 1);
        assert_eq!(v["summary"]["average_duration_ns"], 2_000_000);
        assert_eq!(v["results"][0]["name"], "a");
        assert!(v["cold_start"].is_null());
        assert_eq!(v["run"]["schema_version"], 1);
    }
}
