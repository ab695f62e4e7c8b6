//! Adaptive benchmark harness for comparing a long-running server's tool
//! calls against equivalent one-shot CLI invocations.
//!
//! Operations are plain `FnMut() -> Duration` closures; a zero duration marks
//! a failed attempt. [`harness::sample`] decides how many times to run one,
//! [`compare::compare`] turns two runs into a speedup, and
//! [`coldstart::analyze_cold_start`] works out when a server's startup cost
//! pays for itself.

pub mod coldstart;
pub mod compare;
pub mod error;
pub mod harness;
pub mod logging;
pub mod memory;
pub mod schema;
pub mod stats;
pub mod subject;
pub mod suite;

pub use coldstart::{analyze_cold_start, break_even, ColdStartConfig, ColdStartReport, ColdStartTarget};
pub use compare::{compare, BenchmarkId, ComparisonConfig};
pub use error::{BenchError, Result};
pub use harness::{sample, time_op, BenchmarkConfig, Profile, SampleSeries};
pub use schema::{BenchmarkResult, ColdStartMetrics, MemoryMetrics, RunMeta, Summary};
pub use stats::{compute_stats, Stats};
pub use suite::{summarize, validate, BenchmarkSuite, ValidationWarning};
