//! Error types for the benchmark harness.
//!
//! Only configuration and setup problems are surfaced as errors. Failed
//! measurements become unsuccessful [`BenchmarkResult`](crate::schema::BenchmarkResult)s
//! and failed memory probes degrade to zeroed metrics.

use thiserror::Error;

/// Primary error type for `toolcall_bench` operations.
#[derive(Error, Debug)]
pub enum BenchError {
    /// A sampler configuration violates its invariants.
    #[error("Invalid benchmark config: {reason}")]
    InvalidConfig { reason: String },

    /// The system under test could not be brought up.
    #[error("Setup failed during {stage}: {message}")]
    Setup {
        stage: &'static str,
        message: String,
    },

    /// The OS memory probe could not be run on this platform.
    #[error("Process memory probe unavailable: {reason}")]
    ProbeUnavailable { reason: String },

    /// The OS memory probe ran but produced output we could not read.
    #[error("Could not parse process memory probe output: {reason}")]
    ProbeParse { reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BenchError {
    pub(crate) fn setup(stage: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Setup {
            stage,
            message: err.to_string(),
        }
    }

    /// Whether the error came from the best-effort memory probe.
    pub fn is_probe_failure(&self) -> bool {
        matches!(
            self,
            Self::ProbeUnavailable { .. } | Self::ProbeParse { .. }
        )
    }
}

/// Result alias for harness operations.
pub type Result<T> = std::result::Result<T, BenchError>;
