//! Memory figures for the harness process and for a spawned server.
//!
//! Heap counters come from [`TrackingAllocator`], which a binary opts into
//! with `#[global_allocator]`. Without it the heap fields stay zero. OS-level
//! RSS/VSZ is read with `ps` and is strictly best effort.

use std::alloc::{GlobalAlloc, Layout, System};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::error::{BenchError, Result};
use crate::schema::{MemoryMetrics, ProbeStatus};

static LIVE_BYTES: AtomicU64 = AtomicU64::new(0);
static PEAK_BYTES: AtomicU64 = AtomicU64::new(0);
static ALLOCATIONS: AtomicU64 = AtomicU64::new(0);
static DEALLOCATIONS: AtomicU64 = AtomicU64::new(0);

/// Counting wrapper around the system allocator.
pub struct TrackingAllocator;

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        record_dealloc(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new = unsafe { System.realloc(ptr, layout, new_size) };
        if !new.is_null() {
            record_dealloc(layout.size());
            record_alloc(new_size);
        }
        new
    }
}

fn record_alloc(size: usize) {
    ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
    let live = LIVE_BYTES.fetch_add(size as u64, Ordering::Relaxed) + size as u64;
    PEAK_BYTES.fetch_max(live, Ordering::Relaxed);
}

fn record_dealloc(size: usize) {
    DEALLOCATIONS.fetch_add(1, Ordering::Relaxed);
    LIVE_BYTES.fetch_sub(size as u64, Ordering::Relaxed);
}

/// Resident and virtual size of a process, in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessMemory {
    pub rss: u64,
    pub vsz: u64,
}

/// Outcome of a best-effort OS probe. Keeps "could not read" apart from
/// "read and it was zero".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessProbe {
    Collected(ProcessMemory),
    Unavailable(String),
}

/// Snapshot of in-process figures. Process RSS/VSZ are left unset.
pub fn capture_memory() -> MemoryMetrics {
    MemoryMetrics {
        heap_allocated: LIVE_BYTES.load(Ordering::Relaxed),
        heap_peak: PEAK_BYTES.load(Ordering::Relaxed),
        allocation_count: ALLOCATIONS.load(Ordering::Relaxed),
        deallocation_count: DEALLOCATIONS.load(Ordering::Relaxed),
        thread_count: thread_count(),
        ..Default::default()
    }
}

/// In-process snapshot plus best-effort RSS/VSZ for `pid`.
pub fn capture_with_process(pid: Option<u32>) -> MemoryMetrics {
    let mut metrics = capture_memory();
    let Some(pid) = pid else {
        return metrics;
    };
    match probe_process(pid) {
        ProcessProbe::Collected(mem) => {
            metrics.process_rss = mem.rss;
            metrics.process_vsz = mem.vsz;
            metrics.process_probe = ProbeStatus::Collected;
        }
        ProcessProbe::Unavailable(reason) => {
            metrics.process_probe = ProbeStatus::Unavailable(reason);
        }
    }
    metrics
}

pub fn probe_process(pid: u32) -> ProcessProbe {
    match capture_process_memory(pid) {
        Ok(mem) => ProcessProbe::Collected(mem),
        Err(e) => {
            warn!(pid, error = %e, "process memory probe failed; leaving RSS/VSZ at zero");
            ProcessProbe::Unavailable(e.to_string())
        }
    }
}

/// Run `ps -o rss,vsz -p <pid>` and convert its kilobyte columns to bytes.
pub fn capture_process_memory(pid: u32) -> Result<ProcessMemory> {
    if cfg!(windows) {
        return Err(BenchError::ProbeUnavailable {
            reason: "ps is not available on windows".to_string(),
        });
    }
    let output = Command::new("ps")
        .args(["-o", "rss,vsz", "-p", &pid.to_string()])
        .output()
        .map_err(|e| BenchError::ProbeUnavailable {
            reason: format!("failed to run ps: {e}"),
        })?;
    if !output.status.success() {
        return Err(BenchError::ProbeUnavailable {
            reason: format!("ps exited with {} for pid {pid}", output.status),
        });
    }
    let mem = parse_ps_output(&String::from_utf8_lossy(&output.stdout))?;
    debug!(pid, rss = mem.rss, vsz = mem.vsz, "process memory");
    Ok(mem)
}

/// Parse `ps -o rss,vsz` output: a header line, then `RSS VSZ` in KiB.
pub fn parse_ps_output(output: &str) -> Result<ProcessMemory> {
    let line = output
        .lines()
        .nth(1)
        .ok_or_else(|| BenchError::ProbeParse {
            reason: "missing data line".to_string(),
        })?;
    let mut fields = line.split_whitespace();
    let mut next_kib = |column: &str| -> Result<u64> {
        let raw = fields.next().ok_or_else(|| BenchError::ProbeParse {
            reason: format!("missing {column} column in {line:?}"),
        })?;
        raw.parse::<u64>()
            .map(|kib| kib.saturating_mul(1024))
            .map_err(|e| BenchError::ProbeParse {
                reason: format!("bad {column} value {raw:?}: {e}"),
            })
    };
    let rss = next_kib("RSS")?;
    let vsz = next_kib("VSZ")?;
    Ok(ProcessMemory { rss, vsz })
}

#[cfg(target_os = "linux")]
fn thread_count() -> u64 {
    std::fs::read_dir("/proc/self/task")
        .map(|dir| dir.count() as u64)
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn thread_count() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kib_columns() {
        let out = "  RSS    VSZ\n 1024 409600\n";
        let mem = parse_ps_output(out).unwrap();
        assert_eq!(mem.rss, 1024 * 1024);
        assert_eq!(mem.vsz, 409_600 * 1024);
    }

    #[test]
    fn header_only_is_an_error() {
        let err = parse_ps_output("  RSS    VSZ\n").unwrap_err();
        assert!(err.is_probe_failure());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_ps_output("RSS VSZ\nabc 12\n").is_err());
        assert!(parse_ps_output("RSS VSZ\n12\n").is_err());
        assert!(parse_ps_output("").is_err());
    }

    #[test]
    fn missing_pid_leaves_probe_unrequested() {
        let m = capture_with_process(None);
        assert_eq!(m.process_probe, ProbeStatus::NotRequested);
        assert_eq!(m.process_rss, 0);
    }

    #[cfg(unix)]
    #[test]
    fn probes_own_process() {
        // Best effort: minimal containers may not ship ps.
        match probe_process(std::process::id()) {
            ProcessProbe::Collected(mem) => assert!(mem.rss > 0),
            ProcessProbe::Unavailable(reason) => assert!(!reason.is_empty()),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn counts_threads() {
        assert!(capture_memory().thread_count >= 1);
    }
}
