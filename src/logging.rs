//! Logging setup. Everything goes to stderr so the JSON report on stdout
//! stays machine-readable.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the flags. Otherwise `-q` gives errors only, no flag
/// gives warnings, `-v` info, `-vv` debug and `-vvv` trace.
pub fn init_logging(verbose: u8, quiet: bool, json: bool) -> anyhow::Result<()> {
    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("toolcall_bench={default_level}")));

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

/// Test subscriber; repeated calls are harmless.
pub fn init_test_logging() {
    let _ = fmt()
        .with_env_filter("toolcall_bench=debug")
        .with_test_writer()
        .try_init();
}
