use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use toolcall_bench::coldstart::{analyze_cold_start, ColdStartConfig, COLD_START_CATEGORY};
use toolcall_bench::compare::{compare, BenchmarkId, ComparisonConfig};
use toolcall_bench::harness::{BenchmarkConfig, Profile};
use toolcall_bench::logging::init_logging;
use toolcall_bench::memory::TrackingAllocator;
use toolcall_bench::schema::{BenchmarkResult, RunMeta};
use toolcall_bench::subject::{CommandOp, LineServer};
use toolcall_bench::suite::BenchmarkSuite;
use tracing::{error, info, warn};

#[global_allocator]
static ALLOC: TrackingAllocator = TrackingAllocator;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProfileArg {
    Quick,
    Full,
}

impl From<ProfileArg> for Profile {
    fn from(v: ProfileArg) -> Self {
        match v {
            ProfileArg::Quick => Profile::Quick,
            ProfileArg::Full => Profile::Full,
        }
    }
}

/// Overrides applied on top of the profile's presets, for both sides.
#[derive(ClapArgs, Debug, Default)]
struct SamplerArgs {
    #[arg(long, global = true)]
    min_iterations: Option<usize>,

    #[arg(long, global = true)]
    max_iterations: Option<usize>,

    /// Coefficient of variation (percent) at which sampling stops.
    #[arg(long, global = true)]
    target_cv: Option<f64>,

    #[arg(long, global = true)]
    warmup_iterations: Option<usize>,

    #[arg(long, default_value_t = false, global = true)]
    no_warmup: bool,

    /// Always run exactly --min-iterations samples.
    #[arg(long, default_value_t = false, global = true)]
    fixed: bool,
}

impl SamplerArgs {
    fn apply(&self, mut cfg: BenchmarkConfig) -> anyhow::Result<BenchmarkConfig> {
        if let Some(v) = self.min_iterations {
            cfg.min_iterations = v;
            cfg.max_iterations = cfg.max_iterations.max(v);
        }
        if let Some(v) = self.max_iterations {
            cfg.max_iterations = v;
        }
        if let Some(v) = self.target_cv {
            cfg.target_cv = v;
        }
        if let Some(v) = self.warmup_iterations {
            cfg.warmup_iterations = v;
        }
        if self.no_warmup {
            cfg.warmup_enabled = false;
        }
        if self.fixed {
            cfg.adaptive_enabled = false;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare two one-shot commands (baseline vs candidate).
    Compare {
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "comparison")]
        category: String,

        /// Baseline command line, split on whitespace.
        #[arg(long, value_name = "CMD")]
        baseline: String,

        /// Candidate command line, split on whitespace.
        #[arg(long, value_name = "CMD")]
        candidate: String,
    },

    /// Measure a line-protocol server's startup and its break-even point
    /// against a one-shot baseline command.
    ColdStart {
        #[arg(long, default_value = "cold_start")]
        name: String,

        /// Server command line, split on whitespace.
        #[arg(long, value_name = "CMD")]
        server: String,

        /// Request line sent for every query.
        #[arg(long)]
        request: String,

        /// Baseline command line, split on whitespace.
        #[arg(long, value_name = "CMD")]
        baseline: String,

        /// Report break-even bounds using one standard deviation.
        #[arg(long, default_value_t = false)]
        bounds: bool,
    },
}

#[derive(Parser, Debug)]
#[command(name = "toolcall-bench")]
#[command(about = "Adaptive server-vs-CLI benchmark runner (JSON output)")]
struct Args {
    #[arg(long, value_enum, default_value_t = ProfileArg::Quick, global = true)]
    profile: ProfileArg,

    /// Where to write the JSON report. If omitted, prints to stdout.
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(flatten)]
    sampler: SamplerArgs,

    #[command(subcommand)]
    cmd: Command,
}

fn argv(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if let Err(e) = init_logging(args.verbose, args.quiet, args.log_json) {
        eprintln!("{e:#}");
    }

    let profile: Profile = args.profile.into();
    let baseline_cfg = args.sampler.apply(profile.cli())?;
    let candidate_cfg = args.sampler.apply(profile.in_process())?;

    let mut results = Vec::new();
    let mut cold_start = None;

    match &args.cmd {
        Command::Compare {
            name,
            category,
            baseline,
            candidate,
        } => {
            let mut base = CommandOp::new(&argv(baseline)).context("invalid --baseline")?;
            let mut cand = CommandOp::new(&argv(candidate)).context("invalid --candidate")?;
            let cfg = ComparisonConfig {
                baseline: baseline_cfg,
                // The candidate is a process spawn here too.
                candidate: args.sampler.apply(profile.cli())?,
            };
            let result = compare(
                &BenchmarkId::new(name, category),
                || base.run(),
                || cand.run(),
                &cfg,
            );
            let bytes = cand.last_output_bytes();
            results.push(result.with_payload(None, Some(bytes)));
        }
        Command::ColdStart {
            name,
            server,
            request,
            baseline,
            bounds,
        } => {
            let mut target = LineServer::new(&argv(server), request.clone()).context("invalid --server")?;
            let mut base = CommandOp::new(&argv(baseline)).context("invalid --baseline")?;
            let cfg = ColdStartConfig {
                warm: candidate_cfg,
                baseline: baseline_cfg,
                propagate_std_dev: *bounds,
            };
            match analyze_cold_start(&mut target, || base.run(), &cfg) {
                Ok(report) => {
                    let bytes = target.last_response_bytes();
                    results.push(report.to_result(name).with_payload(None, Some(bytes)));
                    cold_start = Some(report.metrics);
                }
                Err(e) => {
                    error!(error = %e, "cold-start analysis failed");
                    results.push(BenchmarkResult::failure(name, COLD_START_CATEGORY, e.to_string()));
                }
            }
            target.shutdown();
        }
    }

    let suite = BenchmarkSuite::build(RunMeta::capture(profile.as_str()), results, cold_start);
    for w in &suite.warnings {
        warn!("{w}");
    }
    info!(
        total = suite.summary.total,
        failed = suite.summary.failed,
        speedup = %suite.summary.speedup_range,
        "suite finished"
    );

    let json = suite.to_json()?;
    if let Some(out) = args.out {
        fs::write(&out, json).with_context(|| format!("writing {}", out.display()))?;
    } else {
        println!("{json}");
    }

    Ok(())
}
