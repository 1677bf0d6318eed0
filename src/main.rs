// src/main.rs
//
// Thin harness around the adaptfx library.
// All of the real logic lives in the lib crate (engine, course, prior).
// Results go to stdout as JSON; logs go to stderr.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use adaptfx::config::parse_strategy;
use adaptfx::{
    fit_prior, single_session, Config, CourseRunner, FixedBelief, JsonlSink, NoopSink, PlanSink,
};

/// Command-line arguments for the adaptfx binary.
#[derive(Parser, Debug)]
#[command(name = "adaptfx", version, about)]
struct Cli {
    /// JSON config file. Without it, defaults plus ADAPTFX_* env overrides.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Strategy override: oar_bound | min_oar (aliases accepted).
    #[arg(long, global = true)]
    strategy: Option<String>,

    /// Use a fixed sparing-factor belief instead of the prior (needs both).
    #[arg(long, global = true, requires = "fixed_std")]
    fixed_mean: Option<f64>,

    #[arg(long, global = true, requires = "fixed_mean")]
    fixed_std: Option<f64>,

    /// Debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate a full course from the planning observation plus one
    /// sparing factor per session.
    Course {
        #[arg(long, value_delimiter = ',', required = true)]
        sparing_factors: Vec<f64>,

        /// Optional JSONL path for per-session telemetry.
        #[arg(long)]
        log_jsonl: Option<PathBuf>,
    },

    /// Decide the dose for the latest session in the history.
    Session {
        #[arg(long, value_delimiter = ',', required = true)]
        sparing_factors: Vec<f64>,

        /// Tumor BED accumulated before this session.
        #[arg(long, default_value_t = 0.0)]
        acc_tumor: f64,

        /// OAR BED accumulated before this session.
        #[arg(long, default_value_t = 0.0)]
        acc_oar: f64,
    },

    /// Fit the inverse-gamma prior to a cohort (JSON array of per-patient
    /// sparing-factor arrays).
    FitPrior {
        #[arg(long)]
        cohort: PathBuf,
    },
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("installing log subscriber")
}

/// Build the telemetry sink as a trait object so we can choose between
/// JsonlSink and NoopSink at runtime.
fn build_sink(log_jsonl: Option<&PathBuf>) -> Box<dyn PlanSink> {
    match log_jsonl {
        Some(path) => match JsonlSink::create(path) {
            Ok(s) => Box::new(s),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to create log file, falling back to NoopSink"
                );
                Box::new(NoopSink)
            }
        },
        None => Box::new(NoopSink),
    }
}

/// Config file (or defaults + env), then CLI overrides, then validation.
fn build_config(cli: &Cli) -> Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::from_env_or_default(),
    };

    if let Some(raw) = &cli.strategy {
        match parse_strategy(raw) {
            Some(s) => cfg.strategy = s,
            None => bail!("unknown strategy {raw:?}"),
        }
    }

    if let (Some(mean), Some(std)) = (cli.fixed_mean, cli.fixed_std) {
        cfg.belief_override = Some(FixedBelief { mean, std });
    }

    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("serialising output")?;
    println!("{out}");
    Ok(())
}

fn main() -> Result<()> {
    // 0) Parse CLI args.
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match &cli.command {
        Command::Course {
            sparing_factors,
            log_jsonl,
        } => {
            let cfg = build_config(&cli)?;
            let sink = build_sink(log_jsonl.as_ref());
            let mut runner = CourseRunner::with_sink(&cfg, sink)?;
            let plan = runner.run(sparing_factors)?;
            tracing::info!(
                tumor = plan.total_tumor_bed(),
                oar = plan.total_oar_bed(),
                "course finished"
            );
            print_json(&plan)
        }
        Command::Session {
            sparing_factors,
            acc_tumor,
            acc_oar,
        } => {
            let cfg = build_config(&cli)?;
            let decision = single_session(&cfg, sparing_factors, *acc_tumor, *acc_oar)?;
            print_json(&decision)
        }
        Command::FitPrior { cohort } => {
            let raw = std::fs::read_to_string(cohort)
                .with_context(|| format!("reading cohort {}", cohort.display()))?;
            let rows: Vec<Vec<f64>> =
                serde_json::from_str(&raw).context("cohort must be a JSON array of arrays")?;
            let fit = fit_prior(&rows)?;
            print_json(&fit)
        }
    }
}
