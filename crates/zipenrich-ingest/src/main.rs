//! zipenrich - enrich a group's archives with reference data

use anyhow::Context;
use clap::Parser;
use std::process;
use tracing::{error, warn};
use zipenrich_common::logging::{init_logging, LogConfig, LogLevel};
use zipenrich_ingest::{BarReporter, NoopReporter, Pipeline, PipelineConfig, ProgressReporter};

#[derive(Parser, Debug)]
#[command(name = "zipenrich")]
#[command(version, about = "Enrich group archives on the remote store with dob/email", long_about = None)]
struct Cli {
    /// Group identifier; archives whose name contains it are processed
    group_id: String,

    /// Accepted for compatibility; processing is always sequential
    #[arg(long)]
    parallel: bool,

    /// Debug logging and a line per upload
    #[arg(short, long)]
    verbose: bool,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,
}

fn main() {
    let cli = Cli::parse();

    // LOG_* variables first, then the flag on top
    let mut log_config = match LogConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid logging configuration: {}", e);
            process::exit(2);
        },
    };
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        },
    };

    if let Err(e) = execute(&cli) {
        error!(error = %e, "Run failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn execute(cli: &Cli) -> anyhow::Result<()> {
    if cli.parallel {
        warn!("Parallel processing is disabled; archives are processed sequentially");
    }

    let config = PipelineConfig::from_env().context("Failed to load configuration")?;

    let reporter: Box<dyn ProgressReporter> = if cli.no_progress {
        Box::new(NoopReporter)
    } else {
        Box::new(BarReporter::new())
    };

    let mut pipeline = Pipeline::new(config).with_reporter(reporter).verbose(cli.verbose);
    // Per-file failures and the run summary are logged by the pipeline
    pipeline
        .run_live(&cli.group_id)
        .with_context(|| format!("Run for group {} aborted", cli.group_id))?;

    Ok(())
}
