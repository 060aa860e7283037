//! Ferry - Command-line front end for the backup orchestration engine.
//!
//! Loads one configuration document, runs every job in it and prints the
//! `>> [N] ...` diagnostics to stdout. Progress bars and logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use engine::{
    Config, Invocation, JobRef, JobReport, JobState, Orchestrator, RunObserver, RunSummary,
    SkipReason, SystemRunner, TerminalProgress, DEFAULT_CONFIG_PATH,
};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Ferry - declarative backups over ssh, scp, tar and rsync
#[derive(Parser, Debug)]
#[command(name = "ferry")]
#[command(version)]
#[command(about = "Run the archive and mirror jobs declared in a configuration file")]
struct Args {
    /// Path to the configuration file (.yml, or .toml)
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

/// Prints run diagnostics to stdout
struct CliObserver;

fn started_line(job: &JobRef, description: &str) -> String {
    format!(">> {} {}:", job, description)
}

fn command_line(job: &JobRef, invocation: &Invocation) -> String {
    format!(">> {} RUN: {}", job, invocation)
}

fn skipped_line(job: &JobRef, server: &str, reason: &SkipReason) -> String {
    format!(">> {} Skipping, {} ({})", job, reason, server)
}

fn completed_line(job: &JobRef, report: &JobReport) -> String {
    match (&report.state, &report.failure) {
        (JobState::Failed, Some(reason)) => format!(">> {} FAILED: {}", job, reason),
        (JobState::Failed, None) => format!(">> {} FAILED", job),
        _ => format!(">> {} DONE!", job),
    }
}

impl RunObserver for CliObserver {
    fn on_job_started(&self, job: &JobRef, description: &str) {
        println!("{}", started_line(job, description));
    }

    fn on_command(&self, job: &JobRef, invocation: &Invocation) {
        println!("{}", command_line(job, invocation));
    }

    fn on_output(&self, _job: &JobRef, chunk: &[u8]) {
        let mut stdout = io::stdout().lock();
        // Losing echoed output is not worth aborting a transfer over
        let _ = stdout.write_all(chunk);
        let _ = stdout.flush();
    }

    fn on_job_skipped(&self, job: &JobRef, server: &str, reason: &SkipReason) {
        println!("{}", skipped_line(job, server, reason));
    }

    fn on_job_completed(&self, job: &JobRef, report: &JobReport) {
        println!("{}", completed_line(job, report));
    }
}

/// Install the stderr log subscriber (`RUST_LOG` overrides the `warn` default).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Parse arguments, then run every configured job
fn main() {
    init_tracing();
    let args = Args::parse();

    // Only configuration problems are fatal; job outcomes never change the exit code
    let exit_code = match run_cli(&args) {
        Ok(summary) => {
            eprintln!(
                "Summary: {} done, {} skipped, {} failed",
                summary.done(),
                summary.skipped(),
                summary.failed()
            );
            0
        }
        Err(e) => {
            debug!(error = %format!("{:#}", e), "configuration rejected");
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args) -> Result<RunSummary> {
    debug!(path = %args.config.display(), "loading configuration");
    let config = Config::load(&args.config)
        .with_context(|| format!("Cannot start with configuration {}", args.config.display()))?;

    let runner = SystemRunner;
    let progress = TerminalProgress {
        hidden: !io::stderr().is_terminal(),
    };

    Ok(Orchestrator::new(&config, &runner, &progress, &CliObserver).run())
}
