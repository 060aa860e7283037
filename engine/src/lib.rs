//! # Ferry Engine - Backup Orchestration Library
//!
//! A headless engine that runs declarative backup and mirroring jobs against
//! remote servers by driving `ssh`, `scp`, `tar` and `rsync`.
//! Designed so the terminal front end only supplies a runner, a progress
//! factory and an observer.
//!
//! ## Overview
//!
//! A run reads one configuration document with server profiles and two job
//! lists:
//! - archive jobs (`compress_and_copy`): tar a tree, then scp the archive
//! - mirror jobs (`sync`): rsync a tree with a live progress indicator
//!
//! Every job is probed for liveness first; unreachable servers skip the job
//! and the run carries on. Direction comes from the `remote:` marker on
//! either path.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{Config, Orchestrator, SystemRunner, TerminalProgress};
//! # use engine::{JobRef, JobReport, SkipReason, Invocation, RunObserver};
//! # struct Quiet;
//! # impl RunObserver for Quiet {
//! #     fn on_job_started(&self, _: &JobRef, _: &str) {}
//! #     fn on_command(&self, _: &JobRef, _: &Invocation) {}
//! #     fn on_output(&self, _: &JobRef, _: &[u8]) {}
//! #     fn on_job_skipped(&self, _: &JobRef, _: &str, _: &SkipReason) {}
//! #     fn on_job_completed(&self, _: &JobRef, _: &JobReport) {}
//! # }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("./config.yml")?;
//!
//! let runner = SystemRunner;
//! let progress = TerminalProgress::default();
//! let summary = Orchestrator::new(&config, &runner, &progress, &Quiet).run();
//!
//! println!("{} done, {} skipped", summary.done(), summary.skipped());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (ServerProfile, jobs, JobState, reports)
//! - **config**: Configuration loading (YAML or TOML)
//! - **error**: Error types and handling
//! - **direction**: Transfer direction from the `remote:` marker
//! - **command**: Command synthesis and shell quoting
//! - **process**: Running external programs
//! - **probe**: Host liveness probing
//! - **parser**: Streaming progress record parser
//! - **estimator**: Transfer size prediction
//! - **progress**: Progress indicator and run observer traits
//! - **job**: Job orchestration

pub mod command;
pub mod config;
pub mod direction;
pub mod error;
pub mod estimator;
pub mod job;
pub mod model;
pub mod parser;
pub mod probe;
pub mod process;
pub mod progress;

// Re-export main types and functions
pub use command::Invocation;
pub use config::{Config, DEFAULT_CONFIG_PATH};
pub use direction::{resolve, Direction, ResolvedPaths};
pub use error::EngineError;
pub use job::Orchestrator;
pub use model::{
    ArchiveJob, JobKind, JobRef, JobReport, JobState, MirrorJob, RunSummary, ServerProfile,
    SkipReason, Verbosity,
};
pub use process::{CommandRunner, SystemRunner};
pub use progress::{ProgressFactory, ProgressIndicator, RunObserver, TerminalProgress};
pub use uuid::Uuid;
