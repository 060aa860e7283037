//! Job orchestration module.
//!
//! The orchestrator walks the configuration strictly in order: every archive
//! job, then every mirror job. Each job goes
//! Pending → LivenessChecked → (Skipped | Executing → (Done | Failed)).
//! A skipped or failed job never stops the run.

use crate::command::{self, Invocation, MirrorOptions};
use crate::config::Config;
use crate::direction::{self, ResolvedPaths};
use crate::error::EngineError;
use crate::estimator;
use crate::model::{
    ArchiveJob, JobRef, JobReport, JobState, MirrorJob, RunSummary, ServerProfile, SkipReason,
    Verbosity,
};
use crate::parser::ProgressParser;
use crate::probe;
use crate::process::{CommandRunner, CommandStatus, Tee};
use crate::progress::{ObserverOutput, ProgressFactory, RunObserver, SuspendedOutput};
use std::io;
use std::time::Instant;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

/// Description handed to the progress indicator of a mirror job.
const PROGRESS_DESCRIPTION: &str = "syncing";

/// Bookkeeping for one job while it runs.
struct JobExecution {
    id: Uuid,
    job: JobRef,
    server: String,
    state: JobState,
    started: Instant,
    skip_reason: Option<SkipReason>,
    failure: Option<String>,
    units_transferred: u64,
    predicted_units: Option<u64>,
}

impl JobExecution {
    fn new(job: JobRef, server: &str) -> Self {
        JobExecution {
            id: Uuid::new_v4(),
            job,
            server: server.to_string(),
            state: JobState::Pending,
            started: Instant::now(),
            skip_reason: None,
            failure: None,
            units_transferred: 0,
            predicted_units: None,
        }
    }

    fn advance(&mut self, next: JobState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal job transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(job = %self.job, from = ?self.state, to = ?next, "job state change");
        self.state = next;
    }

    fn report(&self) -> JobReport {
        JobReport {
            id: self.id,
            job: self.job,
            server: self.server.clone(),
            state: self.state,
            skip_reason: self.skip_reason.clone(),
            failure: self.failure.clone(),
            units_transferred: self.units_transferred,
            predicted_units: self.predicted_units,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Drives every configured job through probe, synthesis and execution.
pub struct Orchestrator<'a> {
    config: &'a Config,
    runner: &'a dyn CommandRunner,
    progress: &'a dyn ProgressFactory,
    observer: &'a dyn RunObserver,
    timestamp: i64,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator; the archive timestamp is taken now.
    pub fn new(
        config: &'a Config,
        runner: &'a dyn CommandRunner,
        progress: &'a dyn ProgressFactory,
        observer: &'a dyn RunObserver,
    ) -> Self {
        Orchestrator {
            config,
            runner,
            progress,
            observer,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Use a fixed Unix timestamp for archive names.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Run every archive job, then every mirror job, in declaration order.
    ///
    /// Never fails: per-job problems end up in the returned reports.
    pub fn run(&self) -> RunSummary {
        info!(
            archive_jobs = self.config.compress_and_copy.len(),
            mirror_jobs = self.config.sync.len(),
            "starting run"
        );

        let mut summary = RunSummary::default();
        for (index, job) in self.config.compress_and_copy.iter().enumerate() {
            summary.reports.push(self.run_archive_job(JobRef::archive(index + 1), job));
        }
        for (index, job) in self.config.sync.iter().enumerate() {
            summary.reports.push(self.run_mirror_job(JobRef::mirror(index + 1), job));
        }

        info!(
            done = summary.done(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "run finished"
        );
        summary
    }

    /// Compress a tree, then copy the archive (the copy is omitted on dry runs).
    pub fn run_archive_job(&self, job_ref: JobRef, job: &ArchiveJob) -> JobReport {
        let mut exec = JobExecution::new(job_ref, &job.server);
        let span = info_span!("archive_job", job = %job_ref, id = %exec.id);
        let _guard = span.enter();

        let verbosity = Verbosity::effective(self.config.verbose, job.verbose);
        let Some(server) = self.check_liveness(&mut exec, verbosity) else {
            return exec.report();
        };

        let paths = direction::resolve(&job.source, &job.dest);
        exec.advance(JobState::Executing);
        self.observer
            .on_job_started(&job_ref, &describe(&job.log, &paths, server));

        let target = command::archive_target(job, self.timestamp);
        let compress = command::archive_invocation(job, &paths, server, &target);
        if let Err(reason) = self.run_captured(&job_ref, &compress, verbosity) {
            return self.fail(exec, reason);
        }

        if job.dry_run {
            debug!(job = %job_ref, "dry run, copy step omitted");
        } else {
            let copy = command::copy_invocation(&paths, server, &target);
            if let Err(reason) = self.run_captured(&job_ref, &copy, verbosity) {
                return self.fail(exec, reason);
            }
        }

        self.complete(exec)
    }

    /// Estimate, then mirror a tree with live progress.
    pub fn run_mirror_job(&self, job_ref: JobRef, job: &MirrorJob) -> JobReport {
        let mut exec = JobExecution::new(job_ref, &job.server);
        let span = info_span!("mirror_job", job = %job_ref, id = %exec.id);
        let _guard = span.enter();

        let verbosity = Verbosity::effective(self.config.verbose, job.verbose);
        let Some(server) = self.check_liveness(&mut exec, verbosity) else {
            return exec.report();
        };

        let paths = direction::resolve(&job.source, &job.dest);
        exec.advance(JobState::Executing);
        self.observer
            .on_job_started(&job_ref, &describe(&job.log, &paths, server));

        let options = MirrorOptions {
            track_progress: self.config.progress,
            stats: verbosity.streams_output(),
        };
        let live = command::mirror_invocation(job, &paths, server, options);
        if verbosity.echoes_commands() {
            self.observer.on_command(&job_ref, &live);
        }

        let result = if options.track_progress {
            let predicted = estimator::estimate_total(self.runner, &live);
            debug!(job = %job_ref, predicted, "estimated transfer size");
            exec.predicted_units = Some(predicted);

            let indicator = self.progress.create(predicted, PROGRESS_DESCRIPTION);
            let mut parser = ProgressParser::attached(indicator.as_ref());
            let result = if verbosity.streams_output() {
                let echo = SuspendedOutput::new(
                    indicator.as_ref(),
                    ObserverOutput::new(self.observer, job_ref),
                );
                let mut sink = Tee::new(&mut parser, echo);
                self.runner.stream(&live, &mut sink)
            } else {
                self.runner.stream(&live, &mut parser)
            };
            exec.units_transferred = parser.total();
            indicator.finish();
            result
        } else if verbosity.streams_output() {
            let mut sink = ObserverOutput::new(self.observer, job_ref);
            self.runner.stream(&live, &mut sink)
        } else {
            self.runner.stream(&live, &mut io::sink())
        };

        match check_status(&live, result) {
            Ok(()) => self.complete(exec),
            Err(reason) => self.fail(exec, reason),
        }
    }

    /// Resolve the job's server and probe it.
    ///
    /// Returns `None` after moving the job to `Skipped`.
    fn check_liveness(
        &self,
        exec: &mut JobExecution,
        verbosity: Verbosity,
    ) -> Option<&'a ServerProfile> {
        let server = self.config.server(&exec.server);
        let reachable = match server {
            Some(profile) => probe::probe_liveness(
                self.runner,
                self.observer,
                &exec.job,
                profile,
                self.config.connect_timeout(),
                verbosity,
            ),
            None => false,
        };
        exec.advance(JobState::LivenessChecked);

        let reason = match (server, reachable) {
            (Some(profile), true) => return Some(profile),
            (Some(_), false) => SkipReason::Unreachable,
            (None, _) => SkipReason::UnknownServer,
        };

        warn!(job = %exec.job, server = %exec.server, reason = %reason, "skipping job");
        exec.skip_reason = Some(reason.clone());
        exec.advance(JobState::Skipped);
        self.observer.on_job_skipped(&exec.job, &exec.server, &reason);
        None
    }

    /// Run one step to completion, echoing it and its output as requested.
    fn run_captured(&self, job: &JobRef, invocation: &Invocation, verbosity: Verbosity) -> Result<(), String> {
        if verbosity.echoes_commands() {
            self.observer.on_command(job, invocation);
        }

        let output = self.runner.output(invocation).map_err(|e| e.to_string())?;
        if verbosity.streams_output() {
            self.observer.on_output(job, &output.stdout);
            self.observer.on_output(job, &output.stderr);
        }

        check_status(invocation, Ok(output.status))
    }

    fn complete(&self, mut exec: JobExecution) -> JobReport {
        exec.advance(JobState::Done);
        let report = exec.report();
        self.observer.on_job_completed(&report.job, &report);
        report
    }

    fn fail(&self, mut exec: JobExecution, reason: String) -> JobReport {
        warn!(job = %exec.job, reason = %reason, "job failed");
        exec.failure = Some(reason);
        exec.advance(JobState::Failed);
        let report = exec.report();
        self.observer.on_job_completed(&report.job, &report);
        report
    }
}

fn check_status(
    invocation: &Invocation,
    result: Result<CommandStatus, EngineError>,
) -> Result<(), String> {
    match result {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(format!("{} failed with {}", invocation.program, status)),
        Err(e) => Err(e.to_string()),
    }
}

/// The header line of a job: its label, or what goes where.
fn describe(label: &str, paths: &ResolvedPaths, server: &ServerProfile) -> String {
    if !label.is_empty() {
        return label.to_string();
    }
    let (from, to) = paths.with_connection(&server.connection_string());
    format!("Copying {} into {}", from, to)
}
