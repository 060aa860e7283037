//! Progress indicators and run observers.
//!
//! This module keeps the engine independent of the terminal:
//! - `ProgressIndicator` / `ProgressFactory` are the sink the streaming
//!   parser advances (implemented here for `indicatif::ProgressBar`)
//! - `RunObserver` receives the user-facing diagnostics of a run
//!
//! All methods are called synchronously from the orchestrator's thread.

use crate::command::Invocation;
use crate::model::{JobRef, JobReport, SkipReason};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;

/// A progress display counting abstract work units.
pub trait ProgressIndicator {
    /// Add `delta` units.
    fn inc(&self, delta: u64);

    /// Units counted so far.
    fn position(&self) -> u64;

    /// Draw the indicator even though nothing has been counted yet.
    fn render_blank(&self);

    /// Mark the indicator complete.
    fn finish(&self);

    /// Hide the indicator while `f` writes to the terminal, then redraw it.
    fn suspend(&self, f: &mut dyn FnMut()) {
        f();
    }
}

/// Creates one indicator per running job.
pub trait ProgressFactory {
    fn create(&self, total: u64, description: &str) -> Box<dyn ProgressIndicator>;
}

impl ProgressIndicator for ProgressBar {
    fn inc(&self, delta: u64) {
        ProgressBar::inc(self, delta);
        // The prediction is advisory; let the bar grow instead of overflowing.
        let position = ProgressBar::position(self);
        if let Some(length) = self.length() {
            if position > length {
                self.set_length(position);
            }
        }
    }

    fn position(&self) -> u64 {
        ProgressBar::position(self)
    }

    fn render_blank(&self) {
        self.tick();
    }

    fn finish(&self) {
        ProgressBar::finish(self);
    }

    fn suspend(&self, f: &mut dyn FnMut()) {
        ProgressBar::suspend(self, f);
    }
}

/// Builds `indicatif` bars drawn on stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalProgress {
    /// Build bars that never draw (for non-interactive output)
    pub hidden: bool,
}

const BAR_TEMPLATE: &str =
    "{spinner:.green} {msg} [{bar:10.cyan/blue}] {bytes}/{total_bytes} ({pos}/{len})";

impl ProgressFactory for TerminalProgress {
    fn create(&self, total: u64, description: &str) -> Box<dyn ProgressIndicator> {
        let target = if self.hidden {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr_with_hz(15)
        };
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        let bar = ProgressBar::with_draw_target(Some(total), target);
        bar.set_style(style);
        bar.set_message(description.to_string());
        if !self.hidden {
            bar.enable_steady_tick(Duration::from_millis(120));
        }
        Box::new(bar)
    }
}

/// Receives the diagnostics of a run, in order.
///
/// The CLI implements this to print `>> [N] ...` lines; tests record calls.
pub trait RunObserver {
    /// A job passed its liveness check and is about to run.
    fn on_job_started(&self, job: &JobRef, description: &str);

    /// A command is about to run (only when the job echoes commands).
    fn on_command(&self, job: &JobRef, invocation: &Invocation);

    /// Raw output of a command (only when the job streams output).
    fn on_output(&self, job: &JobRef, chunk: &[u8]);

    /// The job was abandoned before any transfer command was built.
    fn on_job_skipped(&self, job: &JobRef, server: &str, reason: &SkipReason);

    /// The job reached `Done` or `Failed`.
    fn on_job_completed(&self, job: &JobRef, report: &JobReport);
}

/// Adapts a [`RunObserver`] into a writer so output can be teed into it.
pub struct ObserverOutput<'a> {
    observer: &'a dyn RunObserver,
    job: JobRef,
}

impl<'a> ObserverOutput<'a> {
    pub fn new(observer: &'a dyn RunObserver, job: JobRef) -> Self {
        ObserverOutput { observer, job }
    }
}

impl Write for ObserverOutput<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.observer.on_output(&self.job, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Forwards output to `inner` with the indicator suspended, so echoed
/// transfer output and the bar's redraws do not interleave.
pub struct SuspendedOutput<'a, W> {
    indicator: &'a dyn ProgressIndicator,
    inner: W,
}

impl<'a, W: Write> SuspendedOutput<'a, W> {
    pub fn new(indicator: &'a dyn ProgressIndicator, inner: W) -> Self {
        SuspendedOutput { indicator, inner }
    }
}

impl<W: Write> Write for SuspendedOutput<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let inner = &mut self.inner;
        let mut result = Ok(());
        self.indicator.suspend(&mut || result = inner.write_all(buf));
        result.map(|()| buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
