//! Process execution capability.
//!
//! The orchestrator never touches `std::process` directly; it goes through
//! [`CommandRunner`] so that tests can script command outcomes.

use crate::command::Invocation;
use crate::error::EngineError;
use crossbeam_channel::unbounded;
use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use tracing::debug;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Exit status of a finished command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    /// Exit code; `None` when the process was killed by a signal
    pub code: Option<i32>,
}

impl CommandStatus {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit status {}", code),
            None => write!(f, "terminated by signal"),
        }
    }
}

impl From<std::process::ExitStatus> for CommandStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        CommandStatus {
            code: status.code(),
        }
    }
}

/// Captured result of a command run to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: CommandStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Runs external programs on behalf of the orchestrator.
///
/// Both methods block until the process exits. There is no timeout and no
/// cancellation.
pub trait CommandRunner {
    /// Run to completion, capturing stdout and stderr separately.
    fn output(&self, invocation: &Invocation) -> Result<CommandOutput, EngineError>;

    /// Run to completion, writing combined stdout/stderr into `sink` as it arrives.
    fn stream(&self, invocation: &Invocation, sink: &mut dyn Write) -> Result<CommandStatus, EngineError>;
}

/// [`CommandRunner`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    fn command(invocation: &Invocation) -> Command {
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        command.envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        command
    }

    fn spawn_error(invocation: &Invocation, source: io::Error) -> EngineError {
        EngineError::Spawn {
            program: invocation.program.clone(),
            source,
        }
    }
}

impl CommandRunner for SystemRunner {
    fn output(&self, invocation: &Invocation) -> Result<CommandOutput, EngineError> {
        debug!(command = %invocation, "running");
        let output = Self::command(invocation)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Self::spawn_error(invocation, e))?;

        Ok(CommandOutput {
            status: output.status.into(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn stream(&self, invocation: &Invocation, sink: &mut dyn Write) -> Result<CommandStatus, EngineError> {
        debug!(command = %invocation, "streaming");
        let mut child = Self::command(invocation)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Self::spawn_error(invocation, e))?;

        let (tx, rx) = unbounded::<Vec<u8>>();
        let mut readers = Vec::new();

        if let Some(stdout) = child.stdout.take() {
            let tx = tx.clone();
            readers.push(thread::spawn(move || forward_chunks(stdout, tx)));
        }
        if let Some(stderr) = child.stderr.take() {
            let tx = tx.clone();
            readers.push(thread::spawn(move || forward_chunks(stderr, tx)));
        }
        // The loop below ends once both reader threads drop their senders.
        drop(tx);

        let mut write_error = None;
        for chunk in rx {
            if write_error.is_none() {
                if let Err(e) = sink.write_all(&chunk) {
                    write_error = Some(e);
                }
            }
        }

        for reader in readers {
            if let Ok(Err(e)) = reader.join() {
                debug!(error = %e, "output reader stopped early");
            }
        }

        let status = child.wait()?;
        sink.flush()?;
        if let Some(e) = write_error {
            return Err(EngineError::Io(e));
        }

        Ok(status.into())
    }
}

fn forward_chunks<R: Read>(mut reader: R, tx: crossbeam_channel::Sender<Vec<u8>>) -> io::Result<()> {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        if tx.send(buf[..n].to_vec()).is_err() {
            return Ok(());
        }
    }
}

/// Writes every chunk to two sinks, e.g. the progress parser and the terminal.
pub struct Tee<A, B> {
    first: A,
    second: B,
}

impl<A: Write, B: Write> Tee<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Tee { first, second }
    }
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.first.write_all(buf)?;
        self.second.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.first.flush()?;
        self.second.flush()
    }
}
