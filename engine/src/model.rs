//! Core data model for orchestration runs.
//!
//! This module defines:
//! - ServerProfile, ArchiveJob, MirrorJob: the declared work, read-only after loading
//! - Verbosity: the three-level output policy
//! - JobRef, JobState, JobReport, RunSummary: per-run bookkeeping

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Connection details for one remote host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerProfile {
    /// Login name on the remote host
    pub user: String,

    /// Hostname or address
    pub host: String,

    /// Path to the private key handed to ssh/scp with `-i`
    pub private_key: String,

    /// SSH port, kept as text because it is only ever passed as an argument
    #[serde(default = "default_port", deserialize_with = "deserialize_port")]
    pub port: String,
}

impl ServerProfile {
    /// `user@host`, the prefix used for remote paths and ssh targets.
    pub fn connection_string(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

fn default_port() -> String {
    "22".to_string()
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct PortVisitor;

    impl<'de> Visitor<'de> for PortVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a port number or string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            if v < 0 {
                return Err(E::custom(format!("port must not be negative, got {}", v)));
            }
            Ok(v.to_string())
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.trim().to_string())
        }
    }

    deserializer.deserialize_any(PortVisitor)
}

/// A "compress then copy" job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ArchiveJob {
    /// Key into the server map
    pub server: String,

    /// Archive base name; a timestamp and `.tar.gz` are appended
    pub filename: String,

    /// Optional human-readable label
    #[serde(default)]
    pub log: String,

    /// Directory to archive, optionally `remote:`-prefixed
    pub source: String,

    /// Where the archive ends up, optionally `remote:`-prefixed
    pub dest: String,

    /// Per-job verbosity override
    #[serde(default)]
    pub verbose: Verbosity,

    /// Build and log commands, archive into the discard sink, never copy
    #[serde(default)]
    pub dry_run: bool,

    /// Glob patterns excluded from the archive
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// A directory mirroring job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MirrorJob {
    /// Key into the server map
    pub server: String,

    /// Optional human-readable label
    #[serde(default)]
    pub log: String,

    /// Tree to mirror from, optionally `remote:`-prefixed
    pub source: String,

    /// Tree to mirror into, optionally `remote:`-prefixed
    pub dest: String,

    /// Remove files at the destination that the source does not have
    #[serde(default)]
    pub delete_extraneous_from_dest: bool,

    /// Per-job verbosity override
    #[serde(default)]
    pub verbose: Verbosity,

    /// Simulate the transfer
    #[serde(default)]
    pub dry_run: bool,

    /// Glob patterns excluded from the transfer
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Output policy, ordered from quietest to loudest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verbosity {
    /// Only job headers, skip notices and completion markers
    #[default]
    Silent,
    /// Also echo every synthesized command
    EchoCommands,
    /// Also echo the output of every command
    EchoCommandsAndStream,
}

impl Verbosity {
    /// The louder of a global setting and a per-job override.
    pub fn effective(global: Verbosity, job: Verbosity) -> Verbosity {
        global.max(job)
    }

    /// Map the numeric configuration level; anything above 2 is the top level.
    pub fn from_level(level: u64) -> Verbosity {
        match level {
            0 => Verbosity::Silent,
            1 => Verbosity::EchoCommands,
            _ => Verbosity::EchoCommandsAndStream,
        }
    }

    pub fn echoes_commands(self) -> bool {
        self >= Verbosity::EchoCommands
    }

    pub fn streams_output(self) -> bool {
        self >= Verbosity::EchoCommandsAndStream
    }
}

impl<'de> Deserialize<'de> for Verbosity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct VerbosityVisitor;

        impl<'de> Visitor<'de> for VerbosityVisitor {
            type Value = Verbosity;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a verbosity level (0, 1, 2) or a boolean")
            }

            // Older configuration files used a plain on/off switch.
            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Verbosity, E> {
                Ok(if v {
                    Verbosity::EchoCommandsAndStream
                } else {
                    Verbosity::Silent
                })
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Verbosity, E> {
                Ok(Verbosity::from_level(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Verbosity, E> {
                if v < 0 {
                    return Err(E::custom(format!("verbosity must not be negative, got {}", v)));
                }
                Ok(Verbosity::from_level(v as u64))
            }
        }

        deserializer.deserialize_any(VerbosityVisitor)
    }
}

/// Which configuration section a job came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// `compress_and_copy` entry
    Archive,
    /// `sync` entry
    Mirror,
}

/// Identifies a job within a run: its section and 1-based position there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobRef {
    pub kind: JobKind,
    pub index: usize,
}

impl JobRef {
    pub fn archive(index: usize) -> Self {
        JobRef {
            kind: JobKind::Archive,
            index,
        }
    }

    pub fn mirror(index: usize) -> Self {
        JobRef {
            kind: JobKind::Mirror,
            index,
        }
    }
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            JobKind::Archive => write!(f, "[Tar and Copy {}]", self.index),
            JobKind::Mirror => write!(f, "[{}]", self.index),
        }
    }
}

/// Lifecycle of a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Declared, nothing attempted yet
    Pending,
    /// Reachability of the server has been decided
    LivenessChecked,
    /// Abandoned before any transfer command was built
    Skipped,
    /// Commands are running
    Executing,
    /// Every command ran and exited successfully
    Done,
    /// A command could not be launched or exited non-zero
    Failed,
}

impl JobState {
    /// Returns true if this state is terminal (no further changes expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Skipped | JobState::Done | JobState::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::LivenessChecked)
                | (JobState::LivenessChecked, JobState::Skipped)
                | (JobState::LivenessChecked, JobState::Executing)
                | (JobState::Executing, JobState::Done)
                | (JobState::Executing, JobState::Failed)
        )
    }
}

/// Why a job never reached `Executing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The liveness probe failed
    Unreachable,
    /// The job names a server missing from the configuration
    UnknownServer,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unreachable => write!(f, "server is unreachable"),
            SkipReason::UnknownServer => write!(f, "server is not defined in the configuration"),
        }
    }
}

/// Outcome of one job.
#[derive(Debug, Clone)]
pub struct JobReport {
    /// Unique identifier for this execution
    pub id: Uuid,

    pub job: JobRef,

    /// Server name as written in the job
    pub server: String,

    /// Terminal state
    pub state: JobState,

    /// Set when the job was skipped
    pub skip_reason: Option<SkipReason>,

    /// Human-readable failure description when `state` is Failed
    pub failure: Option<String>,

    /// Work units counted from the live transfer output
    pub units_transferred: u64,

    /// Total the estimation pass predicted, when one ran
    pub predicted_units: Option<u64>,

    /// Wall time from probe to completion
    pub elapsed: Duration,
}

/// All job reports of one run, in processing order.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub reports: Vec<JobReport>,
}

impl RunSummary {
    fn count(&self, state: JobState) -> usize {
        self.reports.iter().filter(|r| r.state == state).count()
    }

    pub fn done(&self) -> usize {
        self.count(JobState::Done)
    }

    pub fn skipped(&self) -> usize {
        self.count(JobState::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(JobState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_verbosity_is_maximum() {
        assert_eq!(
            Verbosity::effective(Verbosity::Silent, Verbosity::EchoCommands),
            Verbosity::EchoCommands
        );
        assert_eq!(
            Verbosity::effective(Verbosity::EchoCommandsAndStream, Verbosity::Silent),
            Verbosity::EchoCommandsAndStream
        );
        assert_eq!(
            Verbosity::effective(Verbosity::Silent, Verbosity::Silent),
            Verbosity::Silent
        );
    }

    #[test]
    fn test_verbosity_levels() {
        assert!(!Verbosity::Silent.echoes_commands());
        assert!(Verbosity::EchoCommands.echoes_commands());
        assert!(!Verbosity::EchoCommands.streams_output());
        assert!(Verbosity::EchoCommandsAndStream.streams_output());
        assert_eq!(Verbosity::from_level(7), Verbosity::EchoCommandsAndStream);
    }

    #[test]
    fn test_verbosity_accepts_numbers_and_booleans() {
        let v: Verbosity = serde_yaml::from_str("1").expect("numeric verbosity");
        assert_eq!(v, Verbosity::EchoCommands);
        let v: Verbosity = serde_yaml::from_str("true").expect("boolean verbosity");
        assert_eq!(v, Verbosity::EchoCommandsAndStream);
        let v: Verbosity = serde_yaml::from_str("false").expect("boolean verbosity");
        assert_eq!(v, Verbosity::Silent);
        assert!(serde_yaml::from_str::<Verbosity>("-1").is_err());
    }

    #[test]
    fn test_server_port_accepts_number_or_string() {
        let a: ServerProfile =
            serde_yaml::from_str("user: u\nhost: h\nprivate_key: k\nport: 2222\n").expect("numeric port");
        let b: ServerProfile =
            serde_yaml::from_str("user: u\nhost: h\nprivate_key: k\nport: \"2222\"\n").expect("string port");
        let c: ServerProfile =
            serde_yaml::from_str("user: u\nhost: h\nprivate_key: k\n").expect("default port");
        assert_eq!(a.port, "2222");
        assert_eq!(b.port, "2222");
        assert_eq!(c.port, "22");
        assert_eq!(a.connection_string(), "u@h");
    }

    #[test]
    fn test_job_state_transitions() {
        assert!(JobState::Pending.can_transition_to(JobState::LivenessChecked));
        assert!(JobState::LivenessChecked.can_transition_to(JobState::Skipped));
        assert!(JobState::LivenessChecked.can_transition_to(JobState::Executing));
        assert!(JobState::Executing.can_transition_to(JobState::Done));
        assert!(JobState::Executing.can_transition_to(JobState::Failed));

        assert!(!JobState::Pending.can_transition_to(JobState::Executing));
        assert!(!JobState::Skipped.can_transition_to(JobState::Executing));
        assert!(!JobState::Done.can_transition_to(JobState::Failed));
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Skipped.is_terminal());
        assert!(JobState::Done.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Executing.is_terminal());
    }

    #[test]
    fn test_job_ref_display() {
        assert_eq!(JobRef::archive(2).to_string(), "[Tar and Copy 2]");
        assert_eq!(JobRef::mirror(3).to_string(), "[3]");
    }
}
