//! Error types for the orchestration engine.
//!
//! `EngineError` covers the conditions that stop something from being
//! attempted at all: an unreadable configuration, or an external program
//! that could not be launched. A command that launches and then exits
//! non-zero is not an `EngineError`; it is recorded on the job's report.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by configuration loading and process launching.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration file does not exist or cannot be inspected
    #[error("Configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf, source: io::Error },

    /// Configuration path points at a directory
    #[error("'{}' is a directory, not a normal file", path.display())]
    ConfigIsDirectory { path: PathBuf },

    /// Configuration file exists but could not be read
    #[error("Failed to read configuration file {}: {source}", path.display())]
    ConfigRead { path: PathBuf, source: io::Error },

    /// Configuration document is malformed
    #[error("Failed to parse configuration file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: ConfigFormatError,
    },

    /// External program could not be started
    #[error("Failed to launch '{program}': {source}")]
    Spawn { program: String, source: io::Error },

    /// I/O failure while talking to a running process
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Parser failure for one of the supported configuration formats.
#[derive(Debug, Error)]
pub enum ConfigFormatError {
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl EngineError {
    /// True for the errors that abort the whole run before any job starts.
    pub fn is_fatal_config(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. }
                | Self::ConfigIsDirectory { .. }
                | Self::ConfigRead { .. }
                | Self::ConfigParse { .. }
        )
    }
}
