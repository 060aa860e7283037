//! Configuration document loading.
//!
//! The document has four sections: a global verbosity, the server map, the
//! archive jobs (`compress_and_copy`) and the mirror jobs (`sync`). YAML is
//! the conventional format (`config.yml`); files ending in `.toml` are read
//! as TOML with the same schema.

use crate::error::{ConfigFormatError, EngineError};
use crate::model::{ArchiveJob, MirrorJob, ServerProfile, Verbosity};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Default location of the configuration document.
pub const DEFAULT_CONFIG_PATH: &str = "./config.yml";

/// Default liveness-probe connection timeout, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// A fully parsed configuration, read-only for the rest of the run.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Global verbosity; each job may raise it but never lower it
    #[serde(default)]
    pub verbose: Verbosity,

    /// Server profiles keyed by name
    #[serde(default)]
    pub servers: HashMap<String, ServerProfile>,

    /// Archive jobs, processed first, in order
    #[serde(default)]
    pub compress_and_copy: Vec<ArchiveJob>,

    /// Mirror jobs, processed after every archive job, in order
    #[serde(default)]
    pub sync: Vec<MirrorJob>,

    /// Liveness-probe connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Draw progress indicators for mirror jobs
    #[serde(default = "default_progress")]
    pub progress: bool,
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_progress() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            verbose: Verbosity::Silent,
            servers: HashMap::new(),
            compress_and_copy: Vec::new(),
            sync: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            progress: true,
        }
    }
}

impl Config {
    /// Validate, read and parse the document at `path`.
    ///
    /// # Errors
    /// Every error returned here is fatal for the run.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, EngineError> {
        let path = path.as_ref();
        validate_config_path(path)?;

        let text = std::fs::read_to_string(path).map_err(|e| EngineError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        let parsed = if is_toml {
            Config::from_toml_str(&text).map_err(ConfigFormatError::from)
        } else {
            Config::from_yaml_str(&text).map_err(ConfigFormatError::from)
        };

        parsed.map_err(|source| EngineError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Config, serde_yaml::Error> {
        // An empty document deserializes as null; treat it as "no jobs".
        if text.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(text)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(text)
    }

    /// Look up a server profile by name.
    pub fn server(&self, name: &str) -> Option<&ServerProfile> {
        self.servers.get(name)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

/// Make sure `path` is an existing regular file.
pub fn validate_config_path(path: &Path) -> Result<(), EngineError> {
    let metadata = std::fs::metadata(path).map_err(|e| EngineError::ConfigNotFound {
        path: path.to_path_buf(),
        source: e,
    })?;

    if metadata.is_dir() {
        return Err(EngineError::ConfigIsDirectory {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}
