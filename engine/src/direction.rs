//! Transfer direction resolution.
//!
//! Paths in the configuration mark the remote side with a literal
//! `remote:` prefix. Resolution strips the marker from both paths and
//! records, once, which side carried it.

use tracing::warn;

/// Prefix marking a path as living on the remote host.
pub const REMOTE_MARKER: &str = "remote:";

/// Which way data flows for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Local source, remote destination (also the default when nothing is marked)
    Push,
    /// Remote source, local destination
    Pull,
}

/// Source and destination with markers removed, plus the direction they imply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub direction: Direction,
    pub source: String,
    pub dest: String,
}

impl ResolvedPaths {
    /// Prefix the remote side with `connection` (`user@host`).
    ///
    /// Returns `(source, dest)` in the form the copy tools expect.
    pub fn with_connection(&self, connection: &str) -> (String, String) {
        match self.direction {
            Direction::Pull => (format!("{}:{}", connection, self.source), self.dest.clone()),
            Direction::Push => (self.source.clone(), format!("{}:{}", connection, self.dest)),
        }
    }
}

/// Remove one leading `remote:` marker, if present.
pub fn strip_marker(path: &str) -> &str {
    path.strip_prefix(REMOTE_MARKER).unwrap_or(path)
}

pub fn is_remote(path: &str) -> bool {
    path.starts_with(REMOTE_MARKER)
}

/// Decide the direction of a job and strip the markers from both paths.
///
/// A marked source always wins. When both sides are marked the destination
/// marker is dropped and treated as local; when neither is, the job pushes.
pub fn resolve(source: &str, dest: &str) -> ResolvedPaths {
    let source_remote = is_remote(source);

    if source_remote && is_remote(dest) {
        warn!(
            source,
            dest, "both paths carry the remote marker; treating the source as remote"
        );
    }

    ResolvedPaths {
        direction: if source_remote {
            Direction::Pull
        } else {
            Direction::Push
        },
        source: strip_marker(source).to_string(),
        dest: strip_marker(dest).to_string(),
    }
}
