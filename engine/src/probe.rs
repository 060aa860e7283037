//! Host liveness probing.

use crate::command::{probe_invocation, Invocation};
use crate::model::{JobRef, ServerProfile, Verbosity};
use crate::process::CommandRunner;
use crate::progress::RunObserver;
use std::time::Duration;
use tracing::{debug, warn};

/// Check that `server` accepts a non-interactive ssh login.
///
/// Runs a bounded `ssh ... exit` and reports whether it succeeded. A probe
/// that cannot even be launched counts as unreachable.
pub fn probe_liveness(
    runner: &dyn CommandRunner,
    observer: &dyn RunObserver,
    job: &JobRef,
    server: &ServerProfile,
    connect_timeout: Duration,
    verbosity: Verbosity,
) -> bool {
    let invocation: Invocation = probe_invocation(server, connect_timeout);
    if verbosity.echoes_commands() {
        observer.on_command(job, &invocation);
    }

    match runner.output(&invocation) {
        Ok(output) => {
            debug!(job = %job, host = %server.host, status = %output.status, "liveness probe finished");
            output.status.success()
        }
        Err(e) => {
            warn!(job = %job, host = %server.host, error = %e, "liveness probe could not run");
            false
        }
    }
}
