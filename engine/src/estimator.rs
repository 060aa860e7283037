//! Transfer size estimation.

use crate::command::{simulation_of, Invocation};
use crate::parser::ProgressParser;
use crate::process::CommandRunner;
use tracing::{debug, warn};

/// Total used when the simulation reports no work at all.
pub const NOMINAL_TOTAL: u64 = 100;

/// Predict the work units of a mirror transfer.
///
/// Runs `live` in simulation mode through a detached parser and sums the
/// reported units. Zero (nothing to transfer, no parsable output, or a
/// simulation that could not run) becomes [`NOMINAL_TOTAL`]. The result is
/// advisory; the live run may report more.
pub fn estimate_total(runner: &dyn CommandRunner, live: &Invocation) -> u64 {
    let simulation = simulation_of(live);
    let mut parser = ProgressParser::detached();

    match runner.stream(&simulation, &mut parser) {
        Ok(status) if !status.success() => {
            debug!(status = %status, "simulation exited unsuccessfully");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "simulation could not run"),
    }

    match parser.total() {
        0 => NOMINAL_TOTAL,
        total => total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::process::{CommandOutput, CommandStatus};
    use std::cell::RefCell;
    use std::io::Write;

    struct ScriptedRunner {
        output: Vec<&'static [u8]>,
        seen: RefCell<Vec<Invocation>>,
    }

    impl ScriptedRunner {
        fn new(output: Vec<&'static [u8]>) -> Self {
            ScriptedRunner {
                output,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn output(&self, _invocation: &Invocation) -> Result<CommandOutput, EngineError> {
            unreachable!("estimation only streams")
        }

        fn stream(&self, invocation: &Invocation, sink: &mut dyn Write) -> Result<CommandStatus, EngineError> {
            self.seen.borrow_mut().push(invocation.clone());
            for chunk in &self.output {
                sink.write_all(chunk)?;
            }
            Ok(CommandStatus { code: Some(0) })
        }
    }

    fn live() -> Invocation {
        Invocation::new("rsync")
            .args(["-avz", "--progress", "/src", "user@host:/dst"])
            .env("RSYNC_RSH", "ssh -p 22")
    }

    #[test]
    fn test_sums_units_across_chunks() {
        let runner = ScriptedRunner::new(vec![&b"500###a\n"[..], &b"250###b\n1###c\n"[..]]);
        assert_eq!(estimate_total(&runner, &live()), 751);
    }

    #[test]
    fn test_zero_prediction_uses_nominal_total() {
        let runner = ScriptedRunner::new(vec![&b"sending incremental file list\n"[..]]);
        assert_eq!(estimate_total(&runner, &live()), NOMINAL_TOTAL);
    }

    #[test]
    fn test_simulation_runs_in_dry_run_mode() {
        let runner = ScriptedRunner::new(vec![]);
        estimate_total(&runner, &live());

        let seen = runner.seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].args[0], "--dry-run");
        assert_eq!(seen[0].env, live().env);
    }
}
