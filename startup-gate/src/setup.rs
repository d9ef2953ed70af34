//! Side-effecting setup steps (migrations, cache warmup, ...) run after the
//! gate opens and before handoff.

use std::fmt;
use std::process::Command;
use std::time::Duration;

use tracing::{info, trace};

use crate::error::{GateError, GateResult};
use crate::signal::Shutdown;

const SHELL: &str = "/bin/sh";

/// A shell command line run with `sh -c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupStep {
    command: String,
}

impl SetupStep {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Run the step with inherited stdio and environment.
    pub fn run(&self) -> GateResult<()> {
        trace!(shell = SHELL, command = %self.command, "exec setup step");

        let status = Command::new(SHELL)
            .arg("-c")
            .arg(&self.command)
            .status()
            .map_err(|e| GateError::Setup {
                command: self.command.clone(),
                detail: e.to_string(),
                code: None,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(GateError::Setup {
                command: self.command.clone(),
                detail: status.to_string(),
                code: status.code(),
            })
        }
    }
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)
    }
}

/// Run `steps` in order, stopping at the first failure.
///
/// Each step runs inside a blocking section of `shutdown`, so a termination
/// signal arriving mid-step ends the gate without running later steps or
/// the handoff.
pub fn run_all(steps: &[SetupStep], shutdown: &impl Shutdown) -> GateResult<()> {
    for (i, step) in steps.iter().enumerate() {
        interrupted(shutdown)?;
        info!(step = i + 1, total = steps.len(), command = %step, "running setup step");
        shutdown.blocking(|| step.run())?;
    }
    interrupted(shutdown)
}

fn interrupted(shutdown: &impl Shutdown) -> GateResult<()> {
    match shutdown.requested() {
        Some(signal) => Err(GateError::Interrupted {
            signal,
            probes: 0,
            elapsed: Duration::ZERO,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;

    struct Never;

    impl Shutdown for Never {
        fn requested(&self) -> Option<Signal> {
            None
        }
    }

    struct Terminated;

    impl Shutdown for Terminated {
        fn requested(&self) -> Option<Signal> {
            Some(Signal::SIGTERM)
        }
    }

    #[test]
    fn successful_step_returns_ok() {
        SetupStep::new("true").run().unwrap();
    }

    #[test]
    fn failing_step_reports_exit_code() {
        let err = SetupStep::new("echo oops >&2; exit 3").run().unwrap_err();
        match err {
            GateError::Setup { command, code, .. } => {
                assert_eq!(command, "echo oops >&2; exit 3");
                assert_eq!(code, Some(3));
            }
            other => panic!("expected setup error, got {other}"),
        }
    }

    #[test]
    fn steps_run_in_order_and_stop_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("steps.log");
        let log = log.display();
        let steps = [
            SetupStep::new(format!("echo first >> {log}")),
            SetupStep::new("exit 4"),
            SetupStep::new(format!("echo third >> {log}")),
        ];

        let err = run_all(&steps, &Never).unwrap_err();
        assert_eq!(err.exit_code(), 4);

        let written = std::fs::read_to_string(dir.path().join("steps.log")).unwrap();
        assert_eq!(written, "first\n");
    }

    #[test]
    fn pending_signal_skips_steps() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let steps = [SetupStep::new(format!("touch {}", marker.display()))];

        let err = run_all(&steps, &Terminated).unwrap_err();
        assert!(matches!(
            err,
            GateError::Interrupted {
                signal: Signal::SIGTERM,
                ..
            }
        ));
        assert!(!marker.exists());
    }

    #[test]
    fn each_step_runs_inside_blocking_section() {
        use std::cell::Cell;

        struct Counting(Cell<u32>);

        impl Shutdown for Counting {
            fn requested(&self) -> Option<Signal> {
                None
            }

            fn blocking<T>(&self, f: impl FnOnce() -> T) -> T {
                self.0.set(self.0.get() + 1);
                f()
            }
        }

        let counting = Counting(Cell::new(0));
        run_all(&[SetupStep::new("true"), SetupStep::new("true")], &counting).unwrap();
        assert_eq!(counting.0.get(), 2);
    }

    #[test]
    fn no_steps_is_ok() {
        run_all(&[], &Never).unwrap();
    }
}
