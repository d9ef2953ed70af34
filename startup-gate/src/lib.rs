//! Startup gate for container entrypoints.
//!
//! Waits until a TCP dependency (typically a database) accepts connections,
//! optionally runs setup steps, then `exec`s the container's main command.
//! The gate keeps no state across runs and never supervises the command.

pub mod config;
pub mod error;
pub mod gate;
pub mod handoff;
pub mod probe;
pub mod report;
pub mod setup;
pub mod signal;

use std::convert::Infallible;
use std::path::Path;

use crate::config::{GateConfig, HandoffCommand, Invocation, Target};
use crate::error::{GateError, GateResult};
use crate::gate::{Gate, WaitOutcome};
use crate::probe::TcpProbe;
use crate::report::ReportEntry;
use crate::setup::SetupStep;
use crate::signal::{Shutdown, TerminationSignals};

/// Wait, run setup, and hand off to the configured command.
///
/// Never returns on success: the process image is replaced.
pub fn run(invocation: Invocation) -> GateResult<Infallible> {
    let Invocation {
        config,
        command,
        setup,
        report,
    } = invocation;
    let target = config.mode.target().cloned();
    let report = report.as_deref();

    let err = match open_and_exec(&config, &setup, &command, report, target.as_ref()) {
        Ok(never) => match never {},
        Err(e) => e,
    };
    record(report, &ReportEntry::failed(&err, target.as_ref()));
    Err(err)
}

/// Termination handlers stay installed until the exec itself, which resets
/// them to `SIG_DFL`. Run as PID 1, the gate would otherwise drop a signal
/// that arrives between the last check and the exec.
fn open_and_exec(
    config: &GateConfig,
    setup: &[SetupStep],
    command: &HandoffCommand,
    report: Option<&Path>,
    target: Option<&Target>,
) -> GateResult<Infallible> {
    let signals = TerminationSignals::install()?;
    let opened = open(config, setup, &signals)?;
    if let Some(signal) = signals.requested() {
        return Err(GateError::Interrupted {
            signal,
            probes: opened.probes(),
            elapsed: opened.elapsed(),
        });
    }
    record(report, &ReportEntry::opened(&opened, target));
    Err(signals.blocking(|| handoff::exec(command)))
}

fn open(
    config: &GateConfig,
    setup: &[SetupStep],
    signals: &TerminationSignals,
) -> GateResult<WaitOutcome> {
    let probe = TcpProbe::new(config.connect_timeout);
    let opened = Gate::new(config.clone(), probe, signals).wait()?;
    setup::run_all(setup, signals).map_err(|e| match e {
        GateError::Interrupted { signal, .. } => GateError::Interrupted {
            signal,
            probes: opened.probes(),
            elapsed: opened.elapsed(),
        },
        other => other,
    })?;
    Ok(opened)
}

fn record(path: Option<&Path>, entry: &ReportEntry) {
    if let Some(path) = path {
        report::record(path, entry);
    }
}
