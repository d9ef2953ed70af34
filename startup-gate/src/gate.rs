//! The polling loop that decides when the gate opens.
//!
//! ```text
//! Init -> SkipWait ------------------------> (handoff)
//! Init -> Polling -> Polling ... -> Ready -> (handoff)
//!                            \---> Failed  (DependencyTimeout)
//!                            \---> Aborted (Interrupted)
//! ```

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::{GateConfig, Mode, Target};
use crate::error::{GateError, GateResult};
use crate::probe::{Probe, ProbeResult};
use crate::signal::Shutdown;

/// Longest uninterrupted sleep; bounds how late a termination signal is noticed.
const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// How the gate opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// No wait was configured; no probe was issued.
    Skipped,
    /// The dependency accepted a connection on probe number `probes`.
    Ready { probes: u32, elapsed: Duration },
}

impl WaitOutcome {
    pub fn probes(&self) -> u32 {
        match self {
            WaitOutcome::Skipped => 0,
            WaitOutcome::Ready { probes, .. } => *probes,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            WaitOutcome::Skipped => Duration::ZERO,
            WaitOutcome::Ready { elapsed, .. } => *elapsed,
        }
    }
}

pub struct Gate<P, S> {
    config: GateConfig,
    probe: P,
    shutdown: S,
}

impl<P: Probe, S: Shutdown> Gate<P, S> {
    pub fn new(config: GateConfig, probe: P, shutdown: S) -> Self {
        Self {
            config,
            probe,
            shutdown,
        }
    }

    /// Block until the dependency is reachable, the deadline passes, or a
    /// termination signal arrives.
    pub fn wait(&mut self) -> GateResult<WaitOutcome> {
        let target = match &self.config.mode {
            Mode::Skip => {
                info!("dependency wait skipped");
                return Ok(WaitOutcome::Skipped);
            }
            Mode::Wait(target) => target.clone(),
        };

        info!(
            target = %target,
            interval_ms = self.config.poll_interval.as_millis() as u64,
            timeout_secs = self.config.timeout.map(|t| t.as_secs()),
            "waiting for dependency"
        );

        let start = Instant::now();
        // A timeout too large to represent as an instant never expires.
        let deadline = self.config.timeout.and_then(|t| start.checked_add(t));
        let mut probes: u32 = 0;

        loop {
            self.check_shutdown(probes, start)?;

            probes += 1;
            let probe = &mut self.probe;
            match self.shutdown.blocking(|| probe.probe(&target)) {
                ProbeResult::Reachable => {
                    let elapsed = start.elapsed();
                    info!(
                        target = %target,
                        probes,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "dependency reachable"
                    );
                    return Ok(WaitOutcome::Ready { probes, elapsed });
                }
                ProbeResult::Unreachable(reason) => {
                    debug!(
                        target = %target,
                        attempt = probes,
                        reason = %reason,
                        "dependency not reachable yet"
                    );
                }
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(timeout(target, start.elapsed(), probes));
                    }
                    self.config
                        .poll_interval
                        .min(deadline.saturating_duration_since(now))
                }
                None => self.config.poll_interval,
            };
            self.sleep(pause, probes, start)?;
        }
    }

    fn check_shutdown(&self, probes: u32, start: Instant) -> GateResult<()> {
        match self.shutdown.requested() {
            Some(signal) => {
                info!(signal = %signal, probes, "termination requested, aborting wait");
                Err(GateError::Interrupted {
                    signal,
                    probes,
                    elapsed: start.elapsed(),
                })
            }
            None => Ok(()),
        }
    }

    fn sleep(&self, pause: Duration, probes: u32, start: Instant) -> GateResult<()> {
        let until = Instant::now() + pause;
        loop {
            self.check_shutdown(probes, start)?;
            let left = until.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Ok(());
            }
            thread::sleep(left.min(SLEEP_SLICE));
        }
    }
}

fn timeout(target: Target, elapsed: Duration, probes: u32) -> GateError {
    GateError::DependencyTimeout {
        target,
        elapsed,
        probes,
    }
}
