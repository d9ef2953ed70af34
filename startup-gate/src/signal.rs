//! Termination signal handling while the gate is waiting.
//!
//! The gate may run as PID 1, where the kernel drops signals that have no
//! handler installed, so handlers stay installed until exec (which resets
//! them to `SIG_DFL`). Outside blocking sections a handler only records the
//! signal and the polling loop aborts on its next check. Inside a blocking
//! section (connect, DNS lookup, a running setup step, the exec itself) the
//! handler calls `_exit(128 + sig)` at once.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use nix::libc;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

use crate::error::GateResult;

const TERMINATION_SIGNALS: [Signal; 4] = [
    Signal::SIGTERM,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGHUP,
];

/// Last termination signal received, 0 if none.
static PENDING: AtomicI32 = AtomicI32::new(0);

/// Set while the gate is inside a call it cannot check the flag from.
static EXIT_ON_SIGNAL: AtomicBool = AtomicBool::new(false);

/// Source of an external request to stop waiting.
pub trait Shutdown {
    fn requested(&self) -> Option<Signal>;

    /// Run `f`, a call that may block for a long time.
    ///
    /// Implementations backed by real signals terminate the process
    /// immediately if one arrives while `f` runs.
    fn blocking<T>(&self, f: impl FnOnce() -> T) -> T {
        f()
    }
}

impl<S: Shutdown> Shutdown for &S {
    fn requested(&self) -> Option<Signal> {
        (**self).requested()
    }

    fn blocking<T>(&self, f: impl FnOnce() -> T) -> T {
        (**self).blocking(f)
    }
}

/// Installed process-wide handlers for SIGTERM, SIGINT, SIGQUIT and SIGHUP.
#[derive(Debug)]
pub struct TerminationSignals {
    _private: (),
}

impl TerminationSignals {
    pub fn install() -> GateResult<Self> {
        let action = SigAction::new(
            SigHandler::Handler(record_signal),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        for sig in TERMINATION_SIGNALS {
            // SAFETY: the handler only touches atomics and calls `_exit`,
            // both async-signal-safe.
            unsafe { sigaction(sig, &action) }?;
        }
        Ok(Self { _private: () })
    }
}

impl Shutdown for TerminationSignals {
    fn requested(&self) -> Option<Signal> {
        decode(PENDING.load(Ordering::SeqCst))
    }

    fn blocking<T>(&self, f: impl FnOnce() -> T) -> T {
        EXIT_ON_SIGNAL.store(true, Ordering::SeqCst);
        // A signal recorded just before arming would otherwise wait out `f`.
        let pending = PENDING.load(Ordering::SeqCst);
        if pending != 0 {
            exit_for(pending);
        }
        let out = f();
        EXIT_ON_SIGNAL.store(false, Ordering::SeqCst);
        out
    }
}

fn decode(raw: i32) -> Option<Signal> {
    if raw == 0 {
        return None;
    }
    Signal::try_from(raw).ok()
}

fn exit_for(sig: libc::c_int) -> ! {
    // SAFETY: `_exit` is async-signal-safe and skips atexit handlers.
    unsafe { libc::_exit(128 + sig) }
}

extern "C" fn record_signal(sig: libc::c_int) {
    PENDING.store(sig, Ordering::SeqCst);
    if EXIT_ON_SIGNAL.load(Ordering::SeqCst) {
        exit_for(sig);
    }
}
