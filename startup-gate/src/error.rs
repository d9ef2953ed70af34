use std::io;
use std::time::Duration;

use nix::sys::signal::Signal;

use crate::config::Target;

/// Exit code for configuration and usage errors (same as clap's usage errors).
pub const EXIT_CONFIG: u8 = 2;
/// Exit code when the dependency never became reachable (`EX_UNAVAILABLE`).
pub const EXIT_UNAVAILABLE: u8 = 69;
/// Exit code when the handoff program exists but cannot be executed.
pub const EXIT_NOT_EXECUTABLE: u8 = 126;
/// Exit code when the handoff program cannot be found.
pub const EXIT_NOT_FOUND: u8 = 127;

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("config error: {0}")]
    Config(String),

    #[error(
        "dependency {target} unavailable after {}ms ({probes} probes)",
        .elapsed.as_millis()
    )]
    DependencyTimeout {
        target: Target,
        elapsed: Duration,
        probes: u32,
    },

    #[error("interrupted by {signal} before handoff ({probes} probes)")]
    Interrupted {
        signal: Signal,
        probes: u32,
        elapsed: Duration,
    },

    #[error("setup command failed: {command}\n{detail}")]
    Setup {
        command: String,
        detail: String,
        code: Option<i32>,
    },

    #[error("cannot exec {program}: {source}")]
    Handoff {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("signal setup error: {0}")]
    Signal(#[from] nix::Error),
}

impl GateError {
    /// Process exit code reported to the container runtime for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            GateError::Config(_) => EXIT_CONFIG,
            GateError::DependencyTimeout { .. } => EXIT_UNAVAILABLE,
            GateError::Interrupted { signal, .. } => {
                u8::try_from(128 + *signal as i32).unwrap_or(1)
            }
            GateError::Setup { code, .. } => code
                .and_then(|c| u8::try_from(c).ok())
                .filter(|c| *c != 0)
                .unwrap_or(1),
            GateError::Handoff { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                EXIT_NOT_FOUND
            }
            GateError::Handoff { .. } => EXIT_NOT_EXECUTABLE,
            GateError::Signal(_) => 1,
        }
    }
}

pub type GateResult<T> = Result<T, GateError>;
