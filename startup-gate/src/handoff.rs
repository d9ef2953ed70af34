//! Process image replacement.
//!
//! The gate never forks for the main command: it `exec`s it, so the command
//! keeps the gate's PID and receives the container's signals directly.

use std::io;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;

use tracing::info;

use crate::config::HandoffCommand;
use crate::error::{GateError, GateResult};

/// Resolve the program to exec. Bare names are looked up on `PATH`.
pub fn resolve(program: &str) -> GateResult<PathBuf> {
    if program.contains('/') {
        return Ok(PathBuf::from(program));
    }
    which::which(program).map_err(|e| GateError::Handoff {
        program: program.to_string(),
        source: io::Error::new(io::ErrorKind::NotFound, e.to_string()),
    })
}

/// Replace the current process with `command`.
///
/// Stdio, environment, and working directory are inherited. Only returns if
/// the exec itself fails.
pub fn exec(command: &HandoffCommand) -> GateError {
    let path = match resolve(command.program()) {
        Ok(path) => path,
        Err(e) => return e,
    };
    info!(program = %path.display(), args = ?command.args(), "handing off");

    let err = Command::new(&path)
        .arg0(command.program())
        .args(command.args())
        .exec();
    GateError::Handoff {
        program: command.program().to_string(),
        source: err,
    }
}
