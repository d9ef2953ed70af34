use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::error::{GateError, GateResult};
use crate::setup::SetupStep;

pub(crate) const DEFAULT_INTERVAL_MS: u64 = 100;
pub(crate) const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1000;

/// Wait for a TCP dependency to accept connections, then exec the given command.
#[derive(Debug, Parser)]
#[command(name = "startup-gate", version)]
pub struct GateArgs {
    /// Whether to wait for the dependency before handing off
    #[arg(long, env = "GATE_MODE", value_enum, default_value_t = ModeArg::Skip)]
    pub mode: ModeArg,
    /// Host of the dependency to probe
    #[arg(long, env = "GATE_HOST")]
    pub host: Option<String>,
    /// Port of the dependency to probe
    #[arg(long, env = "GATE_PORT", value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,
    /// Delay between probe attempts, in milliseconds
    #[arg(long, env = "GATE_INTERVAL_MS", default_value_t = DEFAULT_INTERVAL_MS)]
    pub interval_ms: u64,
    /// Per-attempt connect timeout, in milliseconds
    #[arg(long, env = "GATE_CONNECT_TIMEOUT_MS", default_value_t = DEFAULT_CONNECT_TIMEOUT_MS)]
    pub connect_timeout_ms: u64,
    /// Give up after this many seconds (waits forever when unset)
    #[arg(long, env = "GATE_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,
    /// Shell command to run after the dependency is ready and before handoff.
    /// Repeatable; `;` separates steps in the environment variable.
    #[arg(long = "setup", env = "GATE_SETUP", value_delimiter = ';')]
    pub setup: Vec<String>,
    /// Append a JSON line describing the gate outcome to this file
    #[arg(long, env = "GATE_REPORT")]
    pub report: Option<PathBuf>,
    /// Enable debug logging (logs every failed probe)
    #[arg(short, long, env = "GATE_VERBOSE")]
    pub verbose: bool,
    /// Command to exec once the gate opens
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Skip,
    Wait,
}

/// Network address the gate waits on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    host: String,
    port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> GateResult<Self> {
        let host = host.into().trim().to_string();
        if host.is_empty() {
            return Err(GateError::Config("target host is empty".into()));
        }
        if port == 0 {
            return Err(GateError::Config("target port must be 1-65535".into()));
        }
        Ok(Self { host, port })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Skip,
    Wait(Target),
}

impl Mode {
    pub fn target(&self) -> Option<&Target> {
        match self {
            Mode::Skip => None,
            Mode::Wait(target) => Some(target),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    pub mode: Mode,
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
    /// `None` retries until the dependency answers.
    pub timeout: Option<Duration>,
}

impl GateConfig {
    /// Config that waits on `target` with default timings and no deadline.
    pub fn wait(target: Target) -> Self {
        Self {
            mode: Mode::Wait(target),
            poll_interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            timeout: None,
        }
    }

    pub fn skip() -> Self {
        Self {
            mode: Mode::Skip,
            poll_interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            timeout: None,
        }
    }
}

/// Program plus arguments that replace the gate process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffCommand {
    program: String,
    args: Vec<String>,
}

impl HandoffCommand {
    pub fn new(argv: Vec<String>) -> GateResult<Self> {
        let mut argv = argv.into_iter();
        let program = argv
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| GateError::Config("no command given to hand off to".into()))?;
        Ok(Self {
            program,
            args: argv.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Fully validated inputs for one gate run.
#[derive(Debug)]
pub struct Invocation {
    pub config: GateConfig,
    pub command: HandoffCommand,
    pub setup: Vec<SetupStep>,
    pub report: Option<PathBuf>,
}

impl GateArgs {
    /// Validate the parsed arguments into an [`Invocation`].
    ///
    /// The command is checked first so a missing command is reported as a
    /// config error in every mode.
    pub fn into_invocation(self) -> GateResult<Invocation> {
        let command = HandoffCommand::new(self.command)?;

        let mode = match self.mode {
            ModeArg::Skip => Mode::Skip,
            ModeArg::Wait => {
                let host = self
                    .host
                    .ok_or_else(|| GateError::Config("wait mode requires --host".into()))?;
                let port = self
                    .port
                    .ok_or_else(|| GateError::Config("wait mode requires --port".into()))?;
                Mode::Wait(Target::new(host, port)?)
            }
        };

        if self.interval_ms == 0 {
            return Err(GateError::Config("poll interval must be positive".into()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(GateError::Config("connect timeout must be positive".into()));
        }

        let setup = self
            .setup
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(SetupStep::new)
            .collect();

        Ok(Invocation {
            config: GateConfig {
                mode,
                poll_interval: Duration::from_millis(self.interval_ms),
                connect_timeout: Duration::from_millis(self.connect_timeout_ms),
                timeout: self.timeout_secs.map(Duration::from_secs),
            },
            command,
            setup,
            report: self.report,
        })
    }
}
