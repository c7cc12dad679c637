//! Control of the external IPsec daemon through its command-line interface.
//!
//! - [`runner`] spawns the CLI and captures its output
//! - [`status`] interprets the daemon's free-text status output
//! - [`controller`] sequences commands and classifies their outcomes

pub mod controller;
#[cfg(test)]
pub(crate) mod fake;
pub mod runner;
pub mod status;

use std::fmt;
use std::time::Duration;

pub use controller::{DaemonController, DownOutcome, TrafficSample, UpOutcome};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner, RunError};
pub use status::{ParseError, TunnelState};

/// Daemon CLI subcommands issued by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonCommand {
    Start,
    Stop,
    Status,
    Reload,
    RereadSecrets,
    TunnelStatus,
    StatusAll,
    Up,
    Down,
}

impl DaemonCommand {
    /// The CLI subcommand word.
    pub const fn subcommand(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Status | Self::TunnelStatus => "status",
            Self::Reload => "reload",
            Self::RereadSecrets => "rereadsecrets",
            Self::StatusAll => "statusall",
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    /// Operator-facing description used to prefix failures.
    const fn failure_context(&self) -> &'static str {
        match self {
            Self::Start => "VPN service failed to start",
            Self::Stop => "VPN service failed to stop",
            Self::Status => "VPN service status query failed",
            Self::Reload => "VPN service failed to load its configuration file",
            Self::RereadSecrets => "VPN service failed to load its secrets file",
            Self::TunnelStatus => "Tunnel status query failed",
            Self::StatusAll => "Tunnel traffic query failed",
            Self::Up => "Tunnel failed to start",
            Self::Down => "Tunnel failed to stop",
        }
    }
}

impl fmt::Display for DaemonCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.failure_context())
    }
}

/// A daemon command did not achieve its effect.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// The CLI could not be executed at all.
    #[error("{command}: the VPN daemon could not be invoked ({source})")]
    Spawn {
        command: DaemonCommand,
        source: std::io::Error,
    },

    /// The CLI did not finish within the configured timeout.
    #[error("{command}: the VPN daemon did not answer within {}s", .timeout.as_secs())]
    Timeout {
        command: DaemonCommand,
        timeout: Duration,
    },

    /// The CLI exited with a nonzero status.
    #[error("{command}: {reason}")]
    Failed {
        command: DaemonCommand,
        exit_code: Option<i32>,
        reason: String,
    },

    /// The CLI exited cleanly but printed nothing to judge success by.
    #[error("{command}: the command ran but returned no output")]
    NoOutput { command: DaemonCommand },

    /// The CLI exited cleanly but its output lacked the expected marker.
    #[error("{command}: the command ran but did not report success: {line}")]
    Protocol { command: DaemonCommand, line: String },
}

impl DaemonError {
    pub const fn command(&self) -> DaemonCommand {
        match self {
            Self::Spawn { command, .. }
            | Self::Timeout { command, .. }
            | Self::Failed { command, .. }
            | Self::NoOutput { command }
            | Self::Protocol { command, .. } => *command,
        }
    }

    fn from_run(command: DaemonCommand, err: RunError) -> Self {
        match err {
            RunError::Spawn { source, .. } => Self::Spawn { command, source },
            RunError::Timeout(timeout) => Self::Timeout { command, timeout },
        }
    }
}
