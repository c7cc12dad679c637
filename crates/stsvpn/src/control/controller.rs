//! Daemon control-plane operations.
//!
//! Every call returns its own outcome value; the controller keeps no record
//! of previous invocations.

use serde::Serialize;
use stsvpn_core::db::unix_timestamp;
use tracing::{debug, info, warn};

use super::runner::{CommandOutput, CommandRunner, ProcessRunner};
use super::status::{self, TunnelState};
use super::{DaemonCommand, DaemonError};

/// Result of [`DaemonController::tunnel_up`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpOutcome {
    Established,
    AlreadyUp,
}

/// Result of [`DaemonController::tunnel_down`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownOutcome {
    Closed,
    AlreadyDown,
}

/// One traffic reading for a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrafficSample {
    /// Inbound packet count reported by the daemon, or 0 when stale.
    pub rx: u64,
    /// Outbound packet count reported by the daemon, or 0 when stale.
    pub tx: u64,
    /// Unix seconds when the sample was taken.
    pub sampled_at: i64,
}

/// Issues commands to the IPsec daemon and classifies the results.
#[derive(Debug, Clone)]
pub struct DaemonController<R = ProcessRunner> {
    runner: R,
}

impl<R: CommandRunner> DaemonController<R> {
    pub const fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Run a command; success is exit code 0.
    async fn exec(
        &self,
        command: DaemonCommand,
        target: Option<&str>,
    ) -> Result<CommandOutput, DaemonError> {
        let mut args = vec![command.subcommand()];
        args.extend(target);

        let output = self
            .runner
            .run(&args)
            .await
            .map_err(|e| DaemonError::from_run(command, e))?;

        if output.success() {
            return Ok(output);
        }

        let reason = output.last_stderr_line().map_or_else(
            || match output.exit_code {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_string(),
            },
            ToString::to_string,
        );
        warn!(subcommand = command.subcommand(), exit_code = ?output.exit_code, %reason, "daemon command failed");
        Err(DaemonError::Failed {
            command,
            exit_code: output.exit_code,
            reason,
        })
    }

    /// Run a tunnel mutation; besides exit code 0 the last stdout line must
    /// carry the success marker, since the CLI exits 0 on failed negotiation.
    async fn exec_tunnel(&self, command: DaemonCommand, target: &str) -> Result<(), DaemonError> {
        let output = self.exec(command, Some(target)).await?;
        let Some(last) = output.stdout.last() else {
            return Err(DaemonError::NoOutput { command });
        };
        if status::is_success(&output.stdout) {
            Ok(())
        } else {
            Err(DaemonError::Protocol {
                command,
                line: last.clone(),
            })
        }
    }

    /// Start the daemon.
    pub async fn start(&self) -> Result<(), DaemonError> {
        self.exec(DaemonCommand::Start, None).await?;
        info!("VPN service started");
        Ok(())
    }

    /// Stop the daemon.
    pub async fn stop(&self) -> Result<(), DaemonError> {
        self.exec(DaemonCommand::Stop, None).await?;
        info!("VPN service stopped");
        Ok(())
    }

    /// Overall daemon status, as printed by the CLI.
    pub async fn status(&self) -> Result<Vec<String>, DaemonError> {
        Ok(self.exec(DaemonCommand::Status, None).await?.stdout)
    }

    /// Make the daemon re-read its main config file.
    pub async fn reload_config(&self) -> Result<(), DaemonError> {
        self.exec(DaemonCommand::Reload, None).await.map(drop)
    }

    /// Make the daemon re-read its secrets file.
    pub async fn reread_secrets(&self) -> Result<(), DaemonError> {
        self.exec(DaemonCommand::RereadSecrets, None).await.map(drop)
    }

    /// Apply freshly written files: reload the config, then the secrets.
    ///
    /// Stops at the first failure. Files already on disk stay in place.
    pub async fn apply_config(&self) -> Result<(), DaemonError> {
        self.reload_config().await?;
        self.reread_secrets().await?;
        info!("VPN service configuration reloaded");
        Ok(())
    }

    /// Daemon-side state of one tunnel.
    ///
    /// A nonzero exit from `status <name>` is reported as not installed;
    /// only a daemon that cannot be run at all is an error.
    pub async fn tunnel_status(&self, name: &str) -> Result<TunnelState, DaemonError> {
        match self.exec(DaemonCommand::TunnelStatus, Some(name)).await {
            Ok(output) => Ok(status::classify_status(&output.stdout)),
            Err(DaemonError::Failed { reason, .. }) => {
                debug!(tunnel = %name, %reason, "status query failed; treating tunnel as down");
                Ok(TunnelState::NotInstalled)
            }
            Err(e) => Err(e),
        }
    }

    /// Whether the tunnel is up. Any failure to find out reads as down.
    pub async fn is_tunnel_up(&self, name: &str) -> bool {
        match self.tunnel_status(name).await {
            Ok(state) => state.is_installed(),
            Err(e) => {
                warn!(tunnel = %name, error = %e, "could not query tunnel status");
                false
            }
        }
    }

    /// Bring a tunnel up unless it already is.
    pub async fn tunnel_up(&self, name: &str) -> Result<UpOutcome, DaemonError> {
        if self.tunnel_status(name).await?.is_installed() {
            info!(tunnel = %name, "Tunnel already up");
            return Ok(UpOutcome::AlreadyUp);
        }
        self.exec_tunnel(DaemonCommand::Up, name).await?;
        info!(tunnel = %name, "Tunnel established");
        Ok(UpOutcome::Established)
    }

    /// Bring a tunnel down unless it already is.
    ///
    /// `down` needs the daemon's instance name (e.g. `branch-a{3}`), which is
    /// read from the last line of the status output.
    pub async fn tunnel_down(&self, name: &str) -> Result<DownOutcome, DaemonError> {
        let instance = match self.tunnel_status(name).await? {
            TunnelState::Installed {
                instance: Some(instance),
            } => instance,
            TunnelState::Installed { instance: None } => {
                return Err(DaemonError::Protocol {
                    command: DaemonCommand::TunnelStatus,
                    line: "no instance name in status output".to_string(),
                });
            }
            TunnelState::NotInstalled | TunnelState::Unparseable => {
                info!(tunnel = %name, "Tunnel already down");
                return Ok(DownOutcome::AlreadyDown);
            }
        };

        self.exec_tunnel(DaemonCommand::Down, &instance).await?;
        info!(tunnel = %name, %instance, "Tunnel closed");
        Ok(DownOutcome::Closed)
    }

    /// Sample the tunnel's traffic counters.
    ///
    /// The counters sit on the second-to-last `statusall` line. Output the
    /// parser cannot read yields a zero sample rather than an error.
    pub async fn tunnel_traffic(&self, name: &str) -> Result<TrafficSample, DaemonError> {
        let output = self.exec(DaemonCommand::StatusAll, Some(name)).await?;

        let counters = match output.stdout.iter().rev().nth(1) {
            Some(line) => status::parse_traffic_line(line).unwrap_or_else(|e| {
                debug!(tunnel = %name, error = %e, "unreadable traffic line");
                status::TrafficCounters::default()
            }),
            None => {
                debug!(tunnel = %name, "statusall output too short for traffic counters");
                status::TrafficCounters::default()
            }
        };

        Ok(TrafficSample {
            rx: counters.rx,
            tx: counters.tx,
            sampled_at: unix_timestamp(),
        })
    }
}
