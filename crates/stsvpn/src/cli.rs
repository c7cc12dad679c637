//! CLI subcommands.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};

use anyhow::Context;
use clap::Subcommand;
use dialoguer::{Confirm, Password};
use serde_json::json;

use crate::control::{CommandRunner, DownOutcome, UpOutcome};
use crate::form::{DEFAULT_ESP, TunnelForm};
use crate::storage::StartMode;
use crate::sync::{SyncOrchestrator, Teardown, TunnelView};

/// Tunnel management actions.
#[derive(Subcommand, Debug)]
pub enum Action {
    /// List all tunnels
    List {
        /// Also query the daemon for each tunnel's live state
        #[arg(long)]
        status: bool,
    },
    /// Show one tunnel with its live state
    Show {
        /// Tunnel ID
        id: i64,
    },
    /// Create a tunnel, or update one with --id, then reload the daemon
    Save {
        /// ID of the tunnel to update
        #[arg(long)]
        id: Option<i64>,
        /// Connection name, also used as both IKE identities
        #[arg(long)]
        name: String,
        /// Pre-shared key (prompted for when omitted)
        #[arg(long)]
        psk: Option<String>,
        /// Local public address
        #[arg(long)]
        local_ip: String,
        /// Local protected subnet
        #[arg(long)]
        local_subnet: String,
        /// Remote peer address
        #[arg(long)]
        remote_ip: String,
        /// Remote protected subnet
        #[arg(long)]
        remote_subnet: String,
        /// ESP proposal
        #[arg(long, default_value = DEFAULT_ESP)]
        esp: String,
        /// Start mode: add, start or route
        #[arg(long, default_value = "start")]
        auto: StartMode,
    },
    /// Delete a tunnel, bringing it down first when up
    Delete {
        /// Tunnel ID
        id: i64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Rewrite the config files and make the daemon re-read them
    Reload,
    /// Bring a tunnel up
    Up {
        /// Tunnel ID
        id: i64,
    },
    /// Bring a tunnel down
    Down {
        /// Tunnel ID
        id: i64,
    },
    /// Sample a tunnel's traffic counters
    Traffic {
        /// Tunnel ID
        id: i64,
    },
    /// Start the VPN service
    Start,
    /// Stop the VPN service
    Stop,
    /// Print the VPN service status
    Status,
}

/// Execute one action, printing its result to stdout.
pub async fn run<R: CommandRunner>(
    sync: &SyncOrchestrator<R>,
    action: Action,
    as_json: bool,
) -> anyhow::Result<()> {
    execute(sync, action, as_json, &mut io::stdout()).await
}

#[allow(clippy::too_many_lines)]
async fn execute<R: CommandRunner>(
    sync: &SyncOrchestrator<R>,
    action: Action,
    as_json: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match action {
        Action::List { status } => {
            let views = sync.get_tunnels(None, status).await?;
            if as_json {
                write_json(out, &views)?;
            } else {
                write_table(out, &views)?;
            }
        }
        Action::Show { id } => {
            let views = sync.get_tunnels(Some(id), true).await?;
            if as_json {
                write_json(out, &views)?;
            } else {
                for view in &views {
                    write_detail(out, view)?;
                }
            }
        }
        Action::Save {
            id,
            name,
            psk,
            local_ip,
            local_subnet,
            remote_ip,
            remote_subnet,
            esp,
            auto,
        } => {
            let psk = match psk {
                Some(psk) => psk,
                None => Password::new()
                    .with_prompt("Pre-shared key")
                    .with_confirmation("Repeat pre-shared key", "Keys do not match")
                    .interact()
                    .context("failed to read pre-shared key")?,
            };
            let form = TunnelForm {
                name,
                psk,
                start_mode: auto,
                esp,
                local_ip,
                local_subnet,
                remote_ip,
                remote_subnet,
            };
            let tunnel = sync.save(id, &form).await?;
            if as_json {
                write_json(out, &json!({ "id": tunnel.id, "name": tunnel.name }))?;
            } else {
                writeln!(out, "Tunnel {} saved (id {}).", tunnel.name, tunnel.id)?;
            }
        }
        Action::Delete { id, yes } => {
            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Delete tunnel {id}?"))
                    .default(false)
                    .interact()
                    .context("failed to read confirmation")?;
                if !confirmed {
                    writeln!(out, "Aborted.")?;
                    return Ok(());
                }
            }
            let report = sync.delete(id).await?;
            let teardown = match &report.teardown {
                Teardown::NotNeeded => None,
                Teardown::Closed => Some("closed".to_string()),
                Teardown::Failed(reason) => Some(format!("failed: {reason}")),
            };
            if as_json {
                write_json(
                    out,
                    &json!({ "id": report.tunnel.id, "name": report.tunnel.name, "teardown": teardown }),
                )?;
            } else {
                writeln!(out, "Tunnel {} deleted.", report.tunnel.name)?;
                if let Some(teardown) = teardown {
                    writeln!(out, "  Live connection {teardown}")?;
                }
            }
        }
        Action::Reload => {
            sync.reload().await?;
            if as_json {
                write_json(out, &json!({ "reloaded": true }))?;
            } else {
                writeln!(out, "VPN configuration reloaded.")?;
            }
        }
        Action::Up { id } => {
            let (tunnel, outcome) = sync.tunnel_up(id).await?;
            if as_json {
                write_json(
                    out,
                    &json!({ "id": tunnel.id, "name": tunnel.name, "outcome": outcome }),
                )?;
            } else {
                match outcome {
                    UpOutcome::Established => writeln!(out, "Tunnel {} is up.", tunnel.name)?,
                    UpOutcome::AlreadyUp => {
                        writeln!(out, "Tunnel {} is already up.", tunnel.name)?;
                    }
                }
            }
        }
        Action::Down { id } => {
            let (tunnel, outcome) = sync.tunnel_down(id).await?;
            if as_json {
                write_json(
                    out,
                    &json!({ "id": tunnel.id, "name": tunnel.name, "outcome": outcome }),
                )?;
            } else {
                match outcome {
                    DownOutcome::Closed => writeln!(out, "Tunnel {} is down.", tunnel.name)?,
                    DownOutcome::AlreadyDown => {
                        writeln!(out, "Tunnel {} is already down.", tunnel.name)?;
                    }
                }
            }
        }
        Action::Traffic { id } => {
            let (tunnel, sample) = sync.tunnel_traffic(id).await?;
            if as_json {
                write_json(out, &sample)?;
            } else {
                writeln!(
                    out,
                    "{}: rx {} pkts, tx {} pkts (at {})",
                    tunnel.name, sample.rx, sample.tx, sample.sampled_at
                )?;
            }
        }
        Action::Start => {
            sync.controller().start().await?;
            if as_json {
                write_json(out, &json!({ "service": "started" }))?;
            } else {
                writeln!(out, "VPN service started.")?;
            }
        }
        Action::Stop => {
            sync.controller().stop().await?;
            if as_json {
                write_json(out, &json!({ "service": "stopped" }))?;
            } else {
                writeln!(out, "VPN service stopped.")?;
            }
        }
        Action::Status => {
            let lines = sync.controller().status().await?;
            if as_json {
                write_json(out, &json!({ "status": lines }))?;
            } else {
                for line in lines {
                    writeln!(out, "{line}")?;
                }
            }
        }
    }
    Ok(())
}

fn write_json(out: &mut impl Write, value: &impl serde::Serialize) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn status_str(status: Option<bool>) -> &'static str {
    match status {
        Some(true) => "up",
        Some(false) => "down",
        None => "-",
    }
}

fn write_table(out: &mut impl Write, views: &[TunnelView]) -> io::Result<()> {
    if views.is_empty() {
        return writeln!(out, "No tunnels configured.");
    }
    writeln!(
        out,
        "{:<6}  {:<20}  {:<18}  {:<18}  {:<6}  {:<6}",
        "ID", "NAME", "LOCAL", "REMOTE", "AUTO", "STATUS"
    )?;
    for view in views {
        let tunnel = &view.tunnel;
        writeln!(
            out,
            "{:<6}  {:<20}  {:<18}  {:<18}  {:<6}  {:<6}",
            tunnel.id,
            tunnel.name,
            tunnel.rules.leftsubnet,
            tunnel.rules.rightsubnet,
            tunnel.rules.auto,
            status_str(view.status),
        )?;
    }
    writeln!(out, "\n{} tunnel(s)", views.len())
}

fn write_detail(out: &mut impl Write, view: &TunnelView) -> io::Result<()> {
    let tunnel = &view.tunnel;
    let rules = &tunnel.rules;
    writeln!(out, "  ID:           {}", tunnel.id)?;
    writeln!(out, "  Name:         {}", tunnel.name)?;
    writeln!(out, "  Status:       {}", status_str(view.status))?;
    writeln!(out, "  Start mode:   {}", rules.auto)?;
    writeln!(out, "  ESP:          {}", rules.esp)?;
    writeln!(out, "  Local:        {} ({})", rules.left, rules.leftsubnet)?;
    writeln!(out, "  Remote:       {} ({})", rules.right, rules.rightsubnet)?;
    writeln!(out, "  Auth:         {}", rules.authby)
}
