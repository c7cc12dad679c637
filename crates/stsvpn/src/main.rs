//! stsvpn
//!
//! Manages site-to-site IPsec tunnels: stores their definitions, renders
//! them into the strongSwan config files and drives the `strongswan` CLI.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::debug;

use stsvpn::cli::Action;
use stsvpn::control::{DaemonController, ProcessRunner};
use stsvpn::storage::Database;
use stsvpn::sync::SyncOrchestrator;
use stsvpn::writer::ConfigWriter;

#[derive(Parser, Debug)]
#[command(name = "stsvpn")]
#[command(version, about = "Site-to-site IPsec tunnel manager")]
struct Cli {
    /// Settings file (replaces ~/.config/stsvpn/settings.json)
    #[arg(long, global = true, env = "STSVPN_CONFIG")]
    config: Option<PathBuf>,

    /// Tunnel database file
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Path of the generated ipsec.conf
    #[arg(long, global = true)]
    conf_file: Option<PathBuf>,

    /// Path of the generated ipsec.secrets
    #[arg(long, global = true)]
    secrets_file: Option<PathBuf>,

    /// Daemon control binary
    #[arg(long, global = true)]
    daemon_bin: Option<PathBuf>,

    /// Seconds to wait for a single daemon command
    #[arg(long, global = true)]
    command_timeout: Option<u64>,

    /// Log level filter (e.g. "info", "debug", "warn")
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation)
    #[arg(long, global = true, env = "STSVPN_LOG_JSON")]
    log_json: bool,

    /// Print command results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    action: Action,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = stsvpn_core::config::load_config(cli.config.as_deref())?;
    if let Some(path) = cli.db_path {
        config.database.path = path;
    }
    if let Some(path) = cli.conf_file {
        config.paths.conf_file = path;
    }
    if let Some(path) = cli.secrets_file {
        config.paths.secrets_file = path;
    }
    if let Some(bin) = cli.daemon_bin {
        config.daemon.binary = bin;
    }
    if let Some(secs) = cli.command_timeout {
        config.daemon.command_timeout_secs = secs;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    config.validate()?;

    let log_filter = format!("stsvpn={0},stsvpn_core={0}", config.log_level);
    stsvpn_core::tracing_init::init_tracing(&log_filter, cli.log_json);

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        db = %config.database.path.display(),
        conf = %config.paths.conf_file.display(),
        secrets = %config.paths.secrets_file.display(),
        daemon = %config.daemon.binary.display(),
        "Starting stsvpn"
    );

    let db = Database::open(&config.database.path).await?;
    let writer = ConfigWriter::new(config.paths.conf_file, config.paths.secrets_file);
    let runner = ProcessRunner::new(
        config.daemon.binary,
        Duration::from_secs(config.daemon.command_timeout_secs),
    );
    let sync = SyncOrchestrator::new(db, writer, DaemonController::new(runner));

    stsvpn::cli::run(&sync, cli.action, cli.json).await?;

    debug!("Done");
    Ok(())
}
