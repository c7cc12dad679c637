//! Configuration resolution for stsvpn.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. System config (/etc/stsvpn/settings.json)
//! 3. User config (~/.config/stsvpn/settings.json), or an explicit `--config` file
//! 4. Environment variables (`STSVPN_*`)
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// System-wide settings file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/stsvpn/settings.json";

/// Complete stsvpn configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub paths: PathsConfig,
    pub daemon: DaemonConfig,
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            paths: PathsConfig::default(),
            daemon: DaemonConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

/// Locations of the files read by the IPsec daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub conf_file: PathBuf,
    pub secrets_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            conf_file: PathBuf::from("/etc/strongswan/ipsec.conf"),
            secrets_file: PathBuf::from("/etc/strongswan/ipsec.secrets"),
        }
    }
}

/// How the daemon's control CLI is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Control binary, resolved through `PATH` when not absolute.
    pub binary: PathBuf,
    /// Upper bound for a single CLI invocation.
    pub command_timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("strongswan"),
            command_timeout_secs: 30,
        }
    }
}

/// Tunnel database settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/stsvpn/tunnels.db"),
        }
    }
}

impl Config {
    /// Reject settings the rest of the system cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.paths.conf_file.as_os_str().is_empty() {
            return Err(Error::Config("paths.conf_file must not be empty".into()));
        }
        if self.paths.secrets_file.as_os_str().is_empty() {
            return Err(Error::Config("paths.secrets_file must not be empty".into()));
        }
        if self.paths.conf_file == self.paths.secrets_file {
            return Err(Error::Config(
                "paths.conf_file and paths.secrets_file must differ".into(),
            ));
        }
        if self.daemon.binary.as_os_str().is_empty() {
            return Err(Error::Config("daemon.binary must not be empty".into()));
        }
        if self.daemon.command_timeout_secs == 0 {
            return Err(Error::Config(
                "daemon.command_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
///
/// When `explicit` is given it replaces the user-level file and must exist.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;

    let system = Path::new(SYSTEM_CONFIG_PATH);
    if system.exists() {
        merge_json(&mut merged, read_config_value(system)?);
    }

    match explicit {
        Some(path) => merge_json(&mut merged, read_config_value(path)?),
        None => {
            if let Some(user) = user_config_path()
                && user.exists()
            {
                merge_json(&mut merged, read_config_value(&user)?);
            }
        }
    }

    let mut config: Config = serde_json::from_value(merged)
        .map_err(|e| Error::Config(format!("Invalid configuration: {e}")))?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

/// Get the per-user config file path.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("stsvpn").join("settings.json"))
}

fn read_config_value(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Deep-merge `overlay` into `base`; objects merge key by key, anything else replaces.
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `STSVPN_*` overrides using `lookup` to read variables.
///
/// Runs before logging is set up, so a malformed value is an error rather
/// than a warning.
pub fn apply_env_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(val) = lookup("STSVPN_CONF_FILE") {
        config.paths.conf_file = PathBuf::from(val);
    }
    if let Some(val) = lookup("STSVPN_SECRETS_FILE") {
        config.paths.secrets_file = PathBuf::from(val);
    }
    if let Some(val) = lookup("STSVPN_DAEMON_BIN") {
        config.daemon.binary = PathBuf::from(val);
    }
    if let Some(val) = lookup("STSVPN_COMMAND_TIMEOUT") {
        config.daemon.command_timeout_secs = val.parse().map_err(|e| {
            Error::Config(format!("invalid STSVPN_COMMAND_TIMEOUT '{val}': {e}"))
        })?;
    }
    if let Some(val) = lookup("STSVPN_DB_PATH") {
        config.database.path = PathBuf::from(val);
    }
    if let Some(val) = lookup("STSVPN_LOG_LEVEL") {
        config.log_level = val;
    }
    Ok(())
}
