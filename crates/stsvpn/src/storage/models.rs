//! Database models for stsvpn.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::db::DatabaseError;

/// Raw tunnel record from the database. `rules` holds JSON text.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TunnelRow {
    pub id: i64,
    pub name: String,
    pub psk: String,
    pub rules: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A stored tunnel with its rules decoded. The PSK is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tunnel {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing)]
    pub psk: String,
    pub rules: TunnelRules,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<TunnelRow> for Tunnel {
    type Error = DatabaseError;

    fn try_from(row: TunnelRow) -> Result<Self, Self::Error> {
        let rules = serde_json::from_str(&row.rules).map_err(|e| {
            DatabaseError::Corrupt(format!("rules of tunnel {} ({}): {e}", row.id, row.name))
        })?;
        Ok(Self {
            id: row.id,
            name: row.name,
            psk: row.psk,
            rules,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Connection parameters rendered into an `ipsec.conf` stanza.
///
/// Every key is required; a stored JSON object missing one fails to decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TunnelRules {
    pub auto: StartMode,
    pub esp: String,
    pub left: String,
    pub leftsubnet: String,
    pub leftid: String,
    pub right: String,
    pub rightsubnet: String,
    pub rightid: String,
    pub authby: AuthMethod,
}

/// What the daemon does with a connection when it loads the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StartMode {
    /// Load the connection but wait for a manual `up`.
    Add,
    /// Bring the connection up as soon as the config is loaded.
    #[default]
    Start,
    /// Install a trap policy; negotiate on first matching traffic.
    Route,
}

impl StartMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Start => "start",
            Self::Route => "route",
        }
    }
}

impl fmt::Display for StartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StartMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "start" => Ok(Self::Start),
            "route" => Ok(Self::Route),
            other => Err(format!(
                "unknown start mode: {other} (expected 'add', 'start' or 'route')"
            )),
        }
    }
}

/// Peer authentication method. Only pre-shared keys are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    #[default]
    Secret,
}

impl AuthMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Secret => "secret",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(rules: &str) -> TunnelRow {
        TunnelRow {
            id: 1,
            name: "branch-a".into(),
            psk: "s3cr3t".into(),
            rules: rules.into(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn decodes_stored_rules() {
        let tunnel = Tunnel::try_from(row(
            r#"{"auto":"start","esp":"aes128-sha1","left":"10.0.0.1","leftsubnet":"10.0.0.0/24",
                "leftid":"branch-a","right":"10.1.0.1","rightsubnet":"10.1.0.0/24",
                "rightid":"branch-a","authby":"secret"}"#,
        ))
        .unwrap();

        assert_eq!(tunnel.rules.auto, StartMode::Start);
        assert_eq!(tunnel.rules.authby, AuthMethod::Secret);
        assert_eq!(tunnel.rules.rightsubnet, "10.1.0.0/24");
    }

    #[test]
    fn missing_rule_key_is_corrupt() {
        let err = Tunnel::try_from(row(r#"{"auto":"start","esp":"aes128-sha1"}"#)).unwrap_err();
        assert!(matches!(err, DatabaseError::Corrupt(_)));
    }

    #[test]
    fn unsupported_auth_method_is_corrupt() {
        let err = Tunnel::try_from(row(
            r#"{"auto":"add","esp":"x","left":"a","leftsubnet":"b","leftid":"c",
                "right":"d","rightsubnet":"e","rightid":"f","authby":"pubkey"}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, DatabaseError::Corrupt(_)));
    }

    #[test]
    fn serialized_tunnel_omits_psk() {
        let tunnel = Tunnel::try_from(row(
            r#"{"auto":"add","esp":"x","left":"a","leftsubnet":"b","leftid":"c",
                "right":"d","rightsubnet":"e","rightid":"f","authby":"secret"}"#,
        ))
        .unwrap();

        let json = serde_json::to_value(&tunnel).unwrap();

        assert!(json.get("psk").is_none());
        assert_eq!(json["rules"]["auto"], "add");
    }

    #[test]
    fn start_mode_parses_known_values() {
        assert_eq!("add".parse::<StartMode>(), Ok(StartMode::Add));
        assert_eq!("route".parse::<StartMode>(), Ok(StartMode::Route));
        assert!("always".parse::<StartMode>().is_err());
    }
}
