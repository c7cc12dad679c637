//! Operator input for creating or editing a tunnel.

use serde::{Deserialize, Serialize};

use crate::storage::{AuthMethod, StartMode, TunnelRules};

/// Default ESP proposal offered to peers.
pub const DEFAULT_ESP: &str = "aes128-sha1";

/// Fields an operator submits for one tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelForm {
    pub name: String,
    pub psk: String,
    pub start_mode: StartMode,
    pub esp: String,
    pub local_ip: String,
    pub local_subnet: String,
    pub remote_ip: String,
    pub remote_subnet: String,
}

/// A form field would produce an unusable or unparsable config.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error(
        "tunnel name '{0}' must start with a letter or digit and may only contain letters, digits, '.', '_' and '-'"
    )]
    InvalidName(String),

    #[error("pre-shared key must not contain double quotes or line breaks")]
    InvalidPsk,

    #[error("{field} '{value}' must not contain whitespace, '#' or quotes")]
    InvalidValue { field: &'static str, value: String },
}

impl TunnelForm {
    /// Check every field against the config and secrets file grammar.
    pub fn validate(&self) -> Result<(), FormError> {
        if self.name.is_empty() {
            return Err(FormError::Empty("tunnel name"));
        }
        // The name is passed to the daemon CLI as a bare argument, so it
        // must not look like an option.
        let starts_alphanumeric = self.name.starts_with(|c: char| c.is_ascii_alphanumeric());
        if !starts_alphanumeric
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(FormError::InvalidName(self.name.clone()));
        }

        if self.psk.is_empty() {
            return Err(FormError::Empty("pre-shared key"));
        }
        if self.psk.contains(['"', '\n', '\r']) {
            return Err(FormError::InvalidPsk);
        }

        for (field, value) in [
            ("ESP proposal", &self.esp),
            ("local IP", &self.local_ip),
            ("local subnet", &self.local_subnet),
            ("remote IP", &self.remote_ip),
            ("remote subnet", &self.remote_subnet),
        ] {
            if value.is_empty() {
                return Err(FormError::Empty(field));
            }
            if value
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\''))
            {
                return Err(FormError::InvalidValue {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    /// Build the stored rules. Both IKE identities are the tunnel name and
    /// authentication is always by pre-shared key.
    pub fn to_rules(&self) -> TunnelRules {
        TunnelRules {
            auto: self.start_mode,
            esp: self.esp.clone(),
            left: self.local_ip.clone(),
            leftsubnet: self.local_subnet.clone(),
            leftid: self.name.clone(),
            right: self.remote_ip.clone(),
            rightsubnet: self.remote_subnet.clone(),
            rightid: self.name.clone(),
            authby: AuthMethod::Secret,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_form(name: &str) -> TunnelForm {
    TunnelForm {
        name: name.into(),
        psk: "s3cr3t".into(),
        start_mode: StartMode::Start,
        esp: DEFAULT_ESP.into(),
        local_ip: "10.0.0.1".into(),
        local_subnet: "10.0.0.0/24".into(),
        remote_ip: "10.1.0.1".into(),
        remote_subnet: "10.1.0.0/24".into(),
    }
}
