//! Rendering of stored tunnels into the daemon's config and secrets files.
//!
//! Both renderers are pure and keep the order of their input, so the same
//! tunnel list always produces byte-identical files.

use std::fmt::Write;

use crate::storage::Tunnel;

const CONF_HEADER: &str = "\
# ipsec.conf - strongSwan IPsec configuration file
# Managed by stsvpn. Local changes are overwritten on every reload.

config setup
";

const SECRETS_HEADER: &str = "\
# ipsec.secrets - strongSwan IPsec secrets file
# Managed by stsvpn. Local changes are overwritten on every reload.
";

/// The two artifacts the daemon reads, rendered from one tunnel snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    pub conf: String,
    pub secrets: String,
}

/// Render both files from the current tunnel set.
pub fn render(tunnels: &[Tunnel]) -> RenderedConfig {
    RenderedConfig {
        conf: render_ipsec_conf(tunnels),
        secrets: render_ipsec_secrets(tunnels),
    }
}

/// Generate `ipsec.conf` with one `conn` stanza per tunnel.
pub fn render_ipsec_conf(tunnels: &[Tunnel]) -> String {
    let mut out = String::from(CONF_HEADER);
    for tunnel in tunnels {
        let rules = &tunnel.rules;
        // Writing to a String cannot fail.
        let _ = write!(
            out,
            "
conn {name}
\tauto={auto}
\tesp={esp}
\tleft={left}
\tleftsubnet={leftsubnet}
\tleftid={leftid}
\tright={right}
\trightsubnet={rightsubnet}
\trightid={rightid}
\tauthby={authby}
",
            name = tunnel.name,
            auto = rules.auto,
            esp = rules.esp,
            left = rules.left,
            leftsubnet = rules.leftsubnet,
            leftid = rules.leftid,
            right = rules.right,
            rightsubnet = rules.rightsubnet,
            rightid = rules.rightid,
            authby = rules.authby,
        );
    }
    out
}

/// Generate `ipsec.secrets` with one PSK line per tunnel.
pub fn render_ipsec_secrets(tunnels: &[Tunnel]) -> String {
    let mut out = String::from(SECRETS_HEADER);
    if !tunnels.is_empty() {
        out.push('\n');
    }
    for tunnel in tunnels {
        let _ = writeln!(
            out,
            "{} {} : PSK \"{}\"",
            tunnel.rules.leftid, tunnel.rules.rightid, tunnel.psk
        );
    }
    out
}
