//! Parsing of the daemon's human-oriented status output.
//!
//! Every marker here was captured against the strongSwan 5.x `strongswan` /
//! `ipsec` wrapper running under the `C` locale. The controller forces
//! `LC_ALL=C` for that reason. A format change makes these functions report
//! "not installed", "no success" or zero counters; they never panic.

/// Substring of a `status <name>` line for an installed `CHILD_SA`.
pub const INSTALLED_MARKER: &str = "INSTALLED";

/// Substring of the last `up`/`down` line when the operation succeeded.
pub const SUCCESS_MARKER: &str = "successfully";

/// Token preceding the inbound counters in `statusall` output.
pub const INBOUND_MARKER: &str = "bytes_i";

/// Token preceding the outbound counters in `statusall` output.
pub const OUTBOUND_MARKER: &str = "bytes_o";

/// Counters whose last activity is this old or older are reported as zero.
pub const FRESHNESS_LIMIT_SECS: u64 = 2;

/// Daemon-side state of one tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelState {
    /// A `CHILD_SA` is installed. `instance` is the generation-qualified
    /// connection name taken from the last status line, e.g. `branch-a{3}`.
    Installed { instance: Option<String> },
    /// The daemon answered but reported nothing installed.
    NotInstalled,
    /// The daemon produced no output to classify.
    Unparseable,
}

impl TunnelState {
    pub const fn is_installed(&self) -> bool {
        matches!(self, Self::Installed { .. })
    }
}

/// Counter values from one `statusall` line.
///
/// Directions are from this host's point of view: `rx` arrives from the peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficCounters {
    /// Inbound (`bytes_i`) packet count.
    pub rx: u64,
    /// Outbound (`bytes_o`) packet count.
    pub tx: u64,
}

/// A traffic line lacked the tokens the parser relies on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("marker `{0}` not found")]
    MissingMarker(&'static str),
    #[error("no elapsed-time field after `{0}`")]
    MissingAge(&'static str),
    #[error("invalid number `{value}` after `{marker}`")]
    InvalidNumber { marker: &'static str, value: String },
}

/// Classify the output of `status <name>`.
pub fn classify_status(lines: &[String]) -> TunnelState {
    let Some(last) = lines.last() else {
        return TunnelState::Unparseable;
    };
    if lines.iter().any(|line| line.contains(INSTALLED_MARKER)) {
        TunnelState::Installed {
            instance: instance_name(last),
        }
    } else {
        TunnelState::NotInstalled
    }
}

/// The text before the first `:` of a status line, trimmed.
pub fn instance_name(line: &str) -> Option<String> {
    let name = line.split(':').next().unwrap_or_default().trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Whether the last line of an `up`/`down` run reports success.
pub fn is_success(lines: &[String]) -> bool {
    lines.last().is_some_and(|line| line.contains(SUCCESS_MARKER))
}

/// Parse one `statusall` counter line such as
///
/// ```text
/// branch-a{1}:  AES_CBC_128/HMAC_SHA1_96, 840 bytes_i (10 pkts, 1s ago), 1260 bytes_o (15 pkts, 0s ago), rekeying in 44 minutes
/// ```
///
/// For each direction the parenthesised packet count after the marker is
/// used only when the elapsed-time field three tokens after the marker is
/// below [`FRESHNESS_LIMIT_SECS`]. A direction without a parenthesised
/// value, or with a stale one, counts as zero.
pub fn parse_traffic_line(line: &str) -> Result<TrafficCounters, ParseError> {
    let cleaned = line.replace(',', "");
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();

    Ok(TrafficCounters {
        rx: fresh_counter(&tokens, INBOUND_MARKER)?,
        tx: fresh_counter(&tokens, OUTBOUND_MARKER)?,
    })
}

fn fresh_counter(tokens: &[&str], marker: &'static str) -> Result<u64, ParseError> {
    let pos = tokens
        .iter()
        .position(|token| *token == marker)
        .ok_or(ParseError::MissingMarker(marker))?;

    let Some(value) = tokens.get(pos + 1).and_then(|t| t.strip_prefix('(')) else {
        return Ok(0);
    };

    let age = tokens
        .get(pos + 3)
        .ok_or(ParseError::MissingAge(marker))?
        .trim_matches('s');
    let age: u64 = parse_number(marker, age)?;
    if age >= FRESHNESS_LIMIT_SECS {
        return Ok(0);
    }

    parse_number(marker, value)
}

fn parse_number(marker: &'static str, value: &str) -> Result<u64, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidNumber {
        marker,
        value: value.to_string(),
    })
}
