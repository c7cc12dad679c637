//! Logging setup for the `stsvpn` binary.
//!
//! stsvpn is a one-shot CLI whose stdout carries tables or `--json`
//! documents, so every log line goes to stderr. The filter comes from
//! `RUST_LOG` when set, otherwise from the configured `log_level`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Build the filter: `RUST_LOG` wins over `default_filter`.
fn filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install the global subscriber, text or JSON lines, on stderr.
///
/// A second call (e.g. from a test harness that already installed one) is
/// ignored.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let text = (!log_json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    let json = log_json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });

    let _ = tracing_subscriber::registry()
        .with(filter(default_filter))
        .with(text)
        .with(json)
        .try_init();
}
