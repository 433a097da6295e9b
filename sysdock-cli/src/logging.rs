//! Logger setup

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::cli::LogFormat;

/// Set by systemd when stdout/stderr are connected to the journal
const JOURNAL_STREAM_ENV: &str = "JOURNAL_STREAM";

/// Install the global subscriber
///
/// `RUST_LOG` overrides the level picked by `verbose`. When journald is
/// requested but its socket is unavailable, text output is used instead.
pub fn init(format: LogFormat, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let want_journald = match format {
        LogFormat::Text => false,
        LogFormat::Journald => true,
        LogFormat::Auto => std::env::var_os(JOURNAL_STREAM_ENV).is_some(),
    };

    let journald = if want_journald {
        tracing_journald::layer()
            .map(|layer| layer.with_syslog_identifier("sysdock".to_string()))
            .ok()
    } else {
        None
    };
    let fallback = journald.is_none() && want_journald;

    let text = journald.is_none().then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(journald)
        .with(text)
        .init();

    if fallback {
        tracing::warn!("journald is not available, logging to stderr");
    }
}
