//! Subscriber setup for binaries embedding the reader.
//!
//! The library itself only emits `tracing` events; nothing is printed until a
//! subscriber is installed.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter: `RUST_LOG` wins, then the configured level.
///
/// `verbose` raises this crate to `debug` on top of the configured level.
pub fn build_filter(config: &LoggingConfig, verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config.level.trim();
        let directives = if verbose {
            format!("{level},serial_port_reader=debug")
        } else {
            level.to_string()
        };
        EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Install the global subscriber. Logs go to stderr so stdout carries data only.
///
/// Returns an error if a global subscriber is already set.
pub fn init_logging(
    config: &LoggingConfig,
    verbose: bool,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = build_filter(config, verbose);
    let registry = tracing_subscriber::registry().with(filter);
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match config.format {
        LogFormat::Json => registry
            .with(layer.json().with_current_span(false))
            .try_init(),
        LogFormat::Compact => registry
            .with(layer.with_target(false).compact())
            .try_init(),
        LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
    }
}
