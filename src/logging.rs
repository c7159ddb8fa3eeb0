//! Structured logging setup.
//!
//! Library code only emits `tracing` events; the binary installs the
//! subscriber once at startup through [`init_logging`].

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON lines, for when the plotter host ships logs elsewhere.
    Json,
    /// Compact human-readable lines.
    #[default]
    Compact,
}

/// Picks the default filter directive when `RUST_LOG` is not set.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "linecraft=debug" } else { "linecraft=info" }
}

/// Initializes the logging subsystem. Subsequent calls are no-ops.
///
/// `RUST_LOG` overrides the default level.
pub fn init_logging(format: LogFormat, verbose: bool) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json().with_writer(std::io::stderr))
                    .init();
            }
            LogFormat::Compact => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().compact().with_writer(std::io::stderr))
                    .init();
            }
        }
    });
}
