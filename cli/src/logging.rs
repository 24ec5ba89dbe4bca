//! Tracing initialisation for the CLI.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log settings derived from the global CLI flags.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level: "trace" | "debug" | "info" | "warn" | "error"
    pub level: String,
    /// Emit JSON structured logs instead of human-readable text
    pub json: bool,
}

impl LogConfig {
    pub fn from_flags(verbose: bool, json: bool) -> Self {
        Self {
            level: if verbose { "debug" } else { "info" }.into(),
            json,
        }
    }
}

/// Install the global subscriber. `RUST_LOG`, when set, overrides `level`.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stderr keeps stdout free for JSON results.
    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
