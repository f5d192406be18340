//! Log output for the command line
//!
//! Logs go to stderr so that command output on stdout stays clean.

use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration for the CLI
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    pub level: String,
    /// Emit one JSON object per event
    pub json_format: bool,
    /// Multi-line output with source locations
    pub pretty_print: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,sqlx=warn".to_string(),
            json_format: false,
            pretty_print: false,
        }
    }
}

impl LoggingConfig {
    pub fn verbose() -> Self {
        Self {
            level: "debug,sqlx=info".to_string(),
            json_format: false,
            pretty_print: true,
        }
    }

    pub fn from_flags(verbose: bool, json_logs: bool) -> Self {
        let mut config = if verbose { Self::verbose() } else { Self::default() };
        if json_logs {
            config.json_format = true;
            config.pretty_print = false;
        }
        config
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init()?;
    } else if config.pretty_print {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).pretty())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).with_target(false).compact())
            .try_init()?;
    }

    Ok(())
}
