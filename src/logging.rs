//! Logging Initialization
//!
//! Installs the global `tracing` subscriber from [`LoggingConfig`].
//! `RUST_LOG` overrides the configured level; `--verbose` forces debug.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Level used for the filter when `RUST_LOG` is unset
pub fn default_level(config: &LoggingConfig, verbose: bool) -> Result<Level> {
    if verbose {
        Ok(Level::DEBUG)
    } else {
        config.log_level()
    }
}

/// Initialize the global subscriber
///
/// Fails if a subscriber was already installed.
pub fn init_tracing(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = default_level(config, verbose)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(LevelFilter::from_level(level).into())
    });

    match config.format.to_lowercase().as_str() {
        "json" => {
            let layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).try_init()?;
        }
        "pretty" => {
            let layer = fmt::layer()
                .pretty()
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).try_init()?;
        }
        _ => {
            let layer = fmt::layer().compact().with_target(true).with_filter(filter);
            tracing_subscriber::registry().with(layer).try_init()?;
        }
    }

    tracing::debug!(
        "Logging initialized: level={}, format={}",
        level,
        config.format
    );

    Ok(())
}
