// Pingboard - Main Entry Point
//
// CLI for the pingboard service:
// - serve the HTTP API
// - read the leaderboard and distinct-caller estimate from the shared store
// - validate configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pingboard::config::Config;
use pingboard::{logging, store, UsageService};
use std::path::PathBuf;
use tracing::info;

/// Pingboard: session-gated rate limiting with a usage leaderboard
#[derive(Parser, Debug)]
#[command(name = "pingboard")]
#[command(author = "Pingboard Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Session-gated rate limiter with usage leaderboard", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (defaults to the XDG config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Override the configured listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the top callers
    Top {
        /// Number of entries (capped at the leaderboard size)
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Print the estimated number of distinct callers
    Count,
    /// Validate configuration and print the effective settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Config::load_from_path(path)?
        }
        None => Config::load()?,
    };

    logging::init_tracing(&config.logging, args.verbose)?;

    match args.command {
        Some(Commands::Serve { port }) => {
            let mut config = config;
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await?;
        }
        Some(Commands::Top { k }) => {
            let service = connect(&config).await?;
            let k = k.unwrap_or(config.leaderboard.size);
            let entries = service.get_leaderboard(k).await?;
            if entries.is_empty() {
                println!("No callers recorded yet.");
            }
            for (rank, entry) in entries.iter().enumerate() {
                println!("{:>3}. {:<24} {}", rank + 1, entry.caller, entry.score);
            }
        }
        Some(Commands::Count) => {
            let service = connect(&config).await?;
            let count = service.get_distinct_caller_estimate().await?;
            println!("Distinct callers (estimated): {}", count);
        }
        Some(Commands::CheckConfig) => {
            let rendered =
                toml::to_string_pretty(&redacted(&config)).context("Failed to render config")?;
            println!("Configuration OK");
            println!("{}", rendered);
        }
        None => {
            info!("No command specified. Use \"pingboard --help\" for usage.");
        }
    }

    Ok(())
}

async fn connect(config: &Config) -> Result<UsageService> {
    let store = store::connect(&config.store)
        .await
        .with_context(|| format!("Failed to open {:?} store", config.store.backend))?;
    Ok(UsageService::from_config(config, store))
}

async fn serve(config: Config) -> Result<()> {
    info!(
        "Pingboard v{} starting (window {}s, session TTL {}s)",
        env!("CARGO_PKG_VERSION"),
        config.rate_limit.window_secs,
        config.session.ttl_secs
    );
    let service = connect(&config).await?;
    pingboard::http::serve(&config, service).await
}

/// Copy of the config with passwords masked
fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    for user in &mut config.users {
        user.password = "********".to_string();
    }
    config
}
