//! pricewatch - multi-timeframe pump/dump alerts with a daily price baseline
//!
//! Polls CoinGecko on a fixed interval, measures price and volume change
//! over several sliding timeframes and posts alerts to Telegram.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use pricewatch::cli::commands;
use pricewatch::config::Config;

/// Multi-timeframe price alert bot
#[derive(Parser)]
#[command(name = "pricewatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "pricewatch.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start polling and alerting until Ctrl-C
    Run {
        /// Log messages instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Run a single poll cycle
    Once {
        /// Log messages instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Show current configuration (secrets masked)
    Config,

    /// Show the stored daily baseline
    Baseline,

    /// Send a test message to every channel
    NotifyTest {
        /// Log the message instead of sending it
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pricewatch=info".parse()?),
        )
        .with_target(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Run { dry_run } => commands::run(&config, dry_run).await,
        Commands::Once { dry_run } => commands::once(&config, dry_run).await,
        Commands::Config => commands::show_config(&config),
        Commands::Baseline => commands::baseline(&config).await,
        Commands::NotifyTest { dry_run } => commands::notify_test(&config, dry_run).await,
    };

    if let Err(e) = result {
        match e.downcast_ref::<pricewatch::Error>() {
            Some(err) if err.is_fatal() => error!("Fatal configuration error: {}", err),
            _ => error!("Command failed: {:#}", e),
        }
        std::process::exit(1);
    }

    Ok(())
}
