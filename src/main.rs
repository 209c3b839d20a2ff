//! Doorbell bridge - Main Entry Point

use clap::{Parser, Subcommand};
use doorbell_bridge::config::BridgeConfig;
use doorbell_bridge::observability::init_default_logging;
use doorbell_bridge::Bridge;
use std::path::PathBuf;
use std::process;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

/// Bridge doorbell button presses to MQTT
#[derive(Parser)]
#[command(name = "doorbell-bridge")]
#[command(about = "Publishes doorbell button presses to an MQTT broker")]
#[command(version)]
struct Cli {
    /// Configuration file path; the environment is used when omitted
    #[arg(short, long, value_name = "FILE", env = "DOORBELL_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge until SIGINT or SIGTERM
    Run,
    /// Validate configuration
    Config {
        /// Print the resolved configuration with secrets masked
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_default_logging(cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting doorbell bridge");

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_bridge(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<BridgeConfig, doorbell_bridge::config::ConfigError> {
    match config_path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration from file");
            BridgeConfig::load_from_file(path)
        }
        None => {
            info!("Loading configuration from environment");
            BridgeConfig::from_env()
        }
    }
}

async fn run_bridge(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let bridge = Bridge::new(config);
    let shutdown = async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
        }
    };

    bridge.run(shutdown).await?;
    Ok(())
}

fn handle_config_command(config: &BridgeConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", config.to_masked_toml()?);
    }

    info!("Configuration validation complete");
    Ok(())
}
