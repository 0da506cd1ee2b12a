use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use encrypt_compute::api;
use encrypt_compute::config::ComputeConfig;
use encrypt_compute::service::ComputeService;

#[derive(Parser)]
#[command(author, version, about = "Circuit workbench and verification simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and realtime API using the provided configuration file
    Start {
        #[arg(short, long, default_value = "config/compute.toml")]
        config: PathBuf,
    },
    /// Generate a default configuration file
    GenerateConfig {
        #[arg(short, long, default_value = "config/compute.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config } => start(config).await?,
        Commands::GenerateConfig { path } => generate_config(path)?,
    }

    Ok(())
}

async fn start(config_path: PathBuf) -> Result<()> {
    let config = if config_path.exists() {
        ComputeConfig::load(&config_path)?
    } else {
        let config = ComputeConfig::default();
        config.save(&config_path)?;
        info!(path = ?config_path, "wrote default configuration");
        config
    };

    let service = ComputeService::open(&config)?;
    let api_task = tokio::spawn(api::serve(service, config.api_listen, config.api.clone()));

    tokio::select! {
        res = api_task => res??,
        _ = signal::ctrl_c() => info!("shutdown signal received"),
    }

    Ok(())
}

fn generate_config(path: PathBuf) -> Result<()> {
    let config = ComputeConfig::default();
    config.ensure_directories()?;
    config.save(&path)?;
    info!(?path, "wrote default configuration");
    Ok(())
}
