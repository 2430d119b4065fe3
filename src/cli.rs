use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use crate::config::{self, AppConfig, LoadedConfig};
use crate::{server, telemetry};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level, overrides the configured one
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Listen address, overrides `server.addr`
        #[arg(long)]
        addr: Option<String>,
    },
    /// Print the effective configuration as YAML
    ShowConfig,
}

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();
    let LoadedConfig { mut config, path } =
        config::load(cli.config.as_deref()).context("failed to load configuration")?;
    apply_overrides(&cli, &mut config);

    telemetry::init_logging(&config.logging)?;
    info!("Starting docgate v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = path.as_deref() {
        info!(path = %path.display(), "configuration file");
    }

    match dispatch(&cli, &config).await {
        Ok(()) => Ok(()),
        Err(err) => {
            error!("Command failed: {}", err);
            Err(err)
        }
    }
}

fn apply_overrides(cli: &CliArgs, config: &mut AppConfig) {
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    if let Commands::Serve { addr: Some(addr) } = &cli.command {
        config.server.addr = addr.clone();
    }
}

async fn dispatch(cli: &CliArgs, config: &AppConfig) -> Result<()> {
    match &cli.command {
        Commands::Serve { .. } => server::serve(config).await,
        Commands::ShowConfig => {
            let rendered = serde_yaml::to_string(config).context("failed to render config")?;
            println!("{rendered}");
            Ok(())
        }
    }
}
