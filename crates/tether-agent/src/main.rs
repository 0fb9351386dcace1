//! tether agent daemon
//!
//! Connects out to a controller and executes relayed command lines on
//! this host.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether_core::config::{self, AgentConfig};

#[derive(Parser)]
#[command(name = "tether-agent")]
#[command(about = "tether agent - executes relayed commands for a controller")]
#[command(version)]
struct Args {
    /// Controller to connect to (host or host:port)
    #[arg(short = 'o', long)]
    controller: Option<String>,

    /// Directory holding certificate material
    #[arg(long)]
    certs_dir: Option<PathBuf>,

    /// Shell used to execute relayed lines
    #[arg(long)]
    shell: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("tether agent starting...");

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config::default_config_dir().join("agent.toml"));

    let mut config = if config_path.exists() {
        config::load_config(&config_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}", config_path, e);
            AgentConfig::default()
        })
    } else {
        AgentConfig::default()
    };

    if let Some(controller) = args.controller {
        match controller.rsplit_once(':') {
            Some((host, port)) => {
                config.controller_host = host.to_string();
                config.controller_port = port
                    .parse()
                    .with_context(|| format!("Invalid controller port: {}", port))?;
            }
            None => config.controller_host = controller,
        }
    }
    if let Some(certs_dir) = args.certs_dir {
        config.certs_dir = certs_dir;
    }
    if let Some(shell) = args.shell {
        config.shell = shell;
    }

    tracing::info!("Connecting to controller at {}", config.controller_addr());

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    tether_agent::run(config, shutdown)
        .await
        .context("Agent connection loop failed")?;
    Ok(())
}
