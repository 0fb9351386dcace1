//! tether CLI
//!
//! Single binary for all tether roles:
//! - Controller (broker that agents and clients connect to)
//! - Agent (executes relayed commands on this host)
//! - Operator client (interactive session against a controller)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether_controller::{ControllerServer, ControllerState};
use tether_core::config::{self, AgentConfig, ClientConfig, ControllerConfig};
use tether_core::tls::{self, Identity};

#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about = "TLS relay mesh for remote shell access")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the controller
    /// Alias: start
    #[command(alias = "start")]
    Serve {
        /// Bind host (overrides config)
        #[arg(short, long)]
        bind: Option<String>,

        /// Directory for best-effort JSON state snapshots
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,
    },

    /// Run an agent on this host
    /// Alias: join
    #[command(alias = "join")]
    Agent {
        /// Controller to connect to (host or host:port)
        target: Option<String>,

        /// Shell used to execute relayed lines
        #[arg(long)]
        shell: Option<String>,
    },

    /// Open an interactive operator session against a controller
    Connect {
        /// Controller to connect to (host or host:port)
        target: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve { bind, snapshot_dir } => serve(cli.config, bind, snapshot_dir).await,
        Commands::Agent { target, shell } => agent(cli.config, target, shell).await,
        Commands::Connect { target } => connect(cli.config, target).await,
    }
}

/// Load a config file if present, falling back to defaults
fn load_or_default<T: serde::de::DeserializeOwned + Default>(
    path: Option<PathBuf>,
    name: &str,
) -> T {
    let path = path.unwrap_or_else(|| config::default_config_dir().join(name));
    if path.exists() {
        config::load_config(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}", path, e);
            T::default()
        })
    } else {
        T::default()
    }
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            token.cancel();
        }
    });
    shutdown
}

async fn serve(
    config_path: Option<PathBuf>,
    bind: Option<String>,
    snapshot_dir: Option<PathBuf>,
) -> Result<()> {
    let mut config: ControllerConfig = load_or_default(config_path, "controller.toml");
    if let Some(bind) = bind {
        config.host = bind;
    }
    if let Some(dir) = snapshot_dir {
        config.snapshot_dir = Some(dir);
    }

    tracing::info!("tether controller starting...");

    let state = ControllerState::new(config);
    let shutdown = shutdown_on_ctrl_c();
    let server = ControllerServer::init(Arc::clone(&state), shutdown.clone())
        .context("Failed to load controller TLS material")?;

    server.run().await.context("Controller failed")?;
    Ok(())
}

async fn agent(
    config_path: Option<PathBuf>,
    target: Option<String>,
    shell: Option<String>,
) -> Result<()> {
    let mut config: AgentConfig = load_or_default(config_path, "agent.toml");
    if let Some(target) = target {
        apply_target(&mut config.controller_host, &mut config.controller_port, &target)?;
    }
    if let Some(shell) = shell {
        config.shell = shell;
    }

    tracing::info!("Connecting to controller at {}", config.controller_addr());

    let shutdown = shutdown_on_ctrl_c();
    tether_agent::run(config, shutdown)
        .await
        .context("Agent connection loop failed")?;
    Ok(())
}

/// Pipe stdin and the relay socket into each other until either closes
async fn connect(config_path: Option<PathBuf>, target: Option<String>) -> Result<()> {
    let mut config: ClientConfig = load_or_default(config_path, "client.toml");
    if let Some(target) = target {
        apply_target(&mut config.controller_host, &mut config.controller_port, &target)?;
    }

    let identity = Identity::from_files(
        &config.cert_path(&config.cert),
        &config.cert_path(&config.key),
    )
    .context("Failed to load client certificate material")?;
    let tls_config = tls::client_config(&[config.cert_path(&config.ca)], Some(identity))
        .context("Failed to build TLS configuration")?;

    let connector = TlsConnector::from(Arc::new(tls_config));
    let server_name = ServerName::try_from(config.controller_host.clone())
        .context("Invalid controller host name")?;

    let tcp = TcpStream::connect(config.controller_addr())
        .await
        .with_context(|| format!("Cannot reach controller at {}", config.controller_addr()))?;
    let stream = connector
        .connect(server_name, tcp)
        .await
        .context("TLS handshake with controller failed")?;
    tracing::info!("Connected to controller at {}", config.controller_addr());

    let (mut read_half, mut write_half) = tokio::io::split(stream);
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();

    let mut inbound = [0u8; 4096];
    let mut outbound = [0u8; 4096];
    loop {
        tokio::select! {
            read = read_half.read(&mut inbound) => match read {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    stdout.write_all(&inbound[..n]).await?;
                    stdout.flush().await?;
                }
            },
            read = stdin.read(&mut outbound) => match read {
                Ok(0) | Err(_) => break,
                Ok(n) => write_half.write_all(&outbound[..n]).await?,
            },
        }
    }

    let _ = write_half.shutdown().await;
    Ok(())
}

/// Apply a `host` or `host:port` override
fn apply_target(host: &mut String, port: &mut u16, target: &str) -> Result<()> {
    match target.rsplit_once(':') {
        Some((h, p)) => {
            *host = h.to_string();
            *port = p.parse().with_context(|| format!("Invalid port: {}", p))?;
        }
        None => *host = target.to_string(),
    }
    Ok(())
}
