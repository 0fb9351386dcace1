//! Controller connection loop
//!
//! The agent dials the controller's agent port over TLS, registers under
//! its `user@host` signature, and then answers relayed action lines until
//! the connection drops or a `stop` arrives. Dropped connections are
//! retried forever with a flat delay; `stop` and an external shutdown
//! signal end the loop cleanly.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rustls::pki_types::ServerName;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tether_core::config::AgentConfig;
use tether_core::error::TlsError;
use tether_core::tls::{self, Identity};
use tether_core::{CoreError, SystemInfo};
use tether_protocol::LineCodec;

use crate::shell::{Reply, ShellExecutor};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Why a connection ended
enum Outcome {
    /// The controller asked us to stop
    Stopped,
    /// The connection dropped; reconnect
    Disconnected,
}

/// Run the agent until stopped or shut down externally
pub async fn run(config: AgentConfig, shutdown: CancellationToken) -> Result<(), CoreError> {
    let executor = ShellExecutor::new(&config.shell, &config.controller_prompt);
    let connector = build_connector(&config)?;
    let server_name =
        ServerName::try_from(config.controller_host.clone()).map_err(TlsError::from)?;

    loop {
        let session = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            session = connect_once(&config, &connector, &server_name, &executor, &shutdown) => session,
        };

        match session {
            Ok(Outcome::Stopped) => {
                info!("Stop requested by controller");
                return Ok(());
            }
            Ok(Outcome::Disconnected) => {
                warn!("Disconnected from controller");
            }
            Err(e) => {
                error!("Connection failed: {}", e);
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
        info!("Reconnecting...");
    }
}

fn build_connector(config: &AgentConfig) -> Result<TlsConnector, CoreError> {
    let identity = Identity::from_files(
        &config.cert_path(&config.cert),
        &config.cert_path(&config.key),
    )?;
    let tls_config = tls::client_config(&[config.cert_path(&config.ca)], Some(identity))?;
    Ok(TlsConnector::from(Arc::new(tls_config)))
}

async fn connect_once(
    config: &AgentConfig,
    connector: &TlsConnector,
    server_name: &ServerName<'static>,
    executor: &ShellExecutor,
    shutdown: &CancellationToken,
) -> Result<Outcome, CoreError> {
    let tcp = TcpStream::connect(config.controller_addr()).await?;
    let stream = connector.connect(server_name.clone(), tcp).await?;
    info!("Connected to controller: {}", config.controller_addr());

    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut lines = FramedRead::new(read_half, LineCodec::new());

    let signature = SystemInfo::capture().signature();
    write_half
        .write_all(format!("reg {}\n", signature).as_bytes())
        .await?;
    info!("Registered as: {}", signature);

    loop {
        let item = tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = write_half.shutdown().await;
                return Ok(Outcome::Stopped);
            }
            item = lines.next() => item,
        };

        let line = match item {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                error!("Protocol error: {}", e);
                return Ok(Outcome::Disconnected);
            }
            None => return Ok(Outcome::Disconnected),
        };

        match executor.handle(&line).await {
            Reply::Ignore => {}
            Reply::Stop => {
                let _ = write_half.shutdown().await;
                return Ok(Outcome::Stopped);
            }
            Reply::Output(response) => {
                write_half
                    .write_all(format!("{}\n", response).as_bytes())
                    .await?;
            }
        }
    }
}
