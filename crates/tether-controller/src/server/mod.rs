//! TLS listeners and connection intake
//!
//! The controller runs three listeners off one server identity: the agent
//! port, the client port, and the websocket bridge port. Startup is split
//! into init (load TLS material), listen (bind sockets), and serve (accept
//! loops), so tests can bind ephemeral ports and learn the real addresses
//! before any traffic flows.

mod session;
mod web;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tether_core::tls::{self, Identity};
use tether_core::{CoreError, EndpointKind};

use crate::state::ControllerState;

/// What connections on a listener become
#[derive(Debug, Clone, Copy)]
enum Intake {
    Agent,
    Client,
    Web,
}

/// Bound listener sockets, exposed so callers can learn ephemeral ports
pub struct BoundListeners {
    pub agent_addr: SocketAddr,
    pub client_addr: SocketAddr,
    pub web_addr: SocketAddr,
    agent: TcpListener,
    client: TcpListener,
    web: TcpListener,
}

pub struct ControllerServer {
    state: Arc<ControllerState>,
    acceptor: TlsAcceptor,
    shutdown: CancellationToken,
}

impl ControllerServer {
    /// Load TLS material and build the shared acceptor.
    ///
    /// Unreadable certificate material is fatal here, before anything
    /// binds.
    pub fn init(
        state: Arc<ControllerState>,
        shutdown: CancellationToken,
    ) -> Result<Self, CoreError> {
        let config = &state.config;
        let identity = Identity::from_files(
            &config.cert_path(&config.server_cert),
            &config.cert_path(&config.server_key),
        )?;
        let tls_config = tls::server_config(identity, &config.ca_paths())?;

        Ok(Self {
            state,
            acceptor: TlsAcceptor::from(Arc::new(tls_config)),
            shutdown,
        })
    }

    /// Bind all three listener sockets
    pub async fn listen(&self) -> Result<BoundListeners, CoreError> {
        let config = &self.state.config;

        let agent = TcpListener::bind(config.agent_addr()).await?;
        let client = TcpListener::bind(config.client_addr()).await?;
        let web = TcpListener::bind(config.web_addr()).await?;

        let bound = BoundListeners {
            agent_addr: agent.local_addr()?,
            client_addr: client.local_addr()?,
            web_addr: web.local_addr()?,
            agent,
            client,
            web,
        };

        info!("Agent server listening: {}", bound.agent_addr);
        info!("Client server listening: {}", bound.client_addr);
        info!("Websocket server listening: {}", bound.web_addr);
        Ok(bound)
    }

    /// Accept connections on all three listeners until shutdown
    pub async fn serve(self, bound: BoundListeners) {
        let BoundListeners {
            agent, client, web, ..
        } = bound;

        tokio::join!(
            self.accept_loop(agent, Intake::Agent),
            self.accept_loop(client, Intake::Client),
            self.accept_loop(web, Intake::Web),
        );
        info!("Controller shut down");
    }

    /// Convenience wrapper: listen then serve
    pub async fn run(self) -> Result<(), CoreError> {
        let bound = self.listen().await?;
        self.serve(bound).await;
        Ok(())
    }

    async fn accept_loop(&self, listener: TcpListener, intake: Intake) {
        loop {
            let socket = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((socket, _)) => socket,
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        continue;
                    }
                },
            };

            let peer = socket.peer_addr().ok();
            let acceptor = self.acceptor.clone();
            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let stream = match acceptor.accept(socket).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!("TLS handshake failed from {:?}: {}", peer, e);
                        return;
                    }
                };

                match intake {
                    Intake::Agent => session::run(state, stream, EndpointKind::Agent).await,
                    Intake::Client => session::run(state, stream, EndpointKind::Client).await,
                    Intake::Web => web::run(state, stream).await,
                }
            });
        }
    }
}
