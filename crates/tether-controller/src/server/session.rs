//! Socket endpoint sessions
//!
//! One session per accepted agent or client connection. The reader half
//! is line-framed and feeds dispatch; the writer half drains the
//! endpoint's outbox. Output ordering is the channel's FIFO order, so
//! everything dispatch queues arrives in the order it was queued.

use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::server::TlsStream;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info};

use tether_core::tls::peer_common_name;
use tether_core::EndpointKind;
use tether_protocol::LineCodec;

use crate::dispatch;
use crate::endpoint::{EndpointHandle, Outbound};
use crate::state::ControllerState;

/// Drive one accepted TLS connection to completion
pub async fn run(state: Arc<ControllerState>, stream: TlsStream<TcpStream>, kind: EndpointKind) {
    // Client connections must prove themselves with a CA-verified peer
    // certificate; agent connections are accepted either way.
    let peer_certs = stream.get_ref().1.peer_certificates();
    let has_cert = peer_certs.is_some_and(|certs| !certs.is_empty());
    let authorized = has_cert || kind == EndpointKind::Agent;

    if let Some(cert) = peer_certs.and_then(|certs| certs.first()) {
        match peer_common_name(cert) {
            Ok(cn) => debug!("Peer certificate CN: {}", cn),
            Err(e) => debug!("Peer certificate: {}", e),
        }
    }

    let prompt = match kind {
        EndpointKind::Agent => None,
        _ => Some(state.config.prompt.clone()),
    };

    let (read_half, write_half) = tokio::io::split(stream);
    let (tx, rx) = mpsc::unbounded_channel();
    let endpoint = Arc::new(EndpointHandle::new(kind, authorized, prompt, tx));
    let writer = tokio::spawn(write_loop(write_half, rx));

    state.registry.insert(Arc::clone(&endpoint));
    state.snapshot();
    let (agents, clients, web_clients) = state.registry.counts();
    debug!(
        "{} agent(s) | {} client(s) | {} web client(s)",
        agents, clients, web_clients
    );

    if authorized {
        info!("{} connected: {}", kind.label(), endpoint.id);
        endpoint.send(&format!("[{}] {} is ready", endpoint.id, kind.label()));
    } else {
        error!("Unauthorized: no verified peer certificate ({})", endpoint.id);
    }

    let mut lines = FramedRead::new(read_half, LineCodec::new());
    while let Some(item) = lines.next().await {
        match item {
            Ok(line) => {
                if endpoint.is_authorized() {
                    dispatch::dispatch_line(&state, &endpoint, &line);
                } else {
                    debug!("Dropping line from unauthorized {}", endpoint.id);
                }
            }
            Err(e) => {
                error!("{}: {}", endpoint.id, e);
                break;
            }
        }
    }

    dispatch::disconnect(&state, &endpoint);
    endpoint.close();
    let _ = writer.await;
}

/// Drain an endpoint's outbox into its transport
pub(super) async fn write_loop<W>(mut transport: WriteHalf<W>, mut rx: mpsc::UnboundedReceiver<Outbound>)
where
    W: AsyncWrite,
{
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Raw(data) => {
                if transport.write_all(data.as_bytes()).await.is_err() {
                    break;
                }
            }
            Outbound::Shutdown => break,
        }
    }
    let _ = transport.shutdown().await;
}
