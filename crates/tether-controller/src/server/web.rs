//! Websocket bridge sessions
//!
//! A browser connects over TLS and speaks websocket frames instead of raw
//! lines. The bridge endpoint starts unauthorized: until the browser sends
//! `auth:<base64 key>:<base64 cert>`, every other frame is dropped. A
//! successful auth opens a nested TLS connection to the controller's own
//! client port using the supplied credentials, and from then on the bridge
//! is a dumb pipe: browser frames go down the nested connection, nested
//! output comes back as HTML-converted frames.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsConnector;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use tether_core::error::TlsError;
use tether_core::tls::{self, Identity};
use tether_core::EndpointKind;

use crate::dispatch;
use crate::endpoint::{EndpointHandle, Outbound};
use crate::state::ControllerState;

type WsSink = SplitSink<WebSocketStream<TlsStream<TcpStream>>, Message>;

#[derive(thiserror::Error, Debug)]
enum BridgeError {
    #[error("Invalid base64 credentials: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("Invalid controller host name: {0}")]
    HostName(#[from] rustls::pki_types::InvalidDnsNameError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Drive one accepted websocket connection to completion
pub async fn run(state: Arc<ControllerState>, stream: TlsStream<TcpStream>) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("Websocket handshake failed: {}", e);
            return;
        }
    };
    let (sink, mut frames) = ws.split();

    let (tx, rx) = mpsc::unbounded_channel();
    let endpoint = Arc::new(EndpointHandle::new(
        EndpointKind::WebClient,
        false,
        Some(state.config.prompt.clone()),
        tx,
    ));
    let writer = tokio::spawn(write_loop(sink, rx));

    state.registry.insert(Arc::clone(&endpoint));
    state.snapshot();
    info!("WebClient connected: {}", endpoint.id);
    endpoint.send(&format!("[{}] WebClient is ready", endpoint.id));

    // Sender into the nested client connection, once authorized
    let mut nested: Option<mpsc::UnboundedSender<String>> = None;

    while let Some(frame) = frames.next().await {
        let msg = match frame {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("Websocket error on {}: {}", endpoint.id, e);
                break;
            }
        };

        if endpoint.is_authorized() {
            if let Some(link) = &nested {
                debug!("Forward with authorized client: {}", msg.trim_end());
                let _ = link.send(msg);
            }
            continue;
        }

        match parse_auth(msg.trim()) {
            Some((key_b64, cert_b64)) => {
                match open_nested(&state, key_b64, cert_b64, Arc::clone(&endpoint)).await {
                    Ok(link) => {
                        endpoint.set_authorized(true);
                        state.snapshot();
                        nested = Some(link);
                    }
                    Err(e) => {
                        warn!("Browser auth failed on {}: {}", endpoint.id, e);
                        endpoint.write("Invalid credentials\n");
                    }
                }
            }
            None => debug!("Ignoring msg (not auth): {}", msg.trim()),
        }
    }

    drop(nested);
    dispatch::disconnect(&state, &endpoint);
    endpoint.close();
    let _ = writer.await;
}

/// Split an `auth:<base64 key>:<base64 cert>` frame into its credential
/// halves
fn parse_auth(msg: &str) -> Option<(&str, &str)> {
    msg.strip_prefix("auth:")?.split_once(':')
}

/// Authorize a browser session by dialing the controller's own client
/// port with the supplied credentials. The nested connection registers
/// under the certificate's common name and pumps bytes both ways until
/// either side closes.
async fn open_nested(
    state: &Arc<ControllerState>,
    key_b64: &str,
    cert_b64: &str,
    endpoint: Arc<EndpointHandle>,
) -> Result<mpsc::UnboundedSender<String>, BridgeError> {
    let key_pem = BASE64.decode(key_b64)?;
    let cert_pem = BASE64.decode(cert_b64)?;

    let identity = Identity::from_pem(&cert_pem, &key_pem)?;
    let signature = identity.common_name()?;

    let tls_config = tls::client_config(&state.config.ca_paths(), Some(identity))?;
    let connector = TlsConnector::from(Arc::new(tls_config));
    let server_name = ServerName::try_from(state.config.host.clone())?;

    let tcp = TcpStream::connect(state.config.client_addr()).await?;
    let mut stream = connector.connect(server_name, tcp).await?;
    info!(
        "Nested client connected for {}: {}",
        endpoint.id, signature
    );

    stream
        .write_all(format!("reg {}\n", signature).as_bytes())
        .await?;
    endpoint.set_signature(&signature);

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(nested_loop(stream, rx, endpoint));
    Ok(tx)
}

/// Pump the nested client connection: browser input down, controller
/// output back up to the websocket.
async fn nested_loop(
    stream: tokio_rustls::client::TlsStream<TcpStream>,
    mut rx: mpsc::UnboundedReceiver<String>,
    endpoint: Arc<EndpointHandle>,
) {
    let (mut read_half, mut write_half) = tokio::io::split(stream);
    let mut buf = [0u8; 4096];

    loop {
        tokio::select! {
            item = rx.recv() => match item {
                Some(line) => {
                    let data = if line.ends_with('\n') {
                        line
                    } else {
                        format!("{}\n", line)
                    };
                    if write_half.write_all(data.as_bytes()).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            read = read_half.read(&mut buf) => match read {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    debug!("Nested client data: {} byte(s)", n);
                    endpoint.write(&String::from_utf8_lossy(&buf[..n]));
                }
            },
        }
    }

    let _ = write_half.shutdown().await;
}

/// Drain the bridge endpoint's outbox into the websocket, converting
/// ANSI escapes to HTML for the browser terminal.
async fn write_loop(mut sink: WsSink, mut rx: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Raw(data) => {
                let html = ansi_to_html::convert(&data).unwrap_or(data);
                if sink.send(Message::text(html)).await.is_err() {
                    break;
                }
            }
            Outbound::Shutdown => break,
        }
    }
    let _ = sink.close().await;
}
