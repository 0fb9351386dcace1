//! Controller-side endpoint handles
//!
//! One [`EndpointHandle`] exists per live connection, shared between the
//! session task that owns the transport and the dispatch code that needs
//! to reach an endpoint's peer. The handle never touches the socket
//! directly: all output goes through an unbounded channel drained by the
//! connection's writer task, so dispatch stays synchronous and lock-cheap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use tokio::sync::mpsc;

use tether_core::{EndpointId, EndpointKind, SystemInfo};
use tether_protocol::CommandSet;

/// A unit of output handed to a connection's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Bytes written to the transport exactly as given
    Raw(String),
    /// Flush and close the transport
    Shutdown,
}

/// Shared controller-side state for one connected endpoint
#[derive(Debug)]
pub struct EndpointHandle {
    /// Opaque id, fixed at construction
    pub id: EndpointId,
    /// Endpoint variant, fixed at construction
    pub kind: EndpointKind,
    /// Commands this endpoint may issue while unbound
    pub commands: CommandSet,
    authorized: AtomicBool,
    signature: RwLock<String>,
    prompt: Mutex<Option<String>>,
    system_info: Mutex<SystemInfo>,
    outbox: mpsc::UnboundedSender<Outbound>,
    disconnecting: AtomicBool,
}

impl EndpointHandle {
    pub fn new(
        kind: EndpointKind,
        authorized: bool,
        prompt: Option<String>,
        outbox: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        let commands = match kind {
            EndpointKind::Agent => CommandSet::base(),
            EndpointKind::Client | EndpointKind::WebClient => CommandSet::client(),
        };
        let id = EndpointId::new();
        Self {
            id,
            kind,
            commands,
            authorized: AtomicBool::new(authorized),
            // Until reg, the signature is just the id
            signature: RwLock::new(id.to_string()),
            prompt: Mutex::new(prompt),
            system_info: Mutex::new(SystemInfo::capture()),
            outbox,
            disconnecting: AtomicBool::new(false),
        }
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    /// Flip the authorization state; used by the websocket bridge once a
    /// browser session proves its credentials.
    pub fn set_authorized(&self, authorized: bool) {
        self.authorized.store(authorized, Ordering::SeqCst);
    }

    pub fn signature(&self) -> String {
        self.signature
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_signature(&self, signature: &str) {
        *self.signature.write().unwrap_or_else(|e| e.into_inner()) = signature.to_string();
    }

    pub fn prompt(&self) -> Option<String> {
        self.prompt.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_prompt(&self, prompt: Option<String>) {
        *self.prompt.lock().unwrap_or_else(|e| e.into_inner()) = prompt;
    }

    /// Working directory tracked for this endpoint's remote host
    pub fn cwd(&self) -> String {
        self.system_info
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cwd
            .clone()
    }

    pub fn set_cwd(&self, cwd: &str) {
        self.system_info
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cwd = cwd.to_string();
    }

    pub fn system_info(&self) -> SystemInfo {
        self.system_info
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Write raw bytes to the transport. Send failures mean the writer
    /// task is already gone and are ignored.
    pub fn write(&self, data: &str) {
        let _ = self.outbox.send(Outbound::Raw(data.to_string()));
    }

    /// Write one newline-terminated line
    pub fn write_line(&self, line: &str) {
        self.write(&format!("{}\n", line));
    }

    /// Write a message followed by this endpoint's prompt on a fresh line.
    ///
    /// Prompt-less endpoints (agents) receive nothing: protocol replies
    /// are for interactive sessions only.
    pub fn send(&self, msg: &str) {
        if let Some(prompt) = self.prompt() {
            self.write(&format!("{}\n{}", msg, prompt));
        }
    }

    /// Like [`send`](Self::send) but without re-showing the prompt,
    /// for farewell messages on a closing connection.
    pub fn send_final(&self, msg: &str) {
        if self.prompt().is_some() {
            self.write(msg);
        }
    }

    /// Redraw the prompt on its own fresh line
    pub fn show_prompt(&self) {
        if let Some(prompt) = self.prompt() {
            self.write(&format!("\n{}", prompt));
        }
    }

    /// Ask the writer task to flush and close the transport
    pub fn close(&self) {
        let _ = self.outbox.send(Outbound::Shutdown);
    }

    /// First call returns true; later calls false. Makes teardown
    /// idempotent when the reader loop and an explicit `exit` race.
    pub fn begin_disconnect(&self) -> bool {
        !self.disconnecting.swap(true, Ordering::SeqCst)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{drain, handle};
    use super::*;

    #[test]
    fn test_send_appends_prompt() {
        let (client, mut rx) = handle(EndpointKind::Client);
        client.send("pong");
        assert_eq!(drain(&mut rx), "pong\ntether> ");
    }

    #[test]
    fn test_send_is_noop_without_prompt() {
        let (agent, mut rx) = handle(EndpointKind::Agent);
        agent.send("pong");
        assert_eq!(drain(&mut rx), "");
    }

    #[test]
    fn test_write_line_terminates() {
        let (agent, mut rx) = handle(EndpointKind::Agent);
        agent.write_line("echo hi");
        assert_eq!(drain(&mut rx), "echo hi\n");
    }

    #[test]
    fn test_begin_disconnect_once() {
        let (client, _rx) = handle(EndpointKind::Client);
        assert!(client.begin_disconnect());
        assert!(!client.begin_disconnect());
    }

    #[test]
    fn test_write_after_writer_gone_is_ignored() {
        let (client, rx) = handle(EndpointKind::Client);
        drop(rx);
        client.write("anyone there?");
        client.close();
    }
}
