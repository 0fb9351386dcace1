//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque unique identifier for an endpoint.
///
/// Generated at construction, immutable, used for log correlation and
/// registry membership tests. Never used for security decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(Uuid);

impl EndpointId {
    /// Generate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EndpointId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// The concrete variant of a connected endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointKind {
    /// Command-executing remote host
    Agent,
    /// Operator terminal session
    Client,
    /// Websocket-bridged browser session
    WebClient,
}

impl EndpointKind {
    /// Human-readable label, used in the ready banner
    pub fn label(&self) -> &'static str {
        match self {
            EndpointKind::Agent => "Agent",
            EndpointKind::Client => "Client",
            EndpointKind::WebClient => "WebClient",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKind::Agent => write!(f, "agent"),
            EndpointKind::Client => write!(f, "client"),
            EndpointKind::WebClient => write!(f, "web-client"),
        }
    }
}
