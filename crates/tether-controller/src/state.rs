//! Shared controller state
//!
//! One [`ControllerState`] is created at startup and shared by every
//! session task. It owns the registry and the pairing table; endpoints
//! reach each other only by resolving ids through it.

use std::sync::Arc;

use serde_json::json;

use tether_core::{EndpointId, SnapshotStore, SystemInfo};
use tether_core::config::ControllerConfig;

use crate::endpoint::EndpointHandle;
use crate::pairs::PairTable;
use crate::registry::Registry;

pub struct ControllerState {
    /// This controller's own id, used as the snapshot key
    pub id: EndpointId,
    pub config: ControllerConfig,
    pub registry: Registry,
    pub pairs: PairTable,
    pub snapshots: Arc<SnapshotStore>,
    pub system_info: SystemInfo,
}

impl ControllerState {
    pub fn new(config: ControllerConfig) -> Arc<Self> {
        let snapshots = Arc::new(SnapshotStore::new(config.snapshot_dir.clone()));
        Arc::new(Self {
            id: EndpointId::new(),
            config,
            registry: Registry::new(),
            pairs: PairTable::new(),
            snapshots,
            system_info: SystemInfo::capture(),
        })
    }

    /// Resolve the live peer of an endpoint.
    ///
    /// A recorded peer id whose endpoint has already disconnected (a stale
    /// pairing entry) resolves to `None`, i.e. the endpoint is unbound.
    pub fn peer_of(&self, id: EndpointId) -> Option<Arc<EndpointHandle>> {
        let peer_id = self.pairs.peer_of(id)?;
        self.registry.get(peer_id)
    }

    /// Queue a best-effort snapshot of the current registry.
    ///
    /// No-op when snapshots are disabled or no runtime is running.
    pub fn snapshot(&self) {
        if !self.snapshots.enabled() {
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return;
        }

        let describe = |eps: Vec<Arc<EndpointHandle>>| -> Vec<serde_json::Value> {
            eps.iter()
                .map(|ep| {
                    json!({
                        "id": ep.id.to_string(),
                        "signature": ep.signature(),
                        "authorized": ep.is_authorized(),
                    })
                })
                .collect()
        };

        let value = json!({
            "id": self.id.to_string(),
            "host": self.system_info,
            "agents": describe(self.registry.agents()),
            "clients": describe(self.registry.clients()),
            "web_clients": describe(self.registry.web_clients()),
        });

        self.snapshots
            .record_detached(format!("controllers/{}", self.id), value);
    }
}
