//! Connected-endpoint registry
//!
//! One ordered list per endpoint kind. Insertion order is load-bearing for
//! agents: `ls` output indexes them by position and `use <index>` resolves
//! the same position, so both go through the same snapshot.

use std::sync::{Arc, RwLock};

use tether_core::{EndpointId, EndpointKind};

use crate::endpoint::EndpointHandle;

/// Registry of connected endpoints, ordered per kind by connect time
#[derive(Debug, Default)]
pub struct Registry {
    agents: RwLock<Vec<Arc<EndpointHandle>>>,
    clients: RwLock<Vec<Arc<EndpointHandle>>>,
    web_clients: RwLock<Vec<Arc<EndpointHandle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&self, kind: EndpointKind) -> &RwLock<Vec<Arc<EndpointHandle>>> {
        match kind {
            EndpointKind::Agent => &self.agents,
            EndpointKind::Client => &self.clients,
            EndpointKind::WebClient => &self.web_clients,
        }
    }

    /// Append an endpoint to the list for its kind
    pub fn insert(&self, endpoint: Arc<EndpointHandle>) {
        let mut list = self
            .list(endpoint.kind)
            .write()
            .unwrap_or_else(|e| e.into_inner());
        list.push(endpoint);
    }

    /// Remove an endpoint by id. Idempotent: a second removal is a no-op.
    pub fn remove(&self, id: EndpointId, kind: EndpointKind) -> bool {
        let mut list = self.list(kind).write().unwrap_or_else(|e| e.into_inner());
        let before = list.len();
        list.retain(|ep| ep.id != id);
        list.len() != before
    }

    /// Resolve an endpoint by id across all kinds
    pub fn get(&self, id: EndpointId) -> Option<Arc<EndpointHandle>> {
        for list in [&self.agents, &self.clients, &self.web_clients] {
            let list = list.read().unwrap_or_else(|e| e.into_inner());
            if let Some(ep) = list.iter().find(|ep| ep.id == id) {
                return Some(Arc::clone(ep));
            }
        }
        None
    }

    /// Snapshot of connected agents in connect order
    pub fn agents(&self) -> Vec<Arc<EndpointHandle>> {
        self.agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The agent at a given `ls` index, if the index is in range
    pub fn agent_at(&self, index: usize) -> Option<Arc<EndpointHandle>> {
        self.agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(index)
            .cloned()
    }

    /// Snapshot of connected operator clients
    pub fn clients(&self) -> Vec<Arc<EndpointHandle>> {
        self.clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Snapshot of connected websocket clients
    pub fn web_clients(&self) -> Vec<Arc<EndpointHandle>> {
        self.web_clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// (agents, clients, web clients) counts, for logging and snapshots
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.agents.read().unwrap_or_else(|e| e.into_inner()).len(),
            self.clients.read().unwrap_or_else(|e| e.into_inner()).len(),
            self.web_clients
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::test_support::handle;

    #[test]
    fn test_insert_preserves_order() {
        let registry = Registry::new();
        let (a1, _) = handle(EndpointKind::Agent);
        let (a2, _) = handle(EndpointKind::Agent);
        let first = a1.id;

        registry.insert(a1);
        registry.insert(a2);

        let agents = registry.agents();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].id, first);
        assert_eq!(registry.agent_at(0).map(|a| a.id), Some(first));
        assert!(registry.agent_at(2).is_none());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = Registry::new();
        let (client, _) = handle(EndpointKind::Client);
        let id = client.id;

        registry.insert(client);
        assert!(registry.remove(id, EndpointKind::Client));
        assert!(!registry.remove(id, EndpointKind::Client));
        assert_eq!(registry.counts(), (0, 0, 0));
    }

    #[test]
    fn test_get_searches_all_kinds() {
        let registry = Registry::new();
        let (web, _) = handle(EndpointKind::WebClient);
        let id = web.id;

        registry.insert(web);
        assert_eq!(registry.get(id).map(|ep| ep.kind), Some(EndpointKind::WebClient));
        assert!(registry.get(EndpointId::new()).is_none());
    }
}
