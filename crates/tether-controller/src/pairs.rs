//! Relay pair bookkeeping
//!
//! The controller owns the pairing relation: endpoints never hold
//! references to their peer and always resolve it here by id. Binding
//! inserts both directions. Unbinding removes only the caller's own
//! direction; the disconnect path clears the other side when it tears
//! the peer down. Re-binding an endpoint that already has a peer
//! overwrites its own entry but leaves the abandoned peer's reverse
//! entry pointing at it, so lookups must tolerate stale ids.

use std::collections::HashMap;
use std::sync::Mutex;

use tether_core::EndpointId;

/// Symmetric (but imperfectly maintained) endpoint pairing table
#[derive(Debug, Default)]
pub struct PairTable {
    inner: Mutex<HashMap<EndpointId, EndpointId>>,
}

impl PairTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind two endpoints into a relay pair, both directions at once.
    ///
    /// Existing entries for either id are overwritten; reverse entries of
    /// any abandoned former peers are left behind.
    pub fn bind(&self, a: EndpointId, b: EndpointId) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.insert(a, b);
        inner.insert(b, a);
    }

    /// The peer currently recorded for this endpoint, if any.
    ///
    /// The returned id may be stale; callers resolve it against the
    /// registry and treat a miss as unbound.
    pub fn peer_of(&self, id: EndpointId) -> Option<EndpointId> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.get(&id).copied()
    }

    /// Remove this endpoint's own entry, returning its former peer
    pub fn unbind(&self, id: EndpointId) -> Option<EndpointId> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.remove(&id)
    }

    /// Number of directed entries currently recorded
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_is_symmetric() {
        let pairs = PairTable::new();
        let (a, b) = (EndpointId::new(), EndpointId::new());

        pairs.bind(a, b);
        assert_eq!(pairs.peer_of(a), Some(b));
        assert_eq!(pairs.peer_of(b), Some(a));
    }

    #[test]
    fn test_unbind_removes_one_direction() {
        let pairs = PairTable::new();
        let (a, b) = (EndpointId::new(), EndpointId::new());

        pairs.bind(a, b);
        assert_eq!(pairs.unbind(a), Some(b));
        assert_eq!(pairs.peer_of(a), None);
        // The other direction survives until its owner is torn down
        assert_eq!(pairs.peer_of(b), Some(a));
    }

    #[test]
    fn test_rebind_leaves_stale_reverse_entry() {
        let pairs = PairTable::new();
        let client = EndpointId::new();
        let (a1, a2) = (EndpointId::new(), EndpointId::new());

        pairs.bind(client, a1);
        pairs.bind(client, a2);

        assert_eq!(pairs.peer_of(client), Some(a2));
        assert_eq!(pairs.peer_of(a2), Some(client));
        // Abandoned agent still points at the client
        assert_eq!(pairs.peer_of(a1), Some(client));
    }

    #[test]
    fn test_unbind_unknown_id_is_none() {
        let pairs = PairTable::new();
        assert_eq!(pairs.unbind(EndpointId::new()), None);
    }
}
