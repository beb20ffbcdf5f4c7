//! Thread-safe registry of live peers keyed by network address.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::events::{EventEmitter, PeerEvent};
use crate::peer::Peer;

/// Result of a peer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterResult {
    New,
    /// A different handle held the address; it has been closed.
    Replaced,
    /// The same handle was registered twice.
    SamePeer,
}

/// Live peer set shared by the connection layer and the monitor loops.
///
/// Every query returns a point-in-time snapshot; the lock is never held across
/// caller code. Removing a peer closes it.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<SocketAddr, Arc<Peer>>>,
    events: EventEmitter,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer under its address. Returns what was replaced (if anything).
    pub fn register(&self, peer: Arc<Peer>) -> RegisterResult {
        let addr = peer.addr();
        let direction = peer.connection().map(|c| c.direction());

        let old = self.peers.write().insert(addr, Arc::clone(&peer));
        match old {
            Some(old) if Arc::ptr_eq(&old, &peer) => RegisterResult::SamePeer,
            Some(old) => {
                old.close();
                debug!(%addr, "replaced registered peer");
                self.events.peer_replaced(addr);
                RegisterResult::Replaced
            }
            None => {
                debug!(%addr, ?direction, "peer registered");
                self.events.peer_registered(addr, direction);
                RegisterResult::New
            }
        }
    }

    /// Remove and close the peer at `addr`. Absent addresses are a no-op.
    pub fn remove(&self, addr: &SocketAddr) -> Option<Arc<Peer>> {
        let removed = self.peers.write().remove(addr);
        match &removed {
            Some(peer) => {
                peer.close();
                debug!(%addr, "peer removed");
                self.events.peer_removed(*addr);
            }
            None => trace!(%addr, "remove of unregistered peer"),
        }
        removed
    }

    /// Remove and close `peer` only if it is still the handle registered at
    /// its address. Returns false when the address is empty or now held by a
    /// different handle.
    pub fn remove_peer(&self, peer: &Peer) -> bool {
        let addr = peer.addr();
        let removed = {
            let mut peers = self.peers.write();
            match peers.get(&addr) {
                Some(current) if std::ptr::eq(Arc::as_ptr(current), peer) => peers.remove(&addr),
                _ => None,
            }
        };
        match removed {
            Some(peer) => {
                peer.close();
                debug!(%addr, "peer removed");
                self.events.peer_removed(addr);
                true
            }
            None => {
                trace!(%addr, "peer handle no longer registered");
                false
            }
        }
    }

    /// Whether `peer` is the handle currently registered at its address.
    pub fn is_current(&self, peer: &Peer) -> bool {
        self.peers
            .read()
            .get(&peer.addr())
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), peer))
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<Arc<Peer>> {
        self.peers.read().get(addr).map(Arc::clone)
    }

    pub fn has(&self, addr: &SocketAddr) -> bool {
        self.peers.read().contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.peers.read().keys().copied().collect()
    }

    /// All tracked peers, including ones still establishing their link.
    pub fn registered_peers(&self) -> Vec<Arc<Peer>> {
        self.peers.read().values().map(Arc::clone).collect()
    }

    /// Peers usable for requests (see [`Peer::is_active`]).
    pub fn active_peers(&self) -> Vec<Arc<Peer>> {
        self.peers
            .read()
            .values()
            .filter(|peer| peer.is_active())
            .map(Arc::clone)
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.events.subscribe()
    }

    /// Remove and close every peer.
    pub fn clear(&self) {
        let drained: Vec<_> = self.peers.write().drain().collect();
        for (addr, peer) in drained {
            peer.close();
            self.events.peer_removed(addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::Direction;

    fn addr(n: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, n], 13802))
    }

    #[test]
    fn test_registry_basic() {
        let registry = PeerRegistry::new();
        let peer = Arc::new(Peer::connected(addr(1), Direction::Outbound));

        assert!(registry.is_empty());
        assert_eq!(registry.register(Arc::clone(&peer)), RegisterResult::New);
        assert_eq!(registry.len(), 1);
        assert!(registry.has(&addr(1)));
        assert!(Arc::ptr_eq(&registry.get(&addr(1)).unwrap(), &peer));
    }

    #[test]
    fn test_registry_same_peer() {
        let registry = PeerRegistry::new();
        let peer = Arc::new(Peer::connected(addr(1), Direction::Outbound));

        registry.register(Arc::clone(&peer));
        assert_eq!(registry.register(Arc::clone(&peer)), RegisterResult::SamePeer);
        assert_eq!(registry.len(), 1);
        assert!(peer.is_running());
    }

    #[test]
    fn test_registry_replaced_closes_old() {
        let registry = PeerRegistry::new();
        let old = Arc::new(Peer::connected(addr(1), Direction::Outbound));
        let new = Arc::new(Peer::connected(addr(1), Direction::Inbound));

        registry.register(Arc::clone(&old));
        assert_eq!(registry.register(Arc::clone(&new)), RegisterResult::Replaced);
        assert_eq!(registry.len(), 1);
        assert!(!old.has_connection());
        assert!(new.is_active());
    }

    #[test]
    fn test_registry_remove_closes_and_is_idempotent() {
        let registry = PeerRegistry::new();
        let peer = Arc::new(Peer::connected(addr(1), Direction::Outbound));
        registry.register(Arc::clone(&peer));

        assert!(registry.remove(&addr(1)).is_some());
        assert!(!peer.is_running());
        assert!(!peer.has_connection());
        assert!(registry.is_empty());

        assert!(registry.remove(&addr(1)).is_none());
    }

    #[test]
    fn test_remove_peer_ignores_replaced_handle() {
        let registry = PeerRegistry::new();
        let old = Arc::new(Peer::connected(addr(1), Direction::Outbound));
        let new = Arc::new(Peer::connected(addr(1), Direction::Inbound));
        registry.register(Arc::clone(&old));
        registry.register(Arc::clone(&new));

        assert!(!registry.is_current(&old));
        assert!(!registry.remove_peer(&old));
        assert!(registry.is_current(&new));
        assert!(new.is_active());

        assert!(registry.remove_peer(&new));
        assert!(!new.is_running());
        assert!(!registry.remove_peer(&new));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_active_subset() {
        let registry = PeerRegistry::new();
        registry.register(Arc::new(Peer::connected(addr(1), Direction::Outbound)));
        registry.register(Arc::new(Peer::new(addr(2))));

        let stopped = Arc::new(Peer::connected(addr(3), Direction::Inbound));
        stopped.set_running(false);
        registry.register(stopped);

        assert_eq!(registry.registered_peers().len(), 3);
        let active = registry.active_peers();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].addr(), addr(1));
    }

    #[tokio::test]
    async fn test_registry_events() {
        let registry = PeerRegistry::new();
        let mut rx = registry.subscribe();

        registry.register(Arc::new(Peer::connected(addr(1), Direction::Inbound)));
        registry.remove(&addr(1));

        assert_eq!(
            rx.recv().await.unwrap(),
            PeerEvent::Registered {
                addr: addr(1),
                direction: Some(Direction::Inbound),
            }
        );
        assert_eq!(rx.recv().await.unwrap(), PeerEvent::Removed { addr: addr(1) });
    }

    #[test]
    fn test_registry_clear() {
        let registry = PeerRegistry::new();
        for i in 1..=5 {
            registry.register(Arc::new(Peer::connected(addr(i), Direction::Outbound)));
        }
        assert_eq!(registry.addrs().len(), 5);

        let peers = registry.registered_peers();
        registry.clear();
        assert!(registry.is_empty());
        assert!(peers.iter().all(|p| !p.is_running()));
    }
}
