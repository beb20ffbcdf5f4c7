//! Registry events and non-blocking broadcast emitter.

use std::net::SocketAddr;

use tokio::sync::broadcast;

use crate::peer::Direction;

/// Peer registry events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Registered {
        addr: SocketAddr,
        direction: Option<Direction>,
    },
    /// A new handle took over the address; the old one was closed.
    Replaced {
        addr: SocketAddr,
    },
    Removed {
        addr: SocketAddr,
    },
}

impl PeerEvent {
    pub fn addr(&self) -> SocketAddr {
        match self {
            Self::Registered { addr, .. } | Self::Replaced { addr } | Self::Removed { addr } => {
                *addr
            }
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, Self::Removed { .. })
    }
}

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Non-blocking broadcast emitter. Slow subscribers drop events independently.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<PeerEvent>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: PeerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn peer_registered(&self, addr: SocketAddr, direction: Option<Direction>) {
        self.emit(PeerEvent::Registered { addr, direction });
    }

    pub fn peer_replaced(&self, addr: SocketAddr) {
        self.emit(PeerEvent::Replaced { addr });
    }

    pub fn peer_removed(&self, addr: SocketAddr) {
        self.emit(PeerEvent::Removed { addr });
    }
}
