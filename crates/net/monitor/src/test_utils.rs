//! Shared fixtures for the monitor tests.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use vertex_net_addrbook::{MemoryAddrBook, MemoryBlacklist, RoutableFilter};
use vertex_net_peers::{Direction, Peer, PeerRegistry};
use vertex_tasks::TaskManager;

use crate::config::PeerMonitorConfig;
use crate::error::DiscoveryError;
use crate::monitor::PeerMonitor;
use crate::traits::{Dialer, DiscoveryClient};

const DIAL_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Private-range address, rejected by the default filter.
pub(crate) fn addr(n: u8) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, n], 13802))
}

/// Globally routable address.
pub(crate) fn public_addr(n: u8) -> SocketAddr {
    SocketAddr::from(([44, 0, 0, n], 13802))
}

pub(crate) fn connected_peer(addr: SocketAddr) -> Peer {
    Peer::connected(addr, Direction::Outbound)
}

/// Forwards every batch to a channel.
pub(crate) struct RecordingDialer(mpsc::UnboundedSender<HashSet<SocketAddr>>);

#[async_trait]
impl Dialer for RecordingDialer {
    async fn dial_peers(&self, addrs: HashSet<SocketAddr>) {
        let _ = self.0.send(addrs);
    }
}

/// Canned address lists per peer. Peers without one answer with an empty list.
#[derive(Default)]
pub(crate) struct StaticDiscovery {
    responses: Mutex<HashMap<SocketAddr, Result<Vec<SocketAddr>, DiscoveryError>>>,
    silent: Mutex<HashSet<SocketAddr>>,
    asked: Mutex<Vec<SocketAddr>>,
}

impl StaticDiscovery {
    pub(crate) fn respond(&self, peer: SocketAddr, response: Result<Vec<SocketAddr>, DiscoveryError>) {
        self.responses.lock().insert(peer, response);
    }

    /// Requests to `peer` never complete.
    pub(crate) fn never_answer(&self, peer: SocketAddr) {
        self.silent.lock().insert(peer);
    }

    pub(crate) fn asked(&self) -> Vec<SocketAddr> {
        self.asked.lock().clone()
    }
}

#[async_trait]
impl DiscoveryClient for StaticDiscovery {
    async fn get_addr(&self, peer: &Peer) -> Result<Vec<SocketAddr>, DiscoveryError> {
        self.asked.lock().push(peer.addr());
        let silent = self.silent.lock().contains(&peer.addr());
        if silent {
            std::future::pending::<()>().await;
        }
        self.responses
            .lock()
            .get(&peer.addr())
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// A monitor wired to in-memory collaborators. Must be created inside a runtime.
pub(crate) struct Harness {
    pub(crate) monitor: Arc<PeerMonitor>,
    pub(crate) registry: Arc<PeerRegistry>,
    pub(crate) book: Arc<MemoryAddrBook>,
    pub(crate) blacklist: Arc<MemoryBlacklist>,
    pub(crate) discovery: Arc<StaticDiscovery>,
    dials: mpsc::UnboundedReceiver<HashSet<SocketAddr>>,
    manager: Option<TaskManager>,
}

impl Harness {
    pub(crate) fn new(config: PeerMonitorConfig) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let manager = TaskManager::current();
        let registry = Arc::new(PeerRegistry::new());
        let book = Arc::new(MemoryAddrBook::new());
        let blacklist = Arc::new(MemoryBlacklist::new());
        let discovery = Arc::new(StaticDiscovery::default());
        let (tx, dials) = mpsc::unbounded_channel();

        let monitor = PeerMonitor::builder(config)
            .registry(Arc::clone(&registry))
            .addr_book(book.clone())
            .blacklist(blacklist.clone())
            .filter(Arc::new(RoutableFilter::new()))
            .dialer(Arc::new(RecordingDialer(tx)))
            .discovery(discovery.clone())
            .build(manager.executor())
            .unwrap();

        Self {
            monitor,
            registry,
            book,
            blacklist,
            discovery,
            dials,
            manager: Some(manager),
        }
    }

    pub(crate) fn register(&self, peer: impl Into<Arc<Peer>>) -> Arc<Peer> {
        let peer = peer.into();
        self.registry.register(Arc::clone(&peer));
        peer
    }

    /// The next batch handed to the dialer.
    pub(crate) async fn next_dial(&mut self) -> HashSet<SocketAddr> {
        tokio::time::timeout(DIAL_TIMEOUT, self.dials.recv())
            .await
            .expect("no dial within timeout")
            .expect("dialer channel closed")
    }

    /// True if no batch is pending once spawned dial tasks have had a chance to run.
    pub(crate) async fn no_dials(&mut self) -> bool {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        self.dials.try_recv().is_err()
    }

    /// Fire shutdown and wait for the loops to release their guards.
    pub(crate) async fn shutdown(&mut self) -> bool {
        match self.manager.take() {
            Some(manager) => manager.graceful_shutdown_with_timeout(SHUTDOWN_TIMEOUT).await,
            None => true,
        }
    }
}
