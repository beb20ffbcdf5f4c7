//! Live peer handle: atomics for the hot flags, a per-peer RwLock for the link.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use web_time::Instant;

/// Consecutive liveness failures after which a peer's stat is no longer ok.
pub const DEFAULT_MAX_PEER_FAILURES: u32 = 3;

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Handle to an established wire connection.
///
/// The wire itself lives in the connection layer; the peer only tracks
/// whether a link is present and where it goes.
#[derive(Debug, Clone)]
pub struct Connection {
    remote_addr: SocketAddr,
    direction: Direction,
    opened_at: Instant,
}

impl Connection {
    pub fn new(remote_addr: SocketAddr, direction: Direction) -> Self {
        Self {
            remote_addr,
            direction,
            opened_at: Instant::now(),
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

/// Protocol version advertised by the peer and whether we can talk to it.
///
/// Peers start out supported; the handshake downgrades them when the
/// advertised version is incompatible.
#[derive(Debug)]
pub struct VersionInfo {
    version: AtomicU32,
    supported: AtomicBool,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            version: AtomicU32::new(0),
            supported: AtomicBool::new(true),
        }
    }
}

impl VersionInfo {
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::Relaxed)
    }

    pub fn is_supported(&self) -> bool {
        self.supported.load(Ordering::Relaxed)
    }

    pub fn set(&self, version: u32, supported: bool) {
        self.version.store(version, Ordering::Relaxed);
        self.supported.store(supported, Ordering::Relaxed);
    }

    pub fn set_supported(&self, supported: bool) {
        self.supported.store(supported, Ordering::Relaxed);
    }
}

/// Liveness verdict fed by pings and request outcomes.
#[derive(Debug)]
pub struct PeerStat {
    failures: AtomicU32,
    max_failures: u32,
}

impl Default for PeerStat {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PEER_FAILURES)
    }
}

impl PeerStat {
    pub fn new(max_failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(0),
            max_failures,
        }
    }

    /// Healthy while consecutive failures stay below the limit.
    pub fn is_ok(&self) -> bool {
        self.failures() < self.max_failures
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    pub fn record_ok(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    /// Returns the new consecutive failure count.
    pub fn record_failure(&self) -> u32 {
        self.failures.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }
}

/// A remote peer, keyed by its network address.
///
/// Shared as `Arc<Peer>` between the registry, the connection layer and the
/// monitor loops. All mutation goes through atomics or the per-peer lock.
#[derive(Debug)]
pub struct Peer {
    addr: SocketAddr,
    connection: RwLock<Option<Connection>>,
    running: AtomicBool,
    version: VersionInfo,
    stat: PeerStat,
}

impl Peer {
    /// A peer that is known but not (yet) connected.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connection: RwLock::new(None),
            running: AtomicBool::new(false),
            version: VersionInfo::default(),
            stat: PeerStat::default(),
        }
    }

    /// A running peer with an established link.
    pub fn connected(addr: SocketAddr, direction: Direction) -> Self {
        let peer = Self::new(addr);
        peer.attach(Connection::new(addr, direction));
        peer
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn connection(&self) -> Option<Connection> {
        self.connection.read().clone()
    }

    pub fn has_connection(&self) -> bool {
        self.connection.read().is_some()
    }

    /// Attach an established link and mark the peer running.
    pub fn attach(&self, connection: Connection) {
        *self.connection.write() = Some(connection);
        self.running.store(true, Ordering::Relaxed);
    }

    /// Drop the link (if any) and stop the peer. Returns the detached link.
    pub fn close(&self) -> Option<Connection> {
        self.running.store(false, Ordering::Relaxed);
        self.connection.write().take()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }

    pub fn version(&self) -> &VersionInfo {
        &self.version
    }

    pub fn stat(&self) -> &PeerStat {
        &self.stat
    }

    /// Usable for requests: linked, running, compatible and healthy.
    pub fn is_active(&self) -> bool {
        self.has_connection()
            && self.is_running()
            && self.version.is_supported()
            && self.stat.is_ok()
    }
}
