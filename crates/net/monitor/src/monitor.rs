//! Peer monitor: eviction plus the single-pass sweeps run by each loop.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use metrics::counter;
use strum::{Display, IntoStaticStr};
use tracing::{debug, info, trace, warn};
use vertex_net_addrbook::{
    AddrBook, AddrFilter, Blacklist, MemoryAddrBook, MemoryBlacklist, RoutableFilter,
};
use vertex_net_peers::{Peer, PeerRegistry};
use vertex_tasks::TaskExecutor;

use crate::config::PeerMonitorConfig;
use crate::error::{DiscoveryError, MonitorError};
use crate::traits::{Dialer, DiscoveryClient};

/// Why a peer was evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum EvictReason {
    /// Registered without a transport connection.
    NoConnection,
    /// Its address exceeded the failed-attempt limit.
    TooManyAttempts,
    /// Its worker stopped.
    NotRunning,
    /// Reported with a protocol version we don't speak.
    UnsupportedVersion,
}

/// The loop an action originated from, recorded in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum MonitorLoop {
    HealthCheck,
    FaultConsumer,
    OnlineDiscovery,
    OfflineDiscovery,
}

/// Result of handling one fault report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// Unsupported version: evicted and marked unreachable.
    Evicted { blacklisted: bool },
    /// Supported version: address stat refreshed from the peer's health.
    StatUpdated { reachable: bool },
    /// The reported handle was replaced by a newer peer at the same address;
    /// nothing was changed.
    Superseded,
}

/// Result of one offline-discovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfflineOutcome {
    /// Under target, this batch was handed to the dialer.
    Dialing(HashSet<SocketAddr>),
    /// Under target with nothing left to dial.
    Idle,
    /// At or above target; these connected seeds were disconnected.
    ReleasedSeeds(Vec<SocketAddr>),
}

/// Point-in-time counts for status logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorStats {
    pub registered: usize,
    pub active: usize,
    pub known_addrs: usize,
    pub blacklisted: usize,
    pub target: usize,
}

/// Keeps the peer set healthy and sized.
///
/// Every collaborator is shared; the monitor owns none of them exclusively.
/// Each sweep method performs a single pass and is what the corresponding
/// loop in [`PeerMonitor::spawn`] runs on every tick.
pub struct PeerMonitor {
    pub(crate) config: PeerMonitorConfig,
    registry: Arc<PeerRegistry>,
    addr_book: Arc<dyn AddrBook>,
    blacklist: Arc<dyn Blacklist>,
    filter: Arc<dyn AddrFilter>,
    dialer: Arc<dyn Dialer>,
    discovery: Arc<dyn DiscoveryClient>,
    pub(crate) executor: TaskExecutor,
}

impl std::fmt::Debug for PeerMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerMonitor")
            .field("config", &self.config)
            .field("registered", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl PeerMonitor {
    pub fn builder(config: PeerMonitorConfig) -> PeerMonitorBuilder {
        PeerMonitorBuilder::new(config)
    }

    pub fn config(&self) -> &PeerMonitorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    pub fn addr_book(&self) -> &Arc<dyn AddrBook> {
        &self.addr_book
    }

    pub fn blacklist(&self) -> &Arc<dyn Blacklist> {
        &self.blacklist
    }

    /// Whether fewer peers than the target are registered.
    pub fn needs_more(&self) -> bool {
        self.registry.len() < self.config.target_peers
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            registered: self.registry.len(),
            active: self.registry.active_peers().len(),
            known_addrs: self.addr_book.len(),
            blacklisted: self.blacklist.len(),
            target: self.config.target_peers,
        }
    }

    /// Forget the peer's address and drop it from the registry.
    ///
    /// Safe to call for a peer that is already gone. A handle that was
    /// replaced by a newer peer at the same address is left alone, and so is
    /// the address book entry. Returns true if the peer was removed.
    pub fn evict(&self, peer: &Peer, reason: EvictReason, origin: MonitorLoop) -> bool {
        let addr = peer.addr();
        if self.is_superseded(peer) {
            debug!(%addr, %reason, %origin, "peer handle superseded, skipping eviction");
            return false;
        }

        let running = peer.is_running();
        let connected_for = peer.connection().map(|c| c.age());
        self.addr_book.remove_addr(&addr);
        if !self.registry.remove_peer(peer) {
            trace!(%addr, %origin, "peer already evicted");
            return false;
        }

        info!(
            %addr,
            %reason,
            %origin,
            running,
            ?connected_for,
            version = peer.version().version(),
            supported = peer.version().is_supported(),
            "evicted peer"
        );
        counter!("peer_monitor.evictions_total", "reason" => <&'static str>::from(reason))
            .increment(1);
        true
    }

    /// Whether a different handle now holds the peer's address.
    fn is_superseded(&self, peer: &Peer) -> bool {
        self.registry.has(&peer.addr()) && !self.registry.is_current(peer)
    }

    /// One health-check pass over every registered peer.
    pub fn check_peers(&self) -> Vec<(SocketAddr, EvictReason)> {
        let mut evicted = Vec::new();
        for peer in self.registry.registered_peers() {
            if let Some(reason) = self.health_verdict(&peer)
                && self.evict(&peer, reason, MonitorLoop::HealthCheck)
            {
                evicted.push((peer.addr(), reason));
            }
        }
        evicted
    }

    fn health_verdict(&self, peer: &Peer) -> Option<EvictReason> {
        if !peer.has_connection() {
            return Some(EvictReason::NoConnection);
        }
        if let Some(stat) = self.addr_book.get_peer_stat(&peer.addr()) {
            trace!(addr = %peer.addr(), attempts = stat.attempts, "checking peer");
            if stat.attempts > self.config.max_attempts {
                debug!(
                    addr = %peer.addr(),
                    attempts = stat.attempts,
                    max = self.config.max_attempts,
                    "attempt limit exceeded"
                );
                return Some(EvictReason::TooManyAttempts);
            }
        }
        if !peer.is_running() {
            return Some(EvictReason::NotRunning);
        }
        None
    }

    /// Handle one reported peer.
    pub fn handle_fault(&self, peer: &Peer) -> FaultOutcome {
        let addr = peer.addr();
        if self.is_superseded(peer) {
            debug!(%addr, "fault report for a replaced peer handle, ignoring");
            return FaultOutcome::Superseded;
        }
        if !peer.version().is_supported() {
            debug!(%addr, version = peer.version().version(), "unsupported protocol version");
            self.evict(peer, EvictReason::UnsupportedVersion, MonitorLoop::FaultConsumer);
            self.addr_book.set_addr_stat(&addr, false);
            let blacklisted = self.config.blacklist_incompatible && self.blacklist.add(addr);
            return FaultOutcome::Evicted { blacklisted };
        }

        let reachable = peer.stat().is_ok();
        let stat = self.addr_book.set_addr_stat(&addr, reachable);
        debug!(
            %addr,
            reachable,
            attempts = stat.map(|s| s.attempts),
            "updated address stat from fault report"
        );
        FaultOutcome::StatUpdated { reachable }
    }

    /// One online-discovery pass: ask every active peer for addresses and
    /// dial what survives filtering. Returns each batch handed to the dialer.
    pub async fn discover_online(&self) -> Vec<HashSet<SocketAddr>> {
        if !self.needs_more() {
            trace!(registered = self.registry.len(), "peer target met, skipping online discovery");
            return Vec::new();
        }

        let mut batches = Vec::new();
        for peer in self.registry.active_peers() {
            let request = self.discovery.get_addr(&peer);
            let response = tokio::time::timeout(self.config.request_timeout, request)
                .await
                .unwrap_or_else(|_| Err(DiscoveryError::Timeout(peer.addr())));
            let addrs = match response {
                Ok(addrs) => addrs,
                Err(e) => {
                    warn!(addr = %peer.addr(), error = %e, "address request failed");
                    continue;
                }
            };
            debug!(addr = %peer.addr(), count = addrs.len(), "received addresses");

            let routable = self.filter.filter(&addrs);
            let candidates = self.dial_candidates(routable);
            if candidates.is_empty() {
                continue;
            }
            self.dial(candidates.clone(), MonitorLoop::OnlineDiscovery);
            batches.push(candidates);
        }
        batches
    }

    /// One offline-discovery pass: under target, dial seeds and known
    /// addresses; at target, disconnect seeds so they serve other nodes.
    pub fn discover_offline(&self) -> OfflineOutcome {
        if !self.needs_more() {
            let released: Vec<SocketAddr> = self
                .config
                .seeds
                .iter()
                .filter(|seed| self.registry.remove(seed).is_some())
                .copied()
                .collect();
            if !released.is_empty() {
                info!(count = released.len(), "peer target met, released seed peers");
            }
            return OfflineOutcome::ReleasedSeeds(released);
        }

        let seeds = self.dial_candidates(self.config.seeds.iter().copied());
        let known = self.addr_book.peers();
        debug!(
            registered = self.registry.len(),
            known = known.len(),
            seeds = seeds.len(),
            "collecting offline candidates"
        );

        let mut candidates = seeds;
        if !known.is_empty() {
            candidates.extend(self.dial_candidates(self.filter.filter(&known)));
        }
        if candidates.is_empty() {
            return OfflineOutcome::Idle;
        }

        self.dial(candidates.clone(), MonitorLoop::OfflineDiscovery);
        OfflineOutcome::Dialing(candidates)
    }

    /// Drop blacklisted and already registered addresses.
    fn dial_candidates(&self, addrs: impl IntoIterator<Item = SocketAddr>) -> HashSet<SocketAddr> {
        addrs
            .into_iter()
            .filter(|addr| {
                if self.blacklist.has(addr) {
                    trace!(%addr, "skipping blacklisted address");
                    return false;
                }
                !self.registry.has(addr)
            })
            .collect()
    }

    /// Hand a batch to the dialer on a detached task.
    fn dial(&self, addrs: HashSet<SocketAddr>, origin: MonitorLoop) {
        debug!(count = addrs.len(), %origin, "dialing peers");
        counter!("peer_monitor.dial_batches_total", "origin" => <&'static str>::from(origin))
            .increment(1);
        let dialer = Arc::clone(&self.dialer);
        self.executor.spawn(async move {
            dialer.dial_peers(addrs).await;
        });
    }
}

/// Assembles a [`PeerMonitor`]. The dialer and discovery client are required;
/// everything else falls back to a fresh in-memory default.
pub struct PeerMonitorBuilder {
    config: PeerMonitorConfig,
    registry: Option<Arc<PeerRegistry>>,
    addr_book: Option<Arc<dyn AddrBook>>,
    blacklist: Option<Arc<dyn Blacklist>>,
    filter: Option<Arc<dyn AddrFilter>>,
    dialer: Option<Arc<dyn Dialer>>,
    discovery: Option<Arc<dyn DiscoveryClient>>,
}

impl PeerMonitorBuilder {
    pub fn new(config: PeerMonitorConfig) -> Self {
        Self {
            config,
            registry: None,
            addr_book: None,
            blacklist: None,
            filter: None,
            dialer: None,
            discovery: None,
        }
    }

    pub fn registry(mut self, registry: Arc<PeerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn addr_book(mut self, addr_book: Arc<dyn AddrBook>) -> Self {
        self.addr_book = Some(addr_book);
        self
    }

    pub fn blacklist(mut self, blacklist: Arc<dyn Blacklist>) -> Self {
        self.blacklist = Some(blacklist);
        self
    }

    pub fn filter(mut self, filter: Arc<dyn AddrFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    pub fn discovery(mut self, discovery: Arc<dyn DiscoveryClient>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn build(self, executor: TaskExecutor) -> Result<Arc<PeerMonitor>, MonitorError> {
        self.config.validate()?;
        let dialer = self.dialer.ok_or(MonitorError::MissingComponent("dialer"))?;
        let discovery = self
            .discovery
            .ok_or(MonitorError::MissingComponent("discovery client"))?;

        Ok(Arc::new(PeerMonitor {
            config: self.config,
            registry: self.registry.unwrap_or_default(),
            addr_book: self
                .addr_book
                .unwrap_or_else(|| Arc::new(MemoryAddrBook::new())),
            blacklist: self
                .blacklist
                .unwrap_or_else(|| Arc::new(MemoryBlacklist::new())),
            filter: self.filter.unwrap_or_else(|| Arc::new(RoutableFilter::new())),
            dialer,
            discovery,
            executor,
        }))
    }
}
