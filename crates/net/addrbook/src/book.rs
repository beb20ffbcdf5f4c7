//! Known addresses and their dial statistics.

use std::collections::HashMap;
use std::net::SocketAddr;

use auto_impl::auto_impl;
use parking_lot::RwLock;
use tracing::trace;

/// Dial statistics recorded for one address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddrStat {
    /// Failed dial/liveness attempts since the last success.
    pub attempts: u32,
    /// Whether the address was reachable at the last update.
    pub reachable: bool,
    /// Unix seconds of the last failed attempt.
    pub last_attempt: Option<u64>,
    /// Unix seconds of the last success.
    pub last_success: Option<u64>,
}

impl AddrStat {
    fn mark_good(&mut self, now: u64) {
        self.attempts = 0;
        self.reachable = true;
        self.last_success = Some(now);
    }

    fn mark_attempt(&mut self, now: u64) {
        self.attempts = self.attempts.saturating_add(1);
        self.reachable = false;
        self.last_attempt = Some(now);
    }
}

/// Address book shared by every loop that dials or evicts.
///
/// Implementations synchronize internally; callers never lock around calls.
#[auto_impl(&, Box, Arc)]
pub trait AddrBook: Send + Sync {
    /// Track a new address. Returns false if it was already known.
    fn add_addr(&self, addr: SocketAddr) -> bool;

    fn get_peer_stat(&self, addr: &SocketAddr) -> Option<AddrStat>;

    /// `ok = true` marks the address good (attempts reset); `ok = false`
    /// records a failed attempt. Unknown addresses are left untouched and
    /// `None` is returned.
    fn set_addr_stat(&self, addr: &SocketAddr, ok: bool) -> Option<AddrStat>;

    /// Forget an address. Unknown addresses are a no-op.
    fn remove_addr(&self, addr: &SocketAddr);

    /// Every known address.
    fn peers(&self) -> Vec<SocketAddr>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory address book (does not persist across restarts).
#[derive(Debug, Default)]
pub struct MemoryAddrBook {
    addrs: RwLock<HashMap<SocketAddr, AddrStat>>,
}

impl MemoryAddrBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_addrs(addrs: impl IntoIterator<Item = SocketAddr>) -> Self {
        let book = Self::new();
        for addr in addrs {
            book.add_addr(addr);
        }
        book
    }

    /// Overwrite the stat of a known or new address.
    pub fn insert_stat(&self, addr: SocketAddr, stat: AddrStat) {
        self.addrs.write().insert(addr, stat);
    }
}

impl AddrBook for MemoryAddrBook {
    fn add_addr(&self, addr: SocketAddr) -> bool {
        let mut addrs = self.addrs.write();
        if addrs.contains_key(&addr) {
            return false;
        }
        addrs.insert(addr, AddrStat::default());
        trace!(%addr, "address added to book");
        true
    }

    fn get_peer_stat(&self, addr: &SocketAddr) -> Option<AddrStat> {
        self.addrs.read().get(addr).copied()
    }

    fn set_addr_stat(&self, addr: &SocketAddr, ok: bool) -> Option<AddrStat> {
        let now = current_unix_timestamp();
        let mut addrs = self.addrs.write();
        let stat = addrs.get_mut(addr)?;
        if ok {
            stat.mark_good(now);
        } else {
            stat.mark_attempt(now);
        }
        Some(*stat)
    }

    fn remove_addr(&self, addr: &SocketAddr) {
        if self.addrs.write().remove(addr).is_some() {
            trace!(%addr, "address removed from book");
        }
    }

    fn peers(&self) -> Vec<SocketAddr> {
        self.addrs.read().keys().copied().collect()
    }

    fn len(&self) -> usize {
        self.addrs.read().len()
    }
}

fn current_unix_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
