//! Addresses that must never be dialed.

use std::collections::HashSet;
use std::net::SocketAddr;

use auto_impl::auto_impl;
use parking_lot::RwLock;
use tracing::debug;

/// Permanent dial exclusion list. Membership only, entries never decay.
#[auto_impl(&, Box, Arc)]
pub trait Blacklist: Send + Sync {
    fn has(&self, addr: &SocketAddr) -> bool;

    /// Returns false if the address was already listed.
    fn add(&self, addr: SocketAddr) -> bool;

    /// Returns false if the address was not listed.
    fn remove(&self, addr: &SocketAddr) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory blacklist.
#[derive(Debug, Default)]
pub struct MemoryBlacklist {
    addrs: RwLock<HashSet<SocketAddr>>,
}

impl MemoryBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_addrs(addrs: impl IntoIterator<Item = SocketAddr>) -> Self {
        Self {
            addrs: RwLock::new(addrs.into_iter().collect()),
        }
    }
}

impl Blacklist for MemoryBlacklist {
    fn has(&self, addr: &SocketAddr) -> bool {
        self.addrs.read().contains(addr)
    }

    fn add(&self, addr: SocketAddr) -> bool {
        let added = self.addrs.write().insert(addr);
        if added {
            debug!(%addr, "address blacklisted");
        }
        added
    }

    fn remove(&self, addr: &SocketAddr) -> bool {
        self.addrs.write().remove(addr)
    }

    fn len(&self) -> usize {
        self.addrs.read().len()
    }
}
