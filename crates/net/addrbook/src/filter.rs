//! Routability filtering for candidate dial addresses.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use auto_impl::auto_impl;
use tracing::trace;

/// Reduces a candidate list to addresses worth dialing.
#[auto_impl(&, Box, Arc)]
pub trait AddrFilter: Send + Sync {
    fn filter(&self, addrs: &[SocketAddr]) -> Vec<SocketAddr>;
}

/// Keeps globally routable addresses, preserving input order and dropping duplicates.
///
/// With `allow_private` set, loopback and private ranges pass too (local
/// networks and tests).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoutableFilter {
    pub allow_private: bool,
}

impl RoutableFilter {
    pub const fn new() -> Self {
        Self {
            allow_private: false,
        }
    }

    pub const fn permissive() -> Self {
        Self {
            allow_private: true,
        }
    }

    pub fn is_routable(&self, addr: &SocketAddr) -> bool {
        if addr.port() == 0 {
            return false;
        }
        match addr.ip() {
            IpAddr::V4(v4) => self.is_routable_v4(v4),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => self.is_routable_v4(v4),
                None => self.is_routable_v6(v6),
            },
        }
    }

    fn is_routable_v4(&self, ip: Ipv4Addr) -> bool {
        if ip.is_unspecified() || ip.is_multicast() || ip.is_broadcast() || ip.is_documentation()
        {
            return false;
        }
        self.allow_private || !(ip.is_loopback() || ip.is_private() || ip.is_link_local())
    }

    fn is_routable_v6(&self, ip: Ipv6Addr) -> bool {
        let [first, second, ..] = ip.segments();
        // 2001:db8::/32
        let documentation = first == 0x2001 && second == 0x0db8;
        if ip.is_unspecified() || ip.is_multicast() || documentation {
            return false;
        }
        self.allow_private
            || !(ip.is_loopback() || ip.is_unicast_link_local() || ip.is_unique_local())
    }
}

impl AddrFilter for RoutableFilter {
    fn filter(&self, addrs: &[SocketAddr]) -> Vec<SocketAddr> {
        let mut seen = HashSet::with_capacity(addrs.len());
        addrs
            .iter()
            .filter(|addr| {
                let keep = self.is_routable(addr);
                if !keep {
                    trace!(%addr, "dropping unroutable address");
                }
                keep && seen.insert(**addr)
            })
            .copied()
            .collect()
    }
}
