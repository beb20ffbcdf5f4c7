//! Seams to the connection and protocol layers.

use std::collections::HashSet;
use std::net::SocketAddr;

use async_trait::async_trait;
use auto_impl::auto_impl;
use vertex_net_peers::Peer;

use crate::error::DiscoveryError;

/// Opens outbound connections.
///
/// Called from a detached task; the monitor never waits on the outcome.
/// Successful dials are expected to register the new peer themselves.
#[async_trait]
#[auto_impl(Box, Arc)]
pub trait Dialer: Send + Sync {
    async fn dial_peers(&self, addrs: HashSet<SocketAddr>);
}

/// Asks a connected peer for the addresses it knows.
#[async_trait]
#[auto_impl(Box, Arc)]
pub trait DiscoveryClient: Send + Sync {
    async fn get_addr(&self, peer: &Peer) -> Result<Vec<SocketAddr>, DiscoveryError>;
}
