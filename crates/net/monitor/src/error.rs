use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised while configuring or assembling a peer monitor.
///
/// Nothing in the running loops returns an error; failures there are logged
/// and retried on the next tick.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("missing component: {0}")]
    MissingComponent(&'static str),
}

/// Failure of a single address-list request to a peer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("peer {0} is not connected")]
    NotConnected(SocketAddr),
    #[error("request to {0} timed out")]
    Timeout(SocketAddr),
    #[error("request failed: {0}")]
    Request(String),
}
