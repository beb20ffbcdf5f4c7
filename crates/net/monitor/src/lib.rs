//! Peer lifecycle control loops.
//!
//! [`PeerMonitor`] runs four independent loops against a shared
//! [`PeerRegistry`](vertex_net_peers::PeerRegistry) and
//! [`AddrBook`](vertex_net_addrbook::AddrBook):
//!
//! - **health check**: evicts peers without a link, with too many failed
//!   attempts, or whose worker stopped;
//! - **fault consumer**: reacts to peers reported through a [`FaultReporter`];
//! - **online discovery**: asks active peers for addresses while under target;
//! - **offline discovery**: dials seeds and known addresses while under
//!   target, and releases seeds once the target is met.
//!
//! ```ignore
//! let (reporter, faults) = fault_channel();
//! let monitor = PeerMonitor::builder(config)
//!     .registry(registry)
//!     .dialer(dialer)
//!     .discovery(discovery)
//!     .build(executor)?;
//! let handles = monitor.spawn(faults);
//! ```

mod config;
mod error;
mod fault;
mod monitor;
mod service;
mod traits;

#[cfg(test)]
mod test_utils;

pub use config::{
    DEFAULT_CHECK_INTERVAL, DEFAULT_DISCOVERY_INTERVAL, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_TARGET_PEERS, PeerMonitorConfig,
};
pub use error::{DiscoveryError, MonitorError};
pub use fault::{FaultReceiver, FaultReporter, fault_channel};
pub use monitor::{
    EvictReason, FaultOutcome, MonitorLoop, MonitorStats, OfflineOutcome, PeerMonitor,
    PeerMonitorBuilder,
};
pub use service::MonitorHandles;
pub use traits::{Dialer, DiscoveryClient};
