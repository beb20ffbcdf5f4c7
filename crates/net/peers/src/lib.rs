//! Live peer handles and the registry the node keeps them in.
//!
//! A [`Peer`] is shared as `Arc<Peer>` between the connection layer, which
//! attaches and closes its link, and the control loops that audit it. The
//! [`PeerRegistry`] is the only owner of the address → peer mapping.

pub mod events;
pub mod peer;
pub mod registry;

pub use events::{EventEmitter, PeerEvent};
pub use peer::{Connection, DEFAULT_MAX_PEER_FAILURES, Direction, Peer, PeerStat, VersionInfo};
pub use registry::{PeerRegistry, RegisterResult};
