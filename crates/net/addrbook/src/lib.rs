//! Address-level state shared by the dialing and eviction paths.
//!
//! - [`AddrBook`]: known addresses with failed-attempt counters and a
//!   reachability flag.
//! - [`Blacklist`]: addresses excluded from dialing.
//! - [`AddrFilter`]: routability filtering of candidate lists.
//!
//! Each trait is implemented for `&T`, `Box<T>` and `Arc<T>`, and each comes
//! with an in-memory implementation.

mod blacklist;
mod book;
mod filter;

pub use blacklist::{Blacklist, MemoryBlacklist};
pub use book::{AddrBook, AddrStat, MemoryAddrBook};
pub use filter::{AddrFilter, RoutableFilter};
