//! Fault reporting from the connection layer into the monitor.

use std::sync::Arc;

use tokio::sync::mpsc;
use vertex_net_peers::Peer;

/// Receiving half, consumed by the fault loop.
pub type FaultReceiver = mpsc::UnboundedReceiver<Arc<Peer>>;

/// Create a linked reporter/receiver pair.
///
/// The channel is unbounded so reporting never blocks a connection task.
pub fn fault_channel() -> (FaultReporter, FaultReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FaultReporter(tx), rx)
}

/// Cloneable sending half handed to connection tasks.
#[derive(Debug, Clone)]
pub struct FaultReporter(mpsc::UnboundedSender<Arc<Peer>>);

impl FaultReporter {
    /// Report a peer that misbehaved. Returns false once the monitor is gone.
    pub fn report(&self, peer: Arc<Peer>) -> bool {
        self.0.send(peer).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}
