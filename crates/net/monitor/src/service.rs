//! The four long-running monitor loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::fault::FaultReceiver;
use crate::monitor::{MonitorLoop, PeerMonitor};

/// Join handles of the spawned loops.
#[derive(Debug)]
pub struct MonitorHandles {
    pub health_check: JoinHandle<()>,
    pub fault_consumer: JoinHandle<()>,
    pub online_discovery: JoinHandle<()>,
    pub offline_discovery: JoinHandle<()>,
}

impl MonitorHandles {
    /// Wait for every loop to exit.
    pub async fn join(self) {
        for (name, handle) in [
            (MonitorLoop::HealthCheck, self.health_check),
            (MonitorLoop::FaultConsumer, self.fault_consumer),
            (MonitorLoop::OnlineDiscovery, self.online_discovery),
            (MonitorLoop::OfflineDiscovery, self.offline_discovery),
        ] {
            if let Err(e) = handle.await {
                warn!(origin = %name, error = %e, "monitor loop panicked or was aborted");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.health_check.is_finished()
            && self.fault_consumer.is_finished()
            && self.online_discovery.is_finished()
            && self.offline_discovery.is_finished()
    }
}

impl PeerMonitor {
    /// Start all four loops on the monitor's executor.
    ///
    /// Each loop stops at the executor's shutdown signal. A sweep that is
    /// already running completes first; no new sweep starts afterwards.
    pub fn spawn(self: &Arc<Self>, faults: FaultReceiver) -> MonitorHandles {
        MonitorHandles {
            health_check: self.spawn_periodic(MonitorLoop::HealthCheck, self.config.check_interval),
            fault_consumer: self.spawn_fault_consumer(faults),
            online_discovery: self
                .spawn_periodic(MonitorLoop::OnlineDiscovery, self.config.discovery_interval),
            offline_discovery: self
                .spawn_periodic(MonitorLoop::OfflineDiscovery, self.config.discovery_interval),
        }
    }

    fn spawn_periodic(self: &Arc<Self>, which: MonitorLoop, period: Duration) -> JoinHandle<()> {
        let this = Arc::clone(self);
        self.executor
            .spawn_with_graceful_shutdown_signal(which.into(), |shutdown| async move {
                let mut shutdown = std::pin::pin!(shutdown);
                let mut ticker = delayed_interval(period);
                debug!(origin = %which, ?period, "monitor loop started");

                loop {
                    tokio::select! {
                        biased;
                        guard = &mut shutdown => {
                            debug!(origin = %which, "monitor loop shutting down");
                            drop(guard);
                            break;
                        }
                        _ = ticker.tick() => this.sweep(which).await,
                    }
                }
            })
    }

    async fn sweep(&self, which: MonitorLoop) {
        match which {
            MonitorLoop::HealthCheck => {
                self.check_peers();
            }
            MonitorLoop::OnlineDiscovery => {
                self.discover_online().await;
            }
            MonitorLoop::OfflineDiscovery => {
                self.discover_offline();
                let stats = self.stats();
                debug!(
                    registered = stats.registered,
                    active = stats.active,
                    known = stats.known_addrs,
                    target = stats.target,
                    "peer status"
                );
            }
            MonitorLoop::FaultConsumer => {}
        }
    }

    fn spawn_fault_consumer(self: &Arc<Self>, mut faults: FaultReceiver) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let name = MonitorLoop::FaultConsumer;
        self.executor
            .spawn_with_graceful_shutdown_signal(name.into(), |shutdown| async move {
                let mut shutdown = std::pin::pin!(shutdown);
                debug!(origin = %name, "monitor loop started");

                loop {
                    tokio::select! {
                        biased;
                        guard = &mut shutdown => {
                            debug!(origin = %name, "monitor loop shutting down");
                            drop(guard);
                            break;
                        }
                        peer = faults.recv() => match peer {
                            Some(peer) => {
                                this.handle_fault(&peer);
                            }
                            None => {
                                debug!(origin = %name, "all fault reporters dropped");
                                break;
                            }
                        },
                    }
                }
            })
    }
}

/// An interval whose first tick is one full period away.
fn delayed_interval(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
