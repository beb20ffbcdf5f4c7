//! Task management: an executor handle for spawning node tasks and the
//! shutdown broadcast they observe.
//!
//! Long-running loops are spawned with [`TaskExecutor::spawn_with_graceful_shutdown_signal`]
//! and race their work against the [`GracefulShutdown`] they receive. Short
//! fire-and-forget work (dial fan-outs) uses [`TaskExecutor::spawn`] and is
//! never joined.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, debug_span};

pub mod metrics;
pub mod shutdown;

pub use metrics::{IncCounterOnDrop, TaskExecutorMetrics};
pub use shutdown::{GracefulShutdown, GracefulShutdownGuard, Shutdown, Signal, signal};

/// How often a graceful shutdown re-checks the outstanding guard count.
const GRACEFUL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Owns the shutdown [`Signal`] for every task spawned through its executors.
#[derive(Debug)]
pub struct TaskManager {
    handle: Handle,
    signal: Option<Signal>,
    on_shutdown: Shutdown,
    graceful_tasks: Arc<AtomicUsize>,
}

impl TaskManager {
    /// Create a task manager on the current tokio runtime.
    ///
    /// Panics (inside tokio) when called outside of a runtime context.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Create a task manager spawning onto the given runtime handle.
    pub fn new(handle: Handle) -> Self {
        let (signal, on_shutdown) = signal();
        Self {
            handle,
            signal: Some(signal),
            on_shutdown,
            graceful_tasks: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns a new executor handle.
    pub fn executor(&self) -> TaskExecutor {
        TaskExecutor {
            handle: self.handle.clone(),
            on_shutdown: self.on_shutdown.clone(),
            graceful_tasks: Arc::clone(&self.graceful_tasks),
            metrics: TaskExecutorMetrics::default(),
        }
    }

    /// Number of graceful tasks still holding their guard (or not yet shut down).
    pub fn graceful_tasks(&self) -> usize {
        self.graceful_tasks.load(Ordering::SeqCst)
    }

    /// Fire the shutdown signal without waiting. Returns false if it already fired.
    pub fn fire_shutdown_signal(&mut self) -> bool {
        match self.signal.take() {
            Some(signal) => {
                debug!("firing shutdown signal");
                signal.fire();
                true
            }
            None => false,
        }
    }

    /// Fire the shutdown signal and wait for graceful tasks to release their guards.
    ///
    /// Returns true if all graceful tasks finished before `timeout` elapsed.
    pub async fn graceful_shutdown_with_timeout(mut self, timeout: Duration) -> bool {
        self.fire_shutdown_signal();

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = self.graceful_tasks();
            if remaining == 0 {
                debug!("gracefully shut down");
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                debug!(remaining, "graceful shutdown timed out");
                return false;
            }
            tokio::time::sleep(GRACEFUL_POLL_INTERVAL).await;
        }
    }
}

/// Cloneable handle for spawning tasks tied to a [`TaskManager`].
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    handle: Handle,
    on_shutdown: Shutdown,
    graceful_tasks: Arc<AtomicUsize>,
    metrics: TaskExecutorMetrics,
}

impl TaskExecutor {
    /// A fresh handle to the shutdown signal.
    pub fn on_shutdown_signal(&self) -> Shutdown {
        self.on_shutdown.clone()
    }

    /// Spawn an untracked task. It is neither joined nor cancelled on shutdown.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.metrics.inc_regular_tasks();
        let finished = IncCounterOnDrop::new(self.metrics.finished_regular_tasks_total.clone());
        let task = async move {
            let _finished = finished;
            fut.await;
        };
        self.handle.spawn(task.in_current_span())
    }

    /// Spawn a task that receives a plain [`Shutdown`] to observe cooperatively.
    pub fn spawn_with_signal<F>(
        &self,
        name: &'static str,
        f: impl FnOnce(Shutdown) -> F,
    ) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let fut = f(self.on_shutdown_signal());
        self.spawn(fut.instrument(debug_span!("task", name)))
    }

    /// Spawn a long-running task that receives a [`GracefulShutdown`].
    ///
    /// The task counts as outstanding for [`TaskManager::graceful_shutdown_with_timeout`]
    /// until it either finishes or drops the guard yielded by the shutdown future.
    pub fn spawn_with_graceful_shutdown_signal<F>(
        &self,
        name: &'static str,
        f: impl FnOnce(GracefulShutdown) -> F,
    ) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = GracefulShutdownGuard::new(Arc::clone(&self.graceful_tasks));
        let fut = f(GracefulShutdown::new(self.on_shutdown_signal(), guard));

        self.metrics.inc_graceful_tasks();
        let finished = IncCounterOnDrop::new(self.metrics.finished_graceful_tasks_total.clone());
        let task = async move {
            let _finished = finished;
            fut.await;
            debug!("task exited");
        };
        self.handle.spawn(task.instrument(debug_span!("task", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_runs_untracked() {
        let manager = TaskManager::current();
        let executor = manager.executor();
        let (tx, rx) = tokio::sync::oneshot::channel();

        executor.spawn(async move {
            let _ = tx.send(42);
        });

        assert_eq!(rx.await.unwrap(), 42);
        assert_eq!(manager.graceful_tasks(), 0);
    }

    #[tokio::test]
    async fn test_graceful_shutdown_waits_for_guard() {
        let manager = TaskManager::current();
        let executor = manager.executor();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();

        executor.spawn_with_graceful_shutdown_signal("test", |shutdown| async move {
            let guard = shutdown.await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = done_tx.send(());
            drop(guard);
        });
        assert_eq!(manager.graceful_tasks(), 1);

        assert!(manager.graceful_shutdown_with_timeout(Duration::from_secs(5)).await);
        done_rx.await.unwrap();
    }

    #[tokio::test]
    async fn test_graceful_shutdown_times_out() {
        let manager = TaskManager::current();
        let executor = manager.executor();

        executor.spawn_with_graceful_shutdown_signal("stuck", |shutdown| async move {
            let _guard = shutdown.await;
            std::future::pending::<()>().await;
        });

        assert!(!manager.graceful_shutdown_with_timeout(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_spawn_with_signal_observes_shutdown() {
        let mut manager = TaskManager::current();
        let executor = manager.executor();

        let handle = executor.spawn_with_signal("plain", |shutdown| async move {
            shutdown.await;
        });

        assert!(manager.fire_shutdown_signal());
        assert!(!manager.fire_shutdown_signal());
        handle.await.unwrap();
        assert!(executor.on_shutdown_signal().is_fired());
    }
}
