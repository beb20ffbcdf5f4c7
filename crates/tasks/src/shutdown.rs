//! One-shot shutdown broadcast shared by long-running tasks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll, ready};

use futures_util::FutureExt;
use futures_util::future::{FusedFuture, Shared};
use tokio::sync::oneshot;

/// Create a linked shutdown [`Signal`] and [`Shutdown`] pair.
pub fn signal() -> (Signal, Shutdown) {
    let (sender, receiver) = oneshot::channel();
    (Signal(sender), Shutdown(receiver.shared()))
}

/// Fires the shutdown. Dropping the signal fires it as well.
#[derive(Debug)]
pub struct Signal(oneshot::Sender<()>);

impl Signal {
    /// Fire the signal, resolving every linked [`Shutdown`].
    pub fn fire(self) {
        let _ = self.0.send(());
    }
}

/// Future that resolves once the linked [`Signal`] fires or is dropped.
///
/// Clones are cheap and all resolve together. Awaiting a handle after the
/// signal fired resolves immediately.
#[derive(Debug, Clone)]
#[must_use = "futures do nothing unless polled"]
pub struct Shutdown(Shared<oneshot::Receiver<()>>);

impl Shutdown {
    /// Returns true if the signal has already fired.
    pub fn is_fired(&self) -> bool {
        self.0.is_terminated() || self.0.peek().is_some()
    }
}

impl Future for Shutdown {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.0.is_terminated() || this.0.poll_unpin(cx).is_ready() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

/// A [`Shutdown`] that hands out a [`GracefulShutdownGuard`] when it fires.
///
/// The task manager waits for every guard to drop before a graceful shutdown
/// completes, so a loop can finish its cleanup while holding the guard.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct GracefulShutdown {
    shutdown: Shutdown,
    guard: Option<GracefulShutdownGuard>,
}

impl GracefulShutdown {
    pub(crate) const fn new(shutdown: Shutdown, guard: GracefulShutdownGuard) -> Self {
        Self {
            shutdown,
            guard: Some(guard),
        }
    }
}

impl Future for GracefulShutdown {
    type Output = GracefulShutdownGuard;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        ready!(self.shutdown.poll_unpin(cx));
        match self.get_mut().guard.take() {
            Some(guard) => Poll::Ready(guard),
            // Polled after completion.
            None => Poll::Pending,
        }
    }
}

/// Held by a task until its shutdown cleanup is done.
#[derive(Debug)]
#[must_use = "if unused the graceful shutdown completes immediately"]
pub struct GracefulShutdownGuard(Arc<AtomicUsize>);

impl GracefulShutdownGuard {
    pub(crate) fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for GracefulShutdownGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
