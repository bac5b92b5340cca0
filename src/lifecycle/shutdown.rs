//! Shutdown coordination for the gateway.

use std::future::Future;

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// The gateway listener and the admin listener each hold a receiver; one
/// `trigger` drains both. The route reload task is aborted once serving ends.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Broadcast the signal. Receivers created later will not see it.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Future that resolves when `rx` observes the signal or its sender is gone.
pub fn signalled(mut rx: broadcast::Receiver<()>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let _ = rx.recv().await;
    }
}
