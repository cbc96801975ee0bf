//! Shutdown coordination for the service.

use std::sync::Arc;
use tokio::sync::watch;

/// Process-wide shutdown progress. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownPhase {
    /// Accepting and serving requests.
    Running,
    /// No new connections; in-flight requests are finishing.
    Draining,
    /// Drain abandoned; exit as soon as possible.
    Forced,
}

/// Coordinator for graceful shutdown.
///
/// Cloneable; every clone drives the same state. Long-running tasks
/// subscribe and stop when the phase leaves `Running`.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<ShutdownPhase>>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ShutdownPhase::Running);
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to shutdown progress.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Begin draining. Returns `true` only for the call that started it,
    /// so a single shutdown sequence runs per process.
    pub fn trigger(&self) -> bool {
        self.advance(ShutdownPhase::Draining)
    }

    /// Abandon the drain. Returns `true` if this call changed the phase.
    pub fn force(&self) -> bool {
        self.advance(ShutdownPhase::Forced)
    }

    /// Current phase.
    pub fn phase(&self) -> ShutdownPhase {
        *self.tx.borrow()
    }

    fn advance(&self, next: ShutdownPhase) -> bool {
        self.tx.send_if_modified(|phase| {
            if *phase < next {
                *phase = next;
                true
            } else {
                false
            }
        })
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of [`Shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<ShutdownPhase>,
}

impl ShutdownSignal {
    /// Resolve once shutdown has begun (draining or forced).
    pub async fn draining(&mut self) {
        let _ = self.rx.wait_for(|p| *p >= ShutdownPhase::Draining).await;
    }

    /// Resolve once the drain has been abandoned.
    pub async fn forced(&mut self) {
        if self.rx.wait_for(|p| *p == ShutdownPhase::Forced).await.is_err() {
            // Coordinator gone without forcing; nothing will ever force us.
            std::future::pending::<()>().await;
        }
    }
}
