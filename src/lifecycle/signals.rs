//! OS signal handling.
//!
//! # Responsibilities
//! - Register SIGTERM and SIGINT handlers
//! - First signal starts the drain, a second one abandons it
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGINT is treated exactly like SIGTERM

use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;

#[cfg(unix)]
struct Signals {
    term: tokio::signal::unix::Signal,
    int: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            term: signal(SignalKind::terminate())?,
            int: signal(SignalKind::interrupt())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.term.recv() => "SIGTERM",
            _ = self.int.recv() => "SIGINT",
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn register() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        let _ = tokio::signal::ctrl_c().await;
        "ctrl-c"
    }
}

/// Listen for termination signals and drive `shutdown`.
///
/// Handlers are registered before this returns, so a signal arriving right
/// after startup is never missed.
pub fn spawn_signal_listener(shutdown: Shutdown) -> std::io::Result<JoinHandle<()>> {
    let mut signals = Signals::register()?;

    Ok(tokio::spawn(async move {
        let name = signals.recv().await;
        if shutdown.trigger() {
            tracing::info!(signal = name, "Termination signal received, draining in-flight requests");
        }

        let name = signals.recv().await;
        if shutdown.force() {
            tracing::warn!(signal = name, "Second termination signal received, abandoning drain");
        }
    }))
}
