//! Document store connectivity.
//!
//! # Data Flow
//! ```text
//! MONGO_URI
//!     → uri.rs (parse hosts, strip credentials for logging)
//!     → monitor.rs (periodic reachability probe)
//!     → ReadyState cell (AtomicU8)
//!     → /api/health reads `dbConnected`
//! ```
//!
//! # Design Decisions
//! - The store itself is opaque; the service only depends on its
//!   connection state
//! - A lost connection degrades the health report, it never stops the process
//! - State values follow the driver convention (0 disconnected, 1 connected,
//!   2 connecting, 3 disconnecting)

pub mod monitor;
pub mod uri;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

pub use monitor::StoreMonitor;
pub use uri::ConnectionString;

/// Errors raised by the store subsystem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("unsupported connection scheme in '{0}' (expected mongodb:// or mongodb+srv://)")]
    UnsupportedScheme(String),

    #[error("connection string has no host")]
    MissingHost,

    #[error("invalid port '{0}'")]
    InvalidPort(String),
}

/// Connection state of the store client.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Disconnected = 0,
    Connected = 1,
    Connecting = 2,
    Disconnecting = 3,
}

impl From<u8> for ReadyState {
    fn from(val: u8) -> Self {
        match val {
            1 => ReadyState::Connected,
            2 => ReadyState::Connecting,
            3 => ReadyState::Disconnecting,
            _ => ReadyState::Disconnected,
        }
    }
}

/// Read-only view of the store connection used by the health check.
pub trait StoreStatus: Send + Sync {
    fn ready_state(&self) -> ReadyState;

    fn is_connected(&self) -> bool {
        self.ready_state() == ReadyState::Connected
    }
}

/// Shared connection-state cell written by [`StoreMonitor`].
#[derive(Debug, Clone)]
pub struct StoreHandle {
    state: Arc<AtomicU8>,
}

impl StoreHandle {
    pub fn new(initial: ReadyState) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(initial as u8)),
        }
    }

    /// A handle that never connects, used when no store is attached.
    pub fn disconnected() -> Self {
        Self::new(ReadyState::Disconnected)
    }

    pub(crate) fn set(&self, state: ReadyState) -> ReadyState {
        ReadyState::from(self.state.swap(state as u8, Ordering::AcqRel))
    }
}

impl StoreStatus for StoreHandle {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from(self.state.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connected_counts_as_connected() {
        let handle = StoreHandle::disconnected();
        assert!(!handle.is_connected());

        for state in [ReadyState::Connecting, ReadyState::Disconnecting, ReadyState::Disconnected] {
            handle.set(state);
            assert!(!handle.is_connected());
        }

        let previous = handle.set(ReadyState::Connected);
        assert_eq!(previous, ReadyState::Disconnected);
        assert!(handle.is_connected());
    }

    #[test]
    fn unknown_raw_values_read_as_disconnected() {
        assert_eq!(ReadyState::from(99), ReadyState::Disconnected);
    }
}
