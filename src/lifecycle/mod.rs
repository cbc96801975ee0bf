//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → metrics, store monitor, tracker → bind → serve
//!
//! Shutdown (shutdown.rs):
//!     Running → Draining (stop accepting, finish in-flight) → exit 0
//!     Draining → Forced (second signal) or drain deadline → exit 1
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     Second SIGTERM/SIGINT → Force
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Only one shutdown sequence per process
//! - Shutdown has timeout: forced exit after deadline

pub mod inflight;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use inflight::InflightTracker;
pub use shutdown::{Shutdown, ShutdownPhase, ShutdownSignal};
pub use signals::spawn_signal_listener;
pub use startup::Application;
