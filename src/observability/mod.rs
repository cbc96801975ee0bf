//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request completion events:
//!     → instruments.rs (duration histogram, request counter)
//!     → http::middleware::access_log (one combined-format line)
//!
//! Background:
//!     → sampler.rs (memory every 10 s, scheduler lag every 100 ms)
//!
//! Consumers:
//!     → metrics.rs render_exposition (GET /api/metrics)
//!     → logging.rs subscriber (stdout, pretty or JSON)
//!     → tracker.rs (optional external error tracker)
//! ```
//!
//! # Design Decisions
//! - The registry is an explicit context object, never a global, so every
//!   test gets a fresh one
//! - Recording never fails a request; bad observations are logged and dropped
//! - Disabled metrics means no registry at all, not an empty one

pub mod instruments;
pub mod logging;
pub mod metrics;
pub mod sampler;
pub mod tracing;
pub mod tracker;

pub use instruments::{MetricsContext, ServiceInstruments};
pub use logging::{init_logging, LogLevelHandle};
pub use self::metrics::{InstrumentKind, MetricsError, Registry};
pub use sampler::Sampler;
pub use tracker::{ErrorTracker, SentryTracker};
