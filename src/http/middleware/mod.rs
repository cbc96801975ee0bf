//! Request pipeline middleware.
//!
//! Layers, outermost first:
//! ```text
//! request id → trace span → completion (timing, access log)
//!     → compression → security headers → error stage → catch panic
//!     → origin guard → CORS → rate limit → body limit → timeout → route
//! ```

pub mod access_log;
pub mod completion;
pub mod error_stage;

pub use access_log::AccessLogListener;
pub use completion::{CompletionHooks, CompletionListener, MetricsListener, RequestCompletion};
pub use error_stage::ErrorStage;
