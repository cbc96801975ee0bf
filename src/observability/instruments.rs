//! The service's fixed instrument set.
//!
//! Everything here is registered exactly once, when metrics are enabled at
//! startup. When metrics are disabled none of these types are constructed.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::observability::metrics::{InstrumentHandle, InstrumentKind, MetricsError, Registry};

pub const HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const PROCESS_MEMORY: &str = "process_memory_bytes";
pub const PROCESS_VIRTUAL_MEMORY: &str = "process_virtual_memory_bytes";
pub const PROCESS_START_TIME: &str = "process_start_time_seconds";
pub const EVENT_LOOP_LAG: &str = "event_loop_lag_ms";

const REQUEST_LABELS: [&str; 3] = ["method", "route", "status_code"];

/// Handles to every instrument the service records into.
#[derive(Debug, Clone)]
pub struct ServiceInstruments {
    pub request_duration: InstrumentHandle,
    pub requests_total: InstrumentHandle,
    pub memory: InstrumentHandle,
    pub virtual_memory: InstrumentHandle,
    pub start_time: InstrumentHandle,
    pub event_loop_lag: InstrumentHandle,
}

impl ServiceInstruments {
    pub fn register(registry: &Registry) -> Result<Self, MetricsError> {
        Ok(Self {
            request_duration: registry.register(
                HTTP_REQUEST_DURATION,
                InstrumentKind::Histogram,
                "Duration of HTTP requests in seconds",
                &REQUEST_LABELS,
            )?,
            requests_total: registry.register(
                HTTP_REQUESTS_TOTAL,
                InstrumentKind::Counter,
                "Total number of completed HTTP requests",
                &REQUEST_LABELS,
            )?,
            memory: registry.register(
                PROCESS_MEMORY,
                InstrumentKind::Gauge,
                "Resident set memory in bytes",
                &[],
            )?,
            virtual_memory: registry.register(
                PROCESS_VIRTUAL_MEMORY,
                InstrumentKind::Gauge,
                "Virtual memory size in bytes",
                &[],
            )?,
            start_time: registry.register(
                PROCESS_START_TIME,
                InstrumentKind::Gauge,
                "Start time of the process since unix epoch in seconds",
                &[],
            )?,
            event_loop_lag: registry.register(
                EVENT_LOOP_LAG,
                InstrumentKind::Gauge,
                "Event loop lag in ms",
                &[],
            )?,
        })
    }

    /// Fold one completed request into the duration histogram and counter.
    pub fn record_request(&self, method: &str, route: &str, status: u16, elapsed: Duration) {
        let status = status.to_string();
        let labels = [("method", method), ("route", route), ("status_code", status.as_str())];
        self.request_duration.observe(&labels, elapsed.as_secs_f64());
        self.requests_total.inc(&labels);
    }
}

/// Registry plus its registered instruments, created once at startup and
/// handed to the middleware, the sampler and the exposition handler.
#[derive(Debug, Clone)]
pub struct MetricsContext {
    pub registry: Arc<Registry>,
    pub instruments: Arc<ServiceInstruments>,
}

impl MetricsContext {
    /// Build a fresh registry with the service instruments.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let instruments = ServiceInstruments::register(&registry)?;

        let started = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        instruments.start_time.set(started.floor());

        Ok(Self {
            registry: Arc::new(registry),
            instruments: Arc::new(instruments),
        })
    }

    pub fn render(&self) -> String {
        self.registry.render_exposition()
    }
}
