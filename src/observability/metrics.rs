//! Metrics registry and text exposition.
//!
//! # Responsibilities
//! - Register named instruments (counter, gauge, histogram) once at startup
//! - Record observations through the `metrics` recorder API
//! - Render a Prometheus text snapshot for scraping
//!
//! # Design Decisions
//! - Each `Registry` owns its own `PrometheusRecorder` built with
//!   `build_recorder()`; nothing is installed as the global recorder, so
//!   every test can work against a fresh registry
//! - The instrument set is fixed after registration; only values change
//! - Recording never fails into the caller: label or kind mismatches are
//!   logged and dropped. The `try_*` variants expose the error instead.
//! - Histogram buckets are fixed per registry at construction time

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use ::metrics::{Key, Label, Level, Metadata, Recorder};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

/// Content type of the text exposition format.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Default histogram buckets, in seconds, tuned for web request latencies.
pub const DEFAULT_BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

static METADATA: Metadata<'static> = Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

/// Kind of a registered instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    Counter,
    Gauge,
    Histogram,
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InstrumentKind::Counter => "counter",
            InstrumentKind::Gauge => "gauge",
            InstrumentKind::Histogram => "histogram",
        })
    }
}

/// Errors raised by the registry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricsError {
    #[error("metric '{0}' is already registered")]
    DuplicateName(String),

    #[error("invalid metric or label name '{0}'")]
    InvalidName(String),

    #[error("histogram buckets must be non-empty, finite and strictly increasing")]
    InvalidBuckets,

    #[error("metric '{name}' expects labels {expected:?}, got {got:?}")]
    LabelMismatch {
        name: String,
        expected: Vec<String>,
        got: Vec<String>,
    },

    #[error("cannot {op} on {kind} '{name}'")]
    WrongKind {
        name: String,
        kind: InstrumentKind,
        op: &'static str,
    },

    #[error("metric '{name}' rejected value {value}")]
    InvalidValue { name: String, value: f64 },
}

#[derive(Debug)]
struct Instrument {
    name: String,
    kind: InstrumentKind,
    label_names: Vec<String>,
}

impl Instrument {
    /// Build the recorder key, with labels ordered like `label_names`.
    fn key_for(&self, labels: &[(&str, &str)]) -> Result<Key, MetricsError> {
        let mismatch = || MetricsError::LabelMismatch {
            name: self.name.clone(),
            expected: self.label_names.clone(),
            got: labels.iter().map(|(k, _)| k.to_string()).collect(),
        };

        if labels.len() != self.label_names.len() {
            return Err(mismatch());
        }

        let mut ordered = Vec::with_capacity(self.label_names.len());
        for expected in &self.label_names {
            let mut found = labels.iter().filter(|(k, _)| *k == expected.as_str());
            match (found.next(), found.next()) {
                (Some((_, v)), None) => ordered.push(Label::new(expected.clone(), v.to_string())),
                _ => return Err(mismatch()),
            }
        }
        Ok(Key::from_parts(self.name.clone(), ordered))
    }

    fn expect_kind(&self, kind: InstrumentKind, op: &'static str) -> Result<(), MetricsError> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(MetricsError::WrongKind {
                name: self.name.clone(),
                kind: self.kind,
                op,
            })
        }
    }
}

/// Shared handle to a registered instrument.
///
/// Cloning is cheap; all clones record into the same recorder.
#[derive(Clone)]
pub struct InstrumentHandle {
    instrument: Arc<Instrument>,
    recorder: Arc<PrometheusRecorder>,
}

impl fmt::Debug for InstrumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentHandle")
            .field("name", &self.instrument.name)
            .field("kind", &self.instrument.kind)
            .finish()
    }
}

impl InstrumentHandle {
    pub fn name(&self) -> &str {
        &self.instrument.name
    }

    pub fn kind(&self) -> InstrumentKind {
        self.instrument.kind
    }

    /// Record one histogram observation.
    pub fn observe(&self, labels: &[(&str, &str)], value: f64) {
        if let Err(e) = self.try_observe(labels, value) {
            tracing::warn!(error = %e, "Dropped metric observation");
        }
    }

    /// Set an unlabelled gauge.
    pub fn set(&self, value: f64) {
        self.set_with(&[], value);
    }

    /// Set one series of a labelled gauge.
    pub fn set_with(&self, labels: &[(&str, &str)], value: f64) {
        if let Err(e) = self.try_set(labels, value) {
            tracing::warn!(error = %e, "Dropped gauge update");
        }
    }

    /// Increment a counter series by one.
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.inc_by(labels, 1);
    }

    pub fn inc_by(&self, labels: &[(&str, &str)], delta: u64) {
        if let Err(e) = self.try_inc_by(labels, delta) {
            tracing::warn!(error = %e, "Dropped counter increment");
        }
    }

    pub fn try_observe(&self, labels: &[(&str, &str)], value: f64) -> Result<(), MetricsError> {
        self.instrument.expect_kind(InstrumentKind::Histogram, "observe")?;
        if !value.is_finite() {
            return Err(MetricsError::InvalidValue {
                name: self.instrument.name.clone(),
                value,
            });
        }
        let key = self.instrument.key_for(labels)?;
        self.recorder.register_histogram(&key, &METADATA).record(value);
        Ok(())
    }

    pub fn try_set(&self, labels: &[(&str, &str)], value: f64) -> Result<(), MetricsError> {
        self.instrument.expect_kind(InstrumentKind::Gauge, "set")?;
        let key = self.instrument.key_for(labels)?;
        self.recorder.register_gauge(&key, &METADATA).set(value);
        Ok(())
    }

    pub fn try_inc_by(&self, labels: &[(&str, &str)], delta: u64) -> Result<(), MetricsError> {
        self.instrument.expect_kind(InstrumentKind::Counter, "increment")?;
        let key = self.instrument.key_for(labels)?;
        self.recorder.register_counter(&key, &METADATA).increment(delta);
        Ok(())
    }
}

/// Process-lifetime collection of named instruments backed by a
/// Prometheus recorder.
pub struct Registry {
    recorder: Arc<PrometheusRecorder>,
    handle: PrometheusHandle,
    instruments: RwLock<BTreeMap<String, Arc<Instrument>>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("instruments", &self.names()).finish()
    }
}

impl Registry {
    /// Registry whose histograms use [`DEFAULT_BUCKETS`].
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new()
            .set_buckets(&DEFAULT_BUCKETS)
            .map(PrometheusBuilder::build_recorder)
            .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder());
        Self::from_recorder(recorder)
    }

    /// Registry whose histograms use the given bucket upper bounds.
    pub fn with_buckets(buckets: &[f64]) -> Result<Self, MetricsError> {
        let increasing = buckets.windows(2).all(|w| w[0] < w[1]);
        if !increasing || buckets.iter().any(|b| !b.is_finite()) {
            return Err(MetricsError::InvalidBuckets);
        }
        let builder = PrometheusBuilder::new()
            .set_buckets(buckets)
            .map_err(|_| MetricsError::InvalidBuckets)?;
        Ok(Self::from_recorder(builder.build_recorder()))
    }

    fn from_recorder(recorder: PrometheusRecorder) -> Self {
        Self {
            handle: recorder.handle(),
            recorder: Arc::new(recorder),
            instruments: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register an instrument under a process-unique name.
    pub fn register(
        &self,
        name: &str,
        kind: InstrumentKind,
        help: &str,
        label_names: &[&str],
    ) -> Result<InstrumentHandle, MetricsError> {
        if !is_valid_name(name) {
            return Err(MetricsError::InvalidName(name.to_string()));
        }
        for (i, label) in label_names.iter().enumerate() {
            if !is_valid_name(label) || label.starts_with("__") || *label == "le" || label_names[..i].contains(label) {
                return Err(MetricsError::InvalidName(label.to_string()));
            }
        }

        let mut instruments = self.instruments.write().unwrap_or_else(PoisonError::into_inner);
        if instruments.contains_key(name) {
            return Err(MetricsError::DuplicateName(name.to_string()));
        }

        let description = help.to_string().into();
        match kind {
            InstrumentKind::Counter => self.recorder.describe_counter(name.to_string().into(), None, description),
            InstrumentKind::Gauge => self.recorder.describe_gauge(name.to_string().into(), None, description),
            InstrumentKind::Histogram => self.recorder.describe_histogram(name.to_string().into(), None, description),
        }

        let instrument = Arc::new(Instrument {
            name: name.to_string(),
            kind,
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
        });
        instruments.insert(name.to_string(), Arc::clone(&instrument));

        // Unlabelled scalars are exposed from registration, starting at zero.
        if label_names.is_empty() {
            let key = Key::from_name(name.to_string());
            match kind {
                InstrumentKind::Counter => self.recorder.register_counter(&key, &METADATA).absolute(0),
                InstrumentKind::Gauge => self.recorder.register_gauge(&key, &METADATA).set(0.0),
                InstrumentKind::Histogram => {}
            }
        }

        tracing::debug!(metric = name, kind = %kind, "Registered metric");
        Ok(InstrumentHandle {
            instrument,
            recorder: Arc::clone(&self.recorder),
        })
    }

    /// Names of every registered instrument, sorted.
    pub fn names(&self) -> Vec<String> {
        let instruments = self.instruments.read().unwrap_or_else(PoisonError::into_inner);
        instruments.keys().cloned().collect()
    }

    /// Render every instrument in the text exposition format.
    pub fn render_exposition(&self) -> String {
        self.handle.render()
    }

    /// Drain buffered histogram samples into their buckets.
    pub fn run_upkeep(&self) {
        self.handle.run_upkeep();
    }

    /// Value of one rendered series line, e.g. `hits_total{route="/x"}`.
    #[cfg(test)]
    pub(crate) fn sample(&self, series: &str) -> Option<f64> {
        self.render_exposition().lines().find_map(|line| {
            let value = line.strip_prefix(series)?.strip_prefix(' ')?;
            value.trim().parse().ok()
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = Registry::new();
        registry
            .register("jobs_total", InstrumentKind::Counter, "Jobs", &[])
            .unwrap();
        let err = registry
            .register("jobs_total", InstrumentKind::Gauge, "Jobs again", &[])
            .unwrap_err();
        assert_eq!(err, MetricsError::DuplicateName("jobs_total".into()));
        assert_eq!(registry.names(), vec!["jobs_total"]);
    }

    #[test]
    fn registries_are_independent() {
        let first = Registry::new();
        let second = Registry::new();
        first
            .register("jobs_total", InstrumentKind::Counter, "Jobs", &[])
            .unwrap()
            .inc(&[]);
        second
            .register("jobs_total", InstrumentKind::Counter, "Jobs", &[])
            .unwrap();

        assert_eq!(first.sample("jobs_total"), Some(1.0));
        assert_eq!(second.sample("jobs_total"), Some(0.0));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let registry = Registry::new();
        assert!(matches!(
            registry.register("9lives", InstrumentKind::Gauge, "", &[]),
            Err(MetricsError::InvalidName(_))
        ));
        assert!(matches!(
            registry.register("ok_name", InstrumentKind::Histogram, "", &["le"]),
            Err(MetricsError::InvalidName(_))
        ));
        assert!(matches!(
            registry.register("ok_name", InstrumentKind::Counter, "", &["a", "a"]),
            Err(MetricsError::InvalidName(_))
        ));
    }

    #[test]
    fn histogram_renders_cumulative_buckets() {
        let registry = Registry::with_buckets(&[0.1, 1.0]).unwrap();
        let hist = registry
            .register("latency_seconds", InstrumentKind::Histogram, "Latency", &["route"])
            .unwrap();
        hist.observe(&[("route", "/a")], 0.0625);
        hist.observe(&[("route", "/a")], 0.5);
        hist.observe(&[("route", "/a")], 3.0);

        let text = registry.render_exposition();
        assert!(text.contains("# HELP latency_seconds Latency"));
        assert!(text.contains("# TYPE latency_seconds histogram"));
        assert_eq!(registry.sample("latency_seconds_bucket{route=\"/a\",le=\"0.1\"}"), Some(1.0));
        assert_eq!(registry.sample("latency_seconds_bucket{route=\"/a\",le=\"+Inf\"}"), Some(3.0));
        assert_eq!(registry.sample("latency_seconds_sum{route=\"/a\"}"), Some(3.5625));
        assert_eq!(registry.sample("latency_seconds_count{route=\"/a\"}"), Some(3.0));
    }

    #[test]
    fn label_order_at_call_site_does_not_matter() {
        let registry = Registry::new();
        let hist = registry
            .register("req_seconds", InstrumentKind::Histogram, "Requests", &["method", "status_code"])
            .unwrap();
        hist.observe(&[("method", "GET"), ("status_code", "200")], 0.01);
        hist.observe(&[("status_code", "200"), ("method", "GET")], 0.02);
        assert_eq!(
            registry.sample("req_seconds_count{method=\"GET\",status_code=\"200\"}"),
            Some(2.0)
        );
    }

    #[test]
    fn mismatched_labels_are_dropped_not_raised() {
        let registry = Registry::new();
        let hist = registry
            .register("req_seconds", InstrumentKind::Histogram, "Requests", &["method"])
            .unwrap();

        let err = hist.try_observe(&[("verb", "GET")], 0.1).unwrap_err();
        assert!(matches!(err, MetricsError::LabelMismatch { .. }));

        // The logging variant swallows the same error.
        hist.observe(&[("method", "GET"), ("extra", "x")], 0.1);
        assert!(!registry.render_exposition().contains("req_seconds_count"));
    }

    #[test]
    fn operations_are_checked_against_kind() {
        let registry = Registry::new();
        let gauge = registry
            .register("temperature", InstrumentKind::Gauge, "Temp", &[])
            .unwrap();
        assert!(matches!(
            gauge.try_observe(&[], 1.0),
            Err(MetricsError::WrongKind { op: "observe", .. })
        ));
        gauge.set(21.5);
        assert_eq!(registry.sample("temperature"), Some(21.5));
        gauge.set(-3.0);
        assert_eq!(registry.sample("temperature"), Some(-3.0));
    }

    #[test]
    fn counters_accumulate() {
        let registry = Registry::new();
        let counter = registry
            .register("hits_total", InstrumentKind::Counter, "Hits", &["route"])
            .unwrap();
        counter.inc(&[("route", "/x")]);
        counter.inc_by(&[("route", "/x")], 2);
        assert_eq!(registry.sample("hits_total{route=\"/x\"}"), Some(3.0));
        assert!(registry.render_exposition().contains("# TYPE hits_total counter"));
    }

    #[test]
    fn unlabelled_scalars_render_from_registration() {
        let registry = Registry::new();
        registry
            .register("queue_depth", InstrumentKind::Gauge, "Depth of queue", &[])
            .unwrap();
        let text = registry.render_exposition();
        assert!(text.contains("# HELP queue_depth Depth of queue"));
        assert_eq!(registry.sample("queue_depth"), Some(0.0));
    }

    #[test]
    fn label_values_are_escaped() {
        let registry = Registry::new();
        let counter = registry.register("odd_total", InstrumentKind::Counter, "", &["path"]).unwrap();
        counter.inc(&[("path", "a\"b")]);
        assert!(registry.render_exposition().contains("odd_total{path=\"a\\\"b\"} 1"));
    }

    #[test]
    fn non_finite_observations_are_rejected() {
        let registry = Registry::new();
        let hist = registry.register("h", InstrumentKind::Histogram, "", &[]).unwrap();
        assert!(hist.try_observe(&[], f64::NAN).is_err());
        assert!(!registry.render_exposition().contains("h_count"));
    }

    #[test]
    fn bucket_bounds_must_increase() {
        assert!(Registry::with_buckets(&[1.0, 0.5]).is_err());
        assert!(Registry::with_buckets(&[]).is_err());
        assert!(Registry::with_buckets(&[0.5, f64::INFINITY]).is_err());
        assert!(Registry::with_buckets(&[0.5, 1.0]).is_ok());
    }
}
