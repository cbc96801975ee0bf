//! Periodic process sampling.
//!
//! Two independent background tasks, started only when metrics are enabled:
//! - every 10 s: resident and virtual memory into their gauges, then
//!   registry upkeep so buffered histogram samples are folded in
//! - every 100 ms: scheduler lag, i.e. how late the timer actually fired
//!
//! Both stop when shutdown begins. Spawned tokio tasks never keep the
//! runtime alive on their own.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::observability::instruments::{MetricsContext, ServiceInstruments};

pub const MEMORY_INTERVAL: Duration = Duration::from_secs(10);
pub const LAG_INTERVAL: Duration = Duration::from_millis(100);

/// Lag measurement relative to the previous actual tick.
///
/// Measuring against the last real tick rather than a fixed schedule keeps
/// one slow tick from inflating every value after it.
#[derive(Debug)]
pub struct LagProbe {
    last: Instant,
    expected: Duration,
}

impl LagProbe {
    pub fn new(expected: Duration, now: Instant) -> Self {
        Self { last: now, expected }
    }

    /// Record a tick at `now` and return the lag in milliseconds, never negative.
    pub fn tick(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last);
        self.last = now;
        let lag_ms = (elapsed.as_secs_f64() - self.expected.as_secs_f64()) * 1000.0;
        lag_ms.max(0.0)
    }
}

/// Current (resident, virtual) memory of this process in bytes.
pub fn read_memory() -> Option<(u64, u64)> {
    memory_stats::memory_stats().map(|m| (m.physical_mem as u64, m.virtual_mem as u64))
}

/// Owner of the two sampling tasks.
pub struct Sampler {
    metrics: MetricsContext,
    memory_interval: Duration,
    lag_interval: Duration,
}

impl Sampler {
    pub fn new(metrics: MetricsContext) -> Self {
        Self::with_intervals(metrics, MEMORY_INTERVAL, LAG_INTERVAL)
    }

    pub fn with_intervals(metrics: MetricsContext, memory_interval: Duration, lag_interval: Duration) -> Self {
        Self {
            metrics,
            memory_interval,
            lag_interval,
        }
    }

    /// Start both tasks. They run until `shutdown` leaves the running phase.
    pub fn spawn(self, shutdown: &Shutdown) -> SamplerHandle {
        tracing::debug!(
            memory_interval = ?self.memory_interval,
            lag_interval = ?self.lag_interval,
            "Sampler starting"
        );

        let memory = tokio::spawn(sample_memory(
            self.metrics.clone(),
            self.memory_interval,
            shutdown.subscribe(),
        ));
        let lag = tokio::spawn(sample_lag(
            Arc::clone(&self.metrics.instruments),
            self.lag_interval,
            shutdown.subscribe(),
        ));

        SamplerHandle { tasks: vec![memory, lag] }
    }
}

/// Join handles of the running sampler tasks.
pub struct SamplerHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl SamplerHandle {
    /// Wait for both tasks to observe shutdown and exit.
    pub async fn join(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

async fn sample_memory(metrics: MetricsContext, every: Duration, mut shutdown: ShutdownSignal) {
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match read_memory() {
                    Some((resident, virt)) => {
                        metrics.instruments.memory.set(resident as f64);
                        metrics.instruments.virtual_memory.set(virt as f64);
                    }
                    None => tracing::debug!("Memory statistics unavailable on this platform"),
                }
                metrics.registry.run_upkeep();
            }
            _ = shutdown.draining() => break,
        }
    }
    tracing::debug!("Memory sampler stopped");
}

async fn sample_lag(instruments: Arc<ServiceInstruments>, every: Duration, mut shutdown: ShutdownSignal) {
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; consume it so the probe starts
    // from a real tick.
    ticker.tick().await;
    let mut probe = LagProbe::new(every, Instant::now());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let lag = probe.tick(Instant::now());
                instruments.event_loop_lag.set(lag);
            }
            _ = shutdown.draining() => break,
        }
    }
    tracing::debug!("Lag sampler stopped");
}
