//! In-flight request tracking for graceful drain.
//!
//! # Responsibilities
//! - Count requests between arrival and the end of their response body
//! - Let the drain phase report outstanding work

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Inner {
    active: AtomicU64,
}

/// Tracks requests that have not finished sending their response.
#[derive(Debug, Clone, Default)]
pub struct InflightTracker {
    inner: Arc<Inner>,
}

impl InflightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new request. The count drops again when the guard is dropped.
    pub fn track(&self) -> InflightGuard {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        InflightGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.inner.active.load(Ordering::SeqCst)
    }
}

/// Held for the lifetime of one request.
#[derive(Debug)]
pub struct InflightGuard {
    inner: Arc<Inner>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
    }
}
