//! Run-level counters (§4.8), grounded on the teacher's `EventBusMetrics`:
//! plain atomics read into an immutable snapshot rather than exposed
//! directly, so a caller never observes a statistics struct mid-update.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub requests_finished: u64,
    pub requests_failed: u64,
    pub retry_count: u64,
    pub sessions_retired: u64,
    pub crawler_runtime_millis: u64,
}

pub struct Statistics {
    requests_finished: AtomicU64,
    requests_failed: AtomicU64,
    retry_count: AtomicU64,
    sessions_retired: AtomicU64,
    started_at: Instant,
}

impl Statistics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests_finished: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            retry_count: AtomicU64::new(0),
            sessions_retired: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_finished(&self) {
        self.requests_finished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_retired(&self) {
        self.sessions_retired.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            requests_finished: self.requests_finished.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            retry_count: self.retry_count.load(Ordering::Relaxed),
            sessions_retired: self.sessions_retired.load(Ordering::Relaxed),
            crawler_runtime_millis: self.started_at.elapsed().as_millis() as u64,
        }
    }

    /// The `Crawler`'s periodic persistence tick writes this through a
    /// `storage::KeyValueStore` under `DEFAULT_STATISTICS_PERSIST_KEY`.
    #[must_use]
    pub fn persist_state(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}
