//! System resource sampling (§4.1-4.2): `Snapshotter` periodically samples
//! event-loop lag, memory, CPU and client-error rates into `Snapshot`s;
//! `SystemStatus` folds a rolling window of snapshots into independent
//! per-resource overload verdicts the `AutoscaledPool` autoscale step reads
//! on every tick.
//!
//! Grounded on the teacher's `EventBusMetrics`/`DomainHealth`: plain atomics
//! read into an immutable, serializable snapshot struct rather than exposing
//! the live counters directly.

mod snapshotter;

pub use snapshotter::Snapshotter;

use crate::utils::{
    DEFAULT_CURRENT_HISTORY_SECS, DEFAULT_MAX_BLOCKED_MILLIS, DEFAULT_MAX_CLIENT_ERRORS,
    DEFAULT_MAX_CPU_OVERLOADED_RATIO, DEFAULT_MAX_RESOURCE_OVERLOADED_RATIO,
    DEFAULT_MAX_USED_CPU_RATIO, DEFAULT_MAX_USED_MEMORY_RATIO, DEFAULT_SNAPSHOT_HISTORY_SECS,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A single point-in-time resource reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at_millis: u64,
    pub event_loop_blocked_millis: u64,
    pub used_memory_ratio: f64,
    pub used_cpu_ratio: f64,
    pub client_errors: u64,
}

impl Snapshot {
    #[must_use]
    pub fn memory_overloaded(&self) -> bool {
        self.used_memory_ratio > DEFAULT_MAX_USED_MEMORY_RATIO
    }

    #[must_use]
    pub fn cpu_overloaded(&self) -> bool {
        self.used_cpu_ratio > DEFAULT_MAX_USED_CPU_RATIO
    }

    #[must_use]
    pub fn event_loop_overloaded(&self) -> bool {
        self.event_loop_blocked_millis > DEFAULT_MAX_BLOCKED_MILLIS
    }

    #[must_use]
    pub fn client_overloaded(&self) -> bool {
        self.client_errors > DEFAULT_MAX_CLIENT_ERRORS
    }

    /// Any resource independently overloaded, at its own threshold.
    #[must_use]
    pub fn is_overloaded(&self) -> bool {
        self.memory_overloaded() || self.cpu_overloaded() || self.event_loop_overloaded() || self.client_overloaded()
    }
}

/// Pluggable resource reader so tests can feed synthetic load without a
/// real OS/process handle. Event-loop lag is measured by the `Snapshotter`
/// itself (it needs wall-clock drift across an await point); this trait
/// covers the three readings that don't.
pub trait ResourceSampler: Send + Sync {
    /// `(used_memory_ratio, used_cpu_ratio, client_errors)`.
    fn sample(&self) -> (f64, f64, u64);
}

/// A coarse self-reported counter; good enough for a library default,
/// callers embedding this in a larger host process are expected to supply
/// their own `ResourceSampler` backed by real OS/process metrics.
#[derive(Default)]
pub struct DefaultResourceSampler {
    client_errors: AtomicU64,
}

impl DefaultResourceSampler {
    pub fn record_client_error(&self) {
        self.client_errors.fetch_add(1, Ordering::Relaxed);
    }
}

impl ResourceSampler for DefaultResourceSampler {
    fn sample(&self) -> (f64, f64, u64) {
        (0.0, 0.0, self.client_errors.load(Ordering::Relaxed))
    }
}

/// Rolling window of `Snapshot`s with a time-weighted overload verdict
/// (§4.2): each sample's weight is the time delta to the next sample (or to
/// "now" for the most recent one), so unevenly-spaced samples don't skew a
/// plain count ratio.
pub struct SystemStatus {
    history: Mutex<VecDeque<Snapshot>>,
    history_window: Duration,
}

impl SystemStatus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: Mutex::new(VecDeque::new()),
            history_window: Duration::from_secs(DEFAULT_SNAPSHOT_HISTORY_SECS),
        }
    }

    pub fn record(&self, snapshot: Snapshot) {
        let mut history = self.history.lock();
        history.push_back(snapshot);
        let cutoff = snapshot.taken_at_millis.saturating_sub(self.history_window.as_millis() as u64);
        while history.front().is_some_and(|s| s.taken_at_millis < cutoff) {
            history.pop_front();
        }
    }

    #[must_use]
    pub fn latest(&self) -> Option<Snapshot> {
        self.history.lock().back().copied()
    }

    /// Time-weighted fraction of `[cutoff, now_millis]` during which
    /// `predicate` held, over whatever samples fall in that window.
    fn weighted_ratio(&self, now_millis: u64, window_secs: u64, predicate: impl Fn(&Snapshot) -> bool) -> f64 {
        let cutoff = now_millis.saturating_sub(window_secs * 1000);
        let history = self.history.lock();
        let samples: Vec<Snapshot> = history.iter().filter(|s| s.taken_at_millis >= cutoff).copied().collect();
        if samples.is_empty() {
            return 0.0;
        }

        let mut overloaded_millis: u64 = 0;
        let mut total_millis: u64 = 0;
        for (i, sample) in samples.iter().enumerate() {
            let start = sample.taken_at_millis.max(cutoff);
            let end = samples.get(i + 1).map_or(now_millis, |next| next.taken_at_millis);
            let weight = end.saturating_sub(start);
            total_millis += weight;
            if predicate(sample) {
                overloaded_millis += weight;
            }
        }

        if total_millis == 0 {
            return 0.0;
        }
        overloaded_millis as f64 / total_millis as f64
    }

    /// Whether any resource is overloaded by its own time-weighted ratio
    /// within the last `window_secs` of history (memory/event-loop/client
    /// at `DEFAULT_MAX_RESOURCE_OVERLOADED_RATIO`, CPU at
    /// `DEFAULT_MAX_CPU_OVERLOADED_RATIO`).
    #[must_use]
    pub fn is_overloaded_in_window(&self, now_millis: u64, window_secs: u64) -> bool {
        self.weighted_ratio(now_millis, window_secs, Snapshot::memory_overloaded) > DEFAULT_MAX_RESOURCE_OVERLOADED_RATIO
            || self.weighted_ratio(now_millis, window_secs, Snapshot::event_loop_overloaded)
                > DEFAULT_MAX_RESOURCE_OVERLOADED_RATIO
            || self.weighted_ratio(now_millis, window_secs, Snapshot::client_overloaded)
                > DEFAULT_MAX_RESOURCE_OVERLOADED_RATIO
            || self.weighted_ratio(now_millis, window_secs, Snapshot::cpu_overloaded) > DEFAULT_MAX_CPU_OVERLOADED_RATIO
    }

    /// Full-history verdict; gates the autoscaler's scale-up decision (§4.3:
    /// don't grow concurrency while the system has been historically
    /// overloaded, even if the most recent instant looks fine).
    #[must_use]
    pub fn is_historically_overloaded(&self, now_millis: u64) -> bool {
        self.is_overloaded_in_window(now_millis, DEFAULT_SNAPSHOT_HISTORY_SECS)
    }

    /// Short-window verdict; gates the autoscaler's scale-down decision.
    #[must_use]
    pub fn is_currently_overloaded(&self, now_millis: u64) -> bool {
        self.is_overloaded_in_window(now_millis, DEFAULT_CURRENT_HISTORY_SECS)
    }
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self::new()
    }
}
