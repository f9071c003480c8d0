//! Periodic resource sampler (§4.1). Spawns a background tick that reads
//! memory/CPU/client-error state from a `ResourceSampler` and event-loop
//! lag from wall-clock drift across its own sleep, feeding both into a
//! shared `SystemStatus`.

use super::{ResourceSampler, Snapshot, SystemStatus};
use crate::events::{CrawlerEvent, EventManager};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Owns the sampling loop's lifecycle. `start`/`stop` are idempotent: a
/// second `start` while already running is a no-op, and `stop` on a
/// never-started instance is a no-op too.
pub struct Snapshotter {
    status: Arc<SystemStatus>,
    sampler: Arc<dyn ResourceSampler>,
    interval: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
    last_event_loop_lag_millis: Arc<AtomicU64>,
    events: Option<EventManager>,
}

impl Snapshotter {
    #[must_use]
    pub fn new(status: Arc<SystemStatus>, sampler: Arc<dyn ResourceSampler>, interval: Duration) -> Self {
        Self {
            status,
            sampler,
            interval,
            handle: Mutex::new(None),
            last_event_loop_lag_millis: Arc::new(AtomicU64::new(0)),
            events: None,
        }
    }

    /// Every sample this `Snapshotter` takes is also published as
    /// `CrawlerEvent::SystemInfo` once this is set.
    #[must_use]
    pub fn with_events(mut self, events: EventManager) -> Self {
        self.events = Some(events);
        self
    }

    pub fn start(self: Arc<Self>) {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return;
        }

        let this = self.clone();
        *handle = Some(tokio::spawn(async move {
            let mut expected_tick = Instant::now() + this.interval;
            loop {
                tokio::time::sleep_until(expected_tick).await;
                let lag = Instant::now().saturating_duration_since(expected_tick);
                this.last_event_loop_lag_millis
                    .store(lag.as_millis() as u64, Ordering::Relaxed);
                expected_tick += this.interval;

                let (used_memory_ratio, used_cpu_ratio, client_errors) = this.sampler.sample();
                let taken_at_millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
                let snapshot = Snapshot {
                    taken_at_millis,
                    event_loop_blocked_millis: lag.as_millis() as u64,
                    used_memory_ratio,
                    used_cpu_ratio,
                    client_errors,
                };
                this.status.record(snapshot);
                if let Some(events) = &this.events {
                    events.publish(CrawlerEvent::SystemInfo(snapshot));
                }
            }
        }));
    }

    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }

    #[must_use]
    pub fn get_event_loop_sample_millis(&self) -> u64 {
        self.last_event_loop_lag_millis.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_memory_sample(&self) -> f64 {
        self.status.latest().map_or(0.0, |s| s.used_memory_ratio)
    }

    #[must_use]
    pub fn get_cpu_sample(&self) -> f64 {
        self.status.latest().map_or(0.0, |s| s.used_cpu_ratio)
    }

    #[must_use]
    pub fn get_client_sample(&self) -> u64 {
        self.status.latest().map_or(0, |s| s.client_errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::DefaultResourceSampler;

    #[tokio::test]
    async fn start_feeds_samples_into_system_status() {
        let status = Arc::new(SystemStatus::new());
        let sampler = Arc::new(DefaultResourceSampler::default());
        let snapshotter = Arc::new(Snapshotter::new(status.clone(), sampler, Duration::from_millis(5)));
        snapshotter.clone().start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        snapshotter.stop();

        assert!(status.latest().is_some());
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op() {
        let status = Arc::new(SystemStatus::new());
        let sampler = Arc::new(DefaultResourceSampler::default());
        let snapshotter = Arc::new(Snapshotter::new(status, sampler, Duration::from_millis(5)));
        snapshotter.stop();
    }
}
