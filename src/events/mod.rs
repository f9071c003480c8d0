//! Crawler-wide event bus (§4.11).
//!
//! Grounded on the teacher's `crawl_events::bus`: a `tokio::sync::broadcast`
//! channel wrapped with atomic publish/lag counters and a bounded capacity,
//! so a slow or absent subscriber can never block the crawler loop.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Crawler lifecycle and periodic events, broadcast to any number of
/// subscribers (persistence hooks, progress bars, metrics exporters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CrawlerEvent {
    /// Emitted every `persist_state_interval` by whichever component owns
    /// persistable state (`RequestQueue`, `SessionPool`, ...).
    PersistState,
    /// Emitted by the `Snapshotter` on its sampling interval.
    SystemInfo(crate::system::Snapshot),
    /// A session was retired (blocked, expired, or error-scored out).
    SessionRetired { session_id: String },
    /// Graceful shutdown has started; subscribers should flush and persist.
    Aborting,
    /// The crawler has finished running `run()` and torn down its state.
    Exit,
}

#[derive(Debug, Default)]
struct EventMetrics {
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Owned by `Configuration` and shared by reference with every component
/// that needs to publish or subscribe.
#[derive(Clone)]
pub struct EventManager {
    sender: broadcast::Sender<CrawlerEvent>,
    metrics: Arc<EventMetrics>,
}

impl EventManager {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            metrics: Arc::new(EventMetrics::default()),
        }
    }

    /// Broadcast an event. Returns the number of live subscribers that
    /// received it; `0` is normal (no one is listening) and not an error.
    pub fn publish(&self, event: CrawlerEvent) -> usize {
        self.metrics.published.fetch_add(1, Ordering::Relaxed);
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => 0,
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlerEvent> {
        self.sender.subscribe()
    }

    /// Number of currently subscribed receivers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.metrics.published.load(Ordering::Relaxed)
    }

    /// Marks that a subscriber observed a `RecvError::Lagged(n)` so callers
    /// can surface overload without the bus itself needing to poll
    /// receivers.
    pub fn record_lag(&self, skipped: u64) {
        self.metrics.dropped.fetch_add(skipped, Ordering::Relaxed);
    }

    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.metrics.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let manager = EventManager::default();
        let mut rx = manager.subscribe();
        manager.publish(CrawlerEvent::Aborting);
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, CrawlerEvent::Aborting));
        assert_eq!(manager.published_count(), 1);
    }

    #[test]
    fn publish_with_no_subscribers_is_not_an_error() {
        let manager = EventManager::default();
        assert_eq!(manager.publish(CrawlerEvent::Exit), 0);
    }
}
