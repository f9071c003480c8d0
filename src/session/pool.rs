//! Pool that hands out usable `Session`s, retiring and replacing them as
//! they wear out (§4.6).

use super::Session;
use crate::events::{CrawlerEvent, EventManager};
use dashmap::DashMap;
use rand::seq::IteratorRandom;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Owns the live session set and rotates through it on `get_session`.
///
/// Grounded on the teacher's `DomainLimiter`: a `DashMap<String, Arc<_>>`
/// read under a random-sample strategy rather than a round-robin index, so
/// concurrent callers don't contend on a single shared cursor.
pub struct SessionPool {
    sessions: DashMap<String, Arc<Session>>,
    max_pool_size: usize,
    next_id: AtomicU64,
    events: Option<EventManager>,
}

impl SessionPool {
    #[must_use]
    pub fn new(max_pool_size: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_pool_size,
            next_id: AtomicU64::new(0),
            events: None,
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: EventManager) -> Self {
        self.events = Some(events);
        self
    }

    /// Returns the session named `id`, creating it if it doesn't exist yet.
    /// Without an `id`, prefers creating a brand-new session while the pool
    /// has spare capacity, falling back to a random pick among existing
    /// sessions only once the pool is full (§4.6) — this is what makes the
    /// pool actually rotate through up to `max_pool_size` distinct
    /// identities instead of settling on whichever session it created
    /// first.
    #[must_use]
    pub fn get_session(&self, id: Option<&str>) -> Arc<Session> {
        self.retire_unusable();

        if let Some(id) = id {
            if let Some(entry) = self.sessions.get(id) {
                return entry.value().clone();
            }
            return self.create_session_with_id(id.to_string());
        }

        if self.has_spare_capacity() {
            return self.create_session();
        }

        if let Some(entry) = self.sessions.iter().choose(&mut rand::rng()) {
            return entry.value().clone();
        }

        self.create_session()
    }

    fn create_session(&self) -> Arc<Session> {
        let id = format!("session_{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.create_session_with_id(id)
    }

    fn create_session_with_id(&self, id: String) -> Arc<Session> {
        let session = Arc::new(Session::new(id.clone()));
        self.sessions.insert(id, session.clone());
        session
    }

    /// Sweeps retired/expired sessions out of the pool; called on every
    /// `get_session` so the pool never grows without bound even if nothing
    /// else drives it.
    fn retire_unusable(&self) {
        self.sessions.retain(|_, session| {
            let usable = session.is_usable();
            if !usable {
                if let Some(events) = &self.events {
                    events.publish(CrawlerEvent::SessionRetired {
                        session_id: session.id.clone(),
                    });
                }
            }
            usable
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[must_use]
    pub fn has_spare_capacity(&self) -> bool {
        self.sessions.len() < self.max_pool_size
    }

    /// Serializes the pool's cookie state, one entry per live session. The
    /// `Crawler`'s periodic persistence tick writes this through a
    /// `storage::KeyValueStore` under `DEFAULT_SESSION_POOL_PERSIST_KEY`.
    #[must_use]
    pub fn persist_state(&self) -> serde_json::Value {
        let sessions: serde_json::Map<String, serde_json::Value> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().cookies().serialize()))
            .collect();
        serde_json::Value::Object(sessions)
    }
}

impl Default for SessionPool {
    fn default() -> Self {
        Self::new(crate::utils::DEFAULT_MAX_POOL_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_session_creates_a_new_session_when_pool_is_empty() {
        let pool = SessionPool::new(10);
        assert!(pool.is_empty());
        let session = pool.get_session(None);
        assert_eq!(pool.len(), 1);
        assert!(!session.is_retired());
    }

    #[test]
    fn get_session_creates_distinct_sessions_while_under_capacity() {
        let pool = SessionPool::new(10);
        let a = pool.get_session(None);
        let b = pool.get_session(None);
        assert_ne!(a.id, b.id);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn get_session_picks_randomly_once_the_pool_is_full() {
        let pool = SessionPool::new(1);
        let first = pool.get_session(None);
        let second = pool.get_session(None);
        assert_eq!(first.id, second.id);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn get_session_by_id_creates_then_reuses_the_named_session() {
        let pool = SessionPool::new(10);
        let first = pool.get_session(Some("named"));
        let second = pool.get_session(Some("named"));
        assert_eq!(first.id, second.id);
        assert_eq!(first.id, "named");
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn retired_sessions_are_swept_and_replaced() {
        let pool = SessionPool::new(1);
        let session = pool.get_session(None);
        session.retire();
        let next = pool.get_session(None);
        assert_ne!(session.id, next.id);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn has_spare_capacity_reflects_max_pool_size() {
        let pool = SessionPool::new(1);
        assert!(pool.has_spare_capacity());
        pool.get_session(None);
        assert!(!pool.has_spare_capacity());
    }
}
