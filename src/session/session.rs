//! A single rotation unit: cookies, error score, and usage bookkeeping for
//! one simulated "browser identity" (§3 Session).

use crate::cookie::CookieJar;
use crate::utils::{DEFAULT_MAX_ERROR_SCORE, DEFAULT_MAX_USAGE_COUNT, DEFAULT_SESSION_MAX_AGE_SECS};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionState {
    cookie_jar: CookieJar,
    error_score: f64,
    usage_count: u32,
}

/// A rotation unit handed out by a `SessionPool` and returned (or retired)
/// after use.
///
/// Mutable fields live behind a `parking_lot::Mutex` rather than individual
/// atomics: `error_score`/`usage_count`/cookie updates need to move
/// together so a concurrent reader never observes a torn mid-update state.
pub struct Session {
    pub id: String,
    created_at: chrono::DateTime<chrono::Utc>,
    state: Mutex<SessionState>,
    retired: AtomicBool,
    max_usage_count: AtomicU32,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: chrono::Utc::now(),
            state: Mutex::new(SessionState {
                cookie_jar: CookieJar::new(),
                error_score: 0.0,
                usage_count: 0,
            }),
            retired: AtomicBool::new(false),
            max_usage_count: AtomicU32::new(DEFAULT_MAX_USAGE_COUNT),
        }
    }

    #[must_use]
    pub fn with_max_usage_count(self, max_usage_count: u32) -> Self {
        self.max_usage_count.store(max_usage_count, Ordering::Relaxed);
        self
    }

    pub fn mark_used(&self) {
        self.state.lock().usage_count += 1;
    }

    /// Error score increases on failure and decays by
    /// `error_score_decrement` on every success, so a session that recovers
    /// earns back trust instead of staying permanently marked (§9 Open
    /// Question, resolved in DESIGN.md: decrement applies unconditionally,
    /// not only after a run of failures).
    pub fn mark_bad(&self, weight: f64) {
        let mut state = self.state.lock();
        state.error_score += weight;
    }

    pub fn mark_good(&self, error_score_decrement: f64) {
        let mut state = self.state.lock();
        state.error_score = (state.error_score - error_score_decrement).max(0.0);
    }

    pub fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Whether the session should be pulled from rotation: explicitly
    /// retired, over its error budget, over its usage budget, or past its
    /// max age.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        if self.is_retired() {
            return false;
        }
        let state = self.state.lock();
        if state.error_score >= DEFAULT_MAX_ERROR_SCORE {
            return false;
        }
        if state.usage_count >= self.max_usage_count.load(Ordering::Relaxed) {
            return false;
        }
        let age = chrono::Utc::now() - self.created_at;
        age.num_seconds() < DEFAULT_SESSION_MAX_AGE_SECS as i64
    }

    pub fn cookies(&self) -> CookieJar {
        self.state.lock().cookie_jar.clone()
    }

    pub fn set_cookie(&self, cookie: crate::cookie::Cookie) {
        self.state.lock().cookie_jar.set(cookie);
    }

    #[must_use]
    pub fn error_score(&self) -> f64 {
        self.state.lock().error_score
    }

    #[must_use]
    pub fn usage_count(&self) -> u32 {
        self.state.lock().usage_count
    }
}
