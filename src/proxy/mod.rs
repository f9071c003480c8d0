//! Proxy rotation (§4.9).
//!
//! Grounded on the teacher's `DomainLimiter`/rate-limiter style: a small
//! trait the crawler calls through, plus one concrete `DashMap`-backed
//! implementation that hands out proxy URLs on a rotation, sticking a
//! session to whichever URL it first received.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Proxy a single request was (or wasn't) served through, surfaced on
/// `CrawlingContext::proxy_info` (§4.7: the context shape names an optional
/// `proxyInfo`).
#[derive(Debug, Clone)]
pub struct ProxyInfo {
    pub url: String,
}

/// Resolves a proxy URL for a given session.
///
/// Implementations decide what "session" means for rotation: tying a
/// session to a fixed proxy for its lifetime, round-robining per call, or
/// returning `None` to mean "no proxy" are all valid.
pub trait ProxyConfiguration: Send + Sync {
    /// Proxy URL to use for `session_id`, or `None` for a direct
    /// connection. Returning `None` is a first-class result, not a
    /// "not configured" signal (Open Question, resolved in DESIGN.md).
    fn new_url(&self, session_id: &str) -> Option<String>;
}

/// Rotates through a fixed pool of proxy URLs, one sticky assignment per
/// session so retries on the same session keep the same proxy.
pub struct RotatingProxyConfiguration {
    urls: Vec<String>,
    next: AtomicUsize,
    assignments: DashMap<String, usize>,
}

impl RotatingProxyConfiguration {
    /// # Panics
    /// Panics if `urls` is empty — a proxy configuration with no proxies is
    /// a construction error, not a runtime "no proxy" case.
    #[must_use]
    pub fn new(urls: Vec<String>) -> Self {
        assert!(!urls.is_empty(), "RotatingProxyConfiguration needs at least one URL");
        Self {
            urls,
            next: AtomicUsize::new(0),
            assignments: DashMap::new(),
        }
    }
}

impl ProxyConfiguration for RotatingProxyConfiguration {
    fn new_url(&self, session_id: &str) -> Option<String> {
        let idx = *self
            .assignments
            .entry(session_id.to_string())
            .or_insert_with(|| self.next.fetch_add(1, Ordering::Relaxed) % self.urls.len());
        self.urls.get(idx).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sticks_a_session_to_its_first_assigned_proxy() {
        let config = RotatingProxyConfiguration::new(vec!["http://p1".into(), "http://p2".into()]);
        let first = config.new_url("session-a");
        for _ in 0..5 {
            assert_eq!(config.new_url("session-a"), first);
        }
    }

    #[test]
    fn distinct_sessions_rotate_across_the_pool() {
        let config = RotatingProxyConfiguration::new(vec!["http://p1".into(), "http://p2".into()]);
        let a = config.new_url("a").unwrap();
        let b = config.new_url("b").unwrap();
        assert_ne!(a, b);
    }
}
