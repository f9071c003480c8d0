//! Core `Request`/`QueueOperationInfo` data types (§3 of the spec).
//!
//! Grounded on the teacher's `crawl_engine::crawl_types::CrawlQueue`: a
//! small, serde-derived, serializable plain struct mutated only by its
//! owning queue/crawler, never by arbitrary call sites.

mod user_data;

pub use user_data::UserData;

use crate::utils::normalize_url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// An ordered instruction to fetch a URL and run a handler on the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub unique_key: String,
    pub url: String,
    /// Post-redirect URL, set by the handler once known.
    pub loaded_url: Option<String>,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub payload: Vec<u8>,
    /// Opaque, user-extensible bag carried across retries.
    pub user_data: UserData,
    pub retry_count: u8,
    /// One entry per failed attempt (see `CrawlerError::log_entry`).
    pub error_messages: Vec<String>,
    pub handled_at: Option<chrono::DateTime<chrono::Utc>>,
    pub no_retry: bool,
    pub skip_navigation: bool,
    /// Per-request override of the crawler's `max_request_retries`.
    pub max_retries: Option<u8>,
}

impl Request {
    /// Build a new request for `url`, deriving `unique_key` from a
    /// normalized form of the URL unless `with_unique_key` overrides it.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let unique_key = normalize_url(&url);
        Self {
            id: Uuid::new_v4().to_string(),
            unique_key,
            url,
            loaded_url: None,
            method: "GET".to_string(),
            headers: HashMap::new(),
            payload: Vec::new(),
            user_data: UserData::new(),
            retry_count: 0,
            error_messages: Vec::new(),
            handled_at: None,
            no_retry: false,
            skip_navigation: false,
            max_retries: None,
        }
    }

    #[must_use]
    pub fn with_unique_key(mut self, key: impl Into<String>) -> Self {
        self.unique_key = key.into();
        self
    }

    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    #[must_use]
    pub fn with_user_data(mut self, user_data: UserData) -> Self {
        self.user_data = user_data;
        self
    }

    #[must_use]
    pub fn with_no_retry(mut self, no_retry: bool) -> Self {
        self.no_retry = no_retry;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u8) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Effective retry cap for this request: the per-request override if
    /// set, else the crawler-wide default passed in by the caller.
    #[must_use]
    pub fn effective_max_retries(&self, crawler_default: u8) -> u8 {
        self.max_retries.unwrap_or(crawler_default)
    }

    pub fn mark_handled(&mut self) {
        self.handled_at = Some(chrono::Utc::now());
    }

    pub fn is_handled(&self) -> bool {
        self.handled_at.is_some()
    }
}

/// Returned from every enqueue operation (§3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueueOperationInfo {
    pub was_already_present: bool,
    pub was_already_handled: bool,
}

impl QueueOperationInfo {
    #[must_use]
    pub fn fresh() -> Self {
        Self {
            was_already_present: false,
            was_already_handled: false,
        }
    }

    #[must_use]
    pub fn duplicate(was_already_handled: bool) -> Self {
        Self {
            was_already_present: true,
            was_already_handled,
        }
    }
}

/// Id/key pair returned alongside a `QueueOperationInfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueResult {
    pub request_id: String,
    pub unique_key: String,
    pub info: QueueOperationInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_request_derives_unique_key_from_normalized_url() {
        let req = Request::new("https://example.com/a/");
        assert_eq!(req.unique_key, normalize_url("https://example.com/a/"));
    }

    #[test]
    fn effective_max_retries_prefers_override() {
        let req = Request::new("https://example.com").with_max_retries(7);
        assert_eq!(req.effective_max_retries(3), 7);
        let req2 = Request::new("https://example.com");
        assert_eq!(req2.effective_max_retries(3), 3);
    }
}
