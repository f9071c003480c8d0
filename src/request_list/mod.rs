//! `RequestList` (§3 RequestListState, §4.4): a static, pre-seeded,
//! resumable sequence of requests, distinct from `RequestQueue` in that it
//! never accepts new requests after construction — only replays a fixed
//! set and tracks progress through it.

use crate::request::Request;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

/// Serializable snapshot of a `RequestList`'s progress, sufficient to
/// resume a crawl after a restart without re-handling completed requests
/// (invariant 5: resuming from a persisted state never re-delivers a
/// request already marked handled).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestListState {
    pub next_index: usize,
    /// The `unique_key` of the request at `next_index` when this state was
    /// taken, or `None` if the list had already been fully scanned. Used by
    /// `resume` to detect that the source sequence has drifted since.
    pub next_unique_key: Option<String>,
    pub handled_unique_keys: Vec<String>,
    pub in_progress_unique_keys: Vec<String>,
}

/// Returned by `RequestList::resume` when the source sequence at
/// `state.next_index` no longer matches `state.next_unique_key` — the list
/// refuses to guess and fails loudly instead (§3 Data Model invariant).
#[derive(Debug)]
pub struct ResumeMismatchError {
    pub expected: Option<String>,
    pub found: Option<String>,
}

impl fmt::Display for ResumeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "request list resume mismatch at the persisted cursor: expected {:?}, found {:?}",
            self.expected, self.found
        )
    }
}

impl std::error::Error for ResumeMismatchError {}

struct Inner {
    requests: Vec<Request>,
    next_index: usize,
    handled: HashSet<String>,
    in_progress: HashSet<String>,
}

/// Grounded on the teacher's `CrawlQueue` replay cursor: a flat `Vec` plus
/// an index, rather than a queue, since the full request set is known up
/// front and order is significant (invariant 4: requests are served in
/// their original order modulo in-flight reclaims).
pub struct RequestList {
    inner: Mutex<Inner>,
}

impl RequestList {
    #[must_use]
    pub fn new(requests: Vec<Request>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                requests,
                next_index: 0,
                handled: HashSet::new(),
                in_progress: HashSet::new(),
            }),
        }
    }

    /// Rebuilds a list from a prior `RequestListState`, restoring progress
    /// without re-delivering already-handled requests. Fails loudly (rather
    /// than silently resuming from a wrong position) if the request at
    /// `state.next_index` no longer matches `state.next_unique_key` — the
    /// source sequence has drifted since the state was persisted.
    /// Requests still marked in-progress at persist time are folded back
    /// into the pending range by rewinding `next_index` to the earliest
    /// such request's position, so they get re-served instead of being
    /// silently skipped.
    pub fn resume(requests: Vec<Request>, state: RequestListState) -> Result<Self, ResumeMismatchError> {
        let actual_key = requests.get(state.next_index).map(|r| r.unique_key.clone());
        if actual_key != state.next_unique_key {
            return Err(ResumeMismatchError {
                expected: state.next_unique_key,
                found: actual_key,
            });
        }

        let handled: HashSet<String> = state.handled_unique_keys.into_iter().collect();
        let mut next_index = state.next_index;
        for key in &state.in_progress_unique_keys {
            if let Some(idx) = requests.iter().position(|r| &r.unique_key == key) {
                next_index = next_index.min(idx);
            }
        }

        Ok(Self {
            inner: Mutex::new(Inner {
                requests,
                next_index,
                handled,
                in_progress: HashSet::new(),
            }),
        })
    }

    /// Returns the next request not yet handled or in flight, scanning
    /// forward from the last returned index.
    pub fn fetch_next_request(&self) -> Option<Request> {
        let mut inner = self.inner.lock().unwrap();
        while inner.next_index < inner.requests.len() {
            let idx = inner.next_index;
            inner.next_index += 1;
            let key = inner.requests[idx].unique_key.clone();
            if inner.handled.contains(&key) || inner.in_progress.contains(&key) {
                continue;
            }
            inner.in_progress.insert(key);
            return Some(inner.requests[idx].clone());
        }
        None
    }

    pub fn mark_request_handled(&self, request: &Request) {
        let mut inner = self.inner.lock().unwrap();
        inner.in_progress.remove(&request.unique_key);
        inner.handled.insert(request.unique_key.clone());
    }

    /// Releases an in-flight request without marking it handled; it will
    /// be re-served the next time the scan passes its index again only if
    /// the caller rewinds, so this also resets `next_index` backward to
    /// the request's own position when that position is earlier than the
    /// current cursor.
    pub fn reclaim_request(&self, request: &Request) {
        let mut inner = self.inner.lock().unwrap();
        inner.in_progress.remove(&request.unique_key);
        if let Some(idx) = inner
            .requests
            .iter()
            .position(|r| r.unique_key == request.unique_key)
        {
            inner.next_index = inner.next_index.min(idx);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.next_index >= inner.requests.len() && inner.in_progress.is_empty()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.handled.len() >= inner.requests.len()
    }

    #[must_use]
    pub fn length(&self) -> usize {
        self.inner.lock().unwrap().requests.len()
    }

    #[must_use]
    pub fn handled_count(&self) -> usize {
        self.inner.lock().unwrap().handled.len()
    }

    #[must_use]
    pub fn get_state(&self) -> RequestListState {
        let inner = self.inner.lock().unwrap();
        let next_unique_key = inner.requests.get(inner.next_index).map(|r| r.unique_key.clone());
        RequestListState {
            next_index: inner.next_index,
            next_unique_key,
            handled_unique_keys: inner.handled.iter().cloned().collect(),
            in_progress_unique_keys: inner.in_progress.iter().cloned().collect(),
        }
    }

    #[must_use]
    pub fn persist_state(&self) -> serde_json::Value {
        serde_json::to_value(self.get_state()).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requests(urls: &[&str]) -> Vec<Request> {
        urls.iter().map(|u| Request::new(*u)).collect()
    }

    #[test]
    fn fetches_requests_in_order() {
        let list = RequestList::new(requests(&["https://a", "https://b"]));
        assert_eq!(list.fetch_next_request().unwrap().url, "https://a");
        assert_eq!(list.fetch_next_request().unwrap().url, "https://b");
        assert!(list.fetch_next_request().is_none());
    }

    #[test]
    fn reclaimed_request_is_served_again() {
        let list = RequestList::new(requests(&["https://a", "https://b"]));
        let req = list.fetch_next_request().unwrap();
        list.fetch_next_request().unwrap();
        list.reclaim_request(&req);
        let next = list.fetch_next_request().unwrap();
        assert_eq!(next.url, "https://a");
    }

    #[test]
    fn resume_skips_already_handled_requests() {
        let list = RequestList::new(requests(&["https://a", "https://b"]));
        let first = list.fetch_next_request().unwrap();
        list.mark_request_handled(&first);
        let state = list.get_state();

        let resumed = RequestList::resume(requests(&["https://a", "https://b"]), state).unwrap();
        let next = resumed.fetch_next_request().unwrap();
        assert_eq!(next.url, "https://b");
    }

    #[test]
    fn resume_re_serves_requests_still_in_progress_at_persist_time() {
        let list = RequestList::new(requests(&["https://a", "https://b", "https://c"]));
        let first = list.fetch_next_request().unwrap();
        list.mark_request_handled(&first);
        let second = list.fetch_next_request().unwrap();
        assert_eq!(second.url, "https://b");
        // "https://b" is left in progress (worker crashed before confirming).
        let state = list.get_state();
        assert_eq!(state.in_progress_unique_keys.len(), 1);

        let resumed = RequestList::resume(requests(&["https://a", "https://b", "https://c"]), state).unwrap();
        let next = resumed.fetch_next_request().unwrap();
        assert_eq!(next.url, "https://b");
    }

    #[test]
    fn resume_fails_loudly_when_the_source_sequence_has_drifted() {
        let list = RequestList::new(requests(&["https://a", "https://b"]));
        list.fetch_next_request().unwrap();
        let state = list.get_state();

        let drifted = RequestList::resume(requests(&["https://a", "https://different"]), state);
        assert!(drifted.is_err());
    }

    #[test]
    fn resume_succeeds_when_the_list_was_fully_drained_at_persist_time() {
        let list = RequestList::new(requests(&["https://a"]));
        let req = list.fetch_next_request().unwrap();
        list.mark_request_handled(&req);
        let state = list.get_state();
        assert_eq!(state.next_unique_key, None);

        let resumed = RequestList::resume(requests(&["https://a"]), state).unwrap();
        assert!(resumed.fetch_next_request().is_none());
    }

    #[test]
    fn is_finished_only_once_every_request_is_handled() {
        let list = RequestList::new(requests(&["https://a"]));
        let req = list.fetch_next_request().unwrap();
        assert!(!list.is_finished());
        list.mark_request_handled(&req);
        assert!(list.is_finished());
    }
}
