//! `RequestQueue` (§3 RequestQueue state, §4.5): a persistent, dedup-aware
//! FIFO/LIFO hybrid with request-locking so multiple crawler workers can
//! pull from the same queue without double-processing a request.
//!
//! Grounded on the teacher's `RetryQueue`: a `DashMap` of requests plus a
//! separate ordering structure, with a lock TTL and a periodic stuck-request
//! sweep standing in for what the teacher does with its circuit-breaker
//! half-open recovery timer.

use crate::request::{EnqueueResult, QueueOperationInfo, Request};
use crate::utils::{DEFAULT_ADD_REQUESTS_BATCH_SIZE, DEFAULT_REQUEST_LOCK_SECS};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

struct Lock {
    locked_at: chrono::DateTime<chrono::Utc>,
    ttl_secs: u64,
}

impl Lock {
    fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        (now - self.locked_at).num_seconds() >= self.ttl_secs as i64
    }
}

/// Serializable snapshot of a `RequestQueue`'s contents and progress,
/// sufficient to resume a crawl after a restart (§4.12).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestQueueState {
    pub requests: Vec<Request>,
    pub pending_order: Vec<String>,
    pub handled_count: u64,
}

/// A shared, resumable queue of `Request`s.
///
/// `fetchNextRequest` hands out a request and locks it; the caller must
/// eventually call either `mark_request_handled` or `reclaim_request`. A
/// lock that outlives `DEFAULT_REQUEST_LOCK_SECS` without either call is
/// swept back onto the queue by `reclaim_stuck_requests` (invariant 6: no
/// request is lost to a crashed worker).
pub struct RequestQueue {
    requests: DashMap<String, Request>,
    unique_key_to_id: DashMap<String, String>,
    pending: Mutex<VecDeque<String>>,
    in_progress: DashMap<String, Lock>,
    handled_count: AtomicU64,
    pending_batches: AtomicUsize,
    batches_notify: Notify,
}

impl RequestQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: DashMap::new(),
            unique_key_to_id: DashMap::new(),
            pending: Mutex::new(VecDeque::new()),
            in_progress: DashMap::new(),
            handled_count: AtomicU64::new(0),
            pending_batches: AtomicUsize::new(0),
            batches_notify: Notify::new(),
        }
    }

    /// Rebuilds a queue from a prior `RequestQueueState`. Requests that were
    /// neither handled nor still pending at persist time (i.e. locked
    /// in-flight) aren't represented in `pending_order` and so are simply
    /// absent from the rebuilt pending order — callers that persist state
    /// mid-flight are expected to have reclaimed in-flight locks back onto
    /// `pending_order` first via `get_state`.
    #[must_use]
    pub fn resume(state: RequestQueueState) -> Self {
        let queue = Self::new();
        queue.handled_count.store(state.handled_count, Ordering::SeqCst);
        for request in state.requests {
            queue.unique_key_to_id.insert(request.unique_key.clone(), request.id.clone());
            queue.requests.insert(request.id.clone(), request);
        }
        *queue.pending.lock() = state.pending_order.into_iter().collect();
        queue
    }

    /// Enqueue one request. `forefront` puts it at the head of the pending
    /// order (LIFO-style priority) instead of the tail (invariant 3: a
    /// forefront add always surfaces before any earlier non-forefront add
    /// still pending).
    pub fn add_request(&self, request: Request, forefront: bool) -> EnqueueResult {
        if let Some(existing_id) = self.unique_key_to_id.get(&request.unique_key) {
            let id = existing_id.clone();
            let was_already_handled = self
                .requests
                .get(&id)
                .is_some_and(|r| r.is_handled());
            return EnqueueResult {
                request_id: id,
                unique_key: request.unique_key,
                info: QueueOperationInfo::duplicate(was_already_handled),
            };
        }

        let id = request.id.clone();
        let unique_key = request.unique_key.clone();
        self.unique_key_to_id.insert(unique_key.clone(), id.clone());
        self.requests.insert(id.clone(), request);

        let mut pending = self.pending.lock();
        if forefront {
            pending.push_front(id.clone());
        } else {
            pending.push_back(id.clone());
        }

        EnqueueResult {
            request_id: id,
            unique_key,
            info: QueueOperationInfo::fresh(),
        }
    }

    /// Batch add (§4.5): the first `DEFAULT_ADD_REQUESTS_BATCH_SIZE`
    /// requests are enqueued synchronously and their results returned
    /// immediately; any remainder is enqueued from a background task in
    /// further chunks of the same size, so a single call with a huge batch
    /// (a page with thousands of discovered links) never blocks the caller.
    /// Await `wait_for_all_requests_to_be_added` to know when every request
    /// from every call has actually landed.
    pub fn add_requests(self: Arc<Self>, requests: Vec<Request>, forefront: bool) -> Vec<EnqueueResult> {
        let mut requests = requests.into_iter();
        let first_batch: Vec<Request> = requests.by_ref().take(DEFAULT_ADD_REQUESTS_BATCH_SIZE).collect();
        let results: Vec<EnqueueResult> = first_batch.into_iter().map(|r| self.add_request(r, forefront)).collect();

        let remainder: Vec<Request> = requests.collect();
        if !remainder.is_empty() {
            let this = self.clone();
            self.pending_batches.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                for chunk in remainder.chunks(DEFAULT_ADD_REQUESTS_BATCH_SIZE) {
                    for request in chunk {
                        this.add_request(request.clone(), forefront);
                    }
                    tokio::task::yield_now().await;
                }
                if this.pending_batches.fetch_sub(1, Ordering::SeqCst) == 1 {
                    this.batches_notify.notify_waiters();
                }
            });
        }

        results
    }

    /// Resolves once every background batch started by `add_requests` has
    /// finished landing (§4.5's `waitForAllRequestsToBeAdded`).
    pub async fn wait_for_all_requests_to_be_added(&self) {
        while self.pending_batches.load(Ordering::SeqCst) > 0 {
            self.batches_notify.notified().await;
        }
    }

    #[must_use]
    pub fn get_request(&self, id: &str) -> Option<Request> {
        self.requests.get(id).map(|r| r.clone())
    }

    /// Pulls the next pending request and locks it under `id`. Sweeps
    /// expired locks back onto the queue first so a previously-stuck
    /// request gets a chance to be picked up again before anything new.
    pub fn fetch_next_request(&self) -> Option<Request> {
        self.reclaim_stuck_requests();

        let id = self.pending.lock().pop_front()?;
        self.in_progress.insert(
            id.clone(),
            Lock {
                locked_at: chrono::Utc::now(),
                ttl_secs: DEFAULT_REQUEST_LOCK_SECS,
            },
        );
        self.requests.get(&id).map(|r| r.clone())
    }

    /// Marks a locked request as handled, releasing its lock permanently.
    pub fn mark_request_handled(&self, id: &str) -> Option<Request> {
        self.in_progress.remove(id);
        let mut entry = self.requests.get_mut(id)?;
        entry.mark_handled();
        self.handled_count.fetch_add(1, Ordering::SeqCst);
        Some(entry.clone())
    }

    /// Releases a request's lock back onto the pending queue without
    /// marking it handled, for a retryable failure. `forefront` controls
    /// whether the retry jumps the queue.
    pub fn reclaim_request(&self, id: &str, forefront: bool) {
        if self.in_progress.remove(id).is_none() {
            return;
        }
        let mut pending = self.pending.lock();
        if forefront {
            pending.push_front(id.to_string());
        } else {
            pending.push_back(id.to_string());
        }
    }

    /// Sweeps locks whose TTL has expired back onto the pending queue
    /// (at the front, since a stuck request is by definition overdue).
    fn reclaim_stuck_requests(&self) {
        let now = chrono::Utc::now();
        let stuck: Vec<String> = self
            .in_progress
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        if stuck.is_empty() {
            return;
        }
        let mut pending = self.pending.lock();
        for id in stuck {
            self.in_progress.remove(&id);
            pending.push_front(id);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty() && self.in_progress.is_empty()
    }

    /// True once every known request has been marked handled and nothing
    /// is pending or in flight (invariant 2).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.is_empty()
    }

    #[must_use]
    pub fn handled_count(&self) -> u64 {
        self.handled_count.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.requests.len() as u64
    }

    /// Snapshot sufficient to rebuild this queue via `RequestQueue::resume`.
    /// In-flight (locked) requests are folded back into `pending_order` so
    /// a worker that crashed mid-fetch doesn't lose its request across a
    /// restart.
    #[must_use]
    pub fn get_state(&self) -> RequestQueueState {
        let pending = self.pending.lock();
        let mut pending_order: Vec<String> = pending.iter().cloned().collect();
        drop(pending);
        pending_order.extend(self.in_progress.iter().map(|entry| entry.key().clone()));

        RequestQueueState {
            requests: self.requests.iter().map(|entry| entry.value().clone()).collect(),
            pending_order,
            handled_count: self.handled_count(),
        }
    }

    #[must_use]
    pub fn persist_state(&self) -> serde_json::Value {
        serde_json::to_value(self.get_state()).unwrap_or(serde_json::Value::Null)
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}
