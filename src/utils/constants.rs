//! Named default values, collected so tuning one number doesn't require a
//! grep across the whole crate.

use std::time::Duration;

/// Default cap on retries for a single request before it is routed to the
/// failed-request handler.
pub const DEFAULT_MAX_REQUEST_RETRIES: u8 = 3;

/// Default per-handler-invocation timeout.
pub const DEFAULT_REQUEST_HANDLER_TIMEOUT_SECS: u64 = 60;

/// Stuck-queue / stuck-list recovery threshold. Overridable via
/// `CRATE_INTERNAL_TIMEOUT`.
pub const DEFAULT_INTERNAL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Lock TTL for a fetched `RequestQueue` item before it is implicitly
/// reclaimed.
pub const DEFAULT_REQUEST_LOCK_SECS: u64 = 5 * 60;

/// Batch size for `RequestQueue::add_requests`.
pub const DEFAULT_ADD_REQUESTS_BATCH_SIZE: usize = 1000;

/// Default `SessionPool` bound.
pub const DEFAULT_MAX_POOL_SIZE: usize = 1000;

/// Default `Session` tunables.
pub const DEFAULT_MAX_ERROR_SCORE: f64 = 3.0;
pub const DEFAULT_ERROR_SCORE_DECREMENT: f64 = 0.5;
pub const DEFAULT_MAX_USAGE_COUNT: u32 = 50;
pub const DEFAULT_SESSION_MAX_AGE_SECS: u64 = 3000;

/// Default `AutoscaledPool` tunables.
pub const DEFAULT_MIN_CONCURRENCY: usize = 1;
pub const DEFAULT_MAX_CONCURRENCY: usize = 1000;
pub const DEFAULT_DESIRED_CONCURRENCY_RATIO: f64 = 0.95;
pub const DEFAULT_SCALE_STEP_RATIO: f64 = 0.05;
pub const DEFAULT_MAYBE_RUN_INTERVAL_SECS: f64 = 0.5;
pub const DEFAULT_AUTOSCALE_INTERVAL_SECS: f64 = 10.0;

/// Default `Snapshotter`/`SystemStatus` tunables.
pub const DEFAULT_SNAPSHOT_HISTORY_SECS: u64 = 60;
pub const DEFAULT_CURRENT_HISTORY_SECS: u64 = 5;
pub const DEFAULT_MAX_BLOCKED_MILLIS: u64 = 50;
pub const DEFAULT_MAX_USED_MEMORY_RATIO: f64 = 0.7;
pub const DEFAULT_MAX_USED_CPU_RATIO: f64 = 0.95;
pub const DEFAULT_MAX_CLIENT_ERRORS: u64 = 1;
pub const DEFAULT_MAX_RESOURCE_OVERLOADED_RATIO: f64 = 0.2;
pub const DEFAULT_MAX_CPU_OVERLOADED_RATIO: f64 = 0.4;

/// Default queue API call timeout and retry budget (see §5 and §7).
pub const DEFAULT_QUEUE_CALL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_QUEUE_CALL_RETRIES: u32 = 3;

/// `PersistState` broadcast interval.
pub const DEFAULT_PERSIST_STATE_INTERVAL_SECS: u64 = 60;

/// Default session pool persisted-state key.
pub const DEFAULT_SESSION_POOL_PERSIST_KEY: &str = "SESSION_POOL_STATE";
/// Default statistics persisted-state key.
pub const DEFAULT_STATISTICS_PERSIST_KEY: &str = "STATISTICS_STATE";
/// Default request queue persisted-state key.
pub const DEFAULT_REQUEST_QUEUE_PERSIST_KEY: &str = "REQUEST_QUEUE_STATE";
/// Default request list persisted-state key.
pub const DEFAULT_REQUEST_LIST_PERSIST_KEY: &str = "REQUEST_LIST_STATE";
/// Name of the key-value store every persisted-state key is written into.
pub const DEFAULT_STATE_STORE_NAME: &str = "crawler_state";

/// `Snapshotter` sampling tick.
pub const DEFAULT_SNAPSHOT_INTERVAL_MILLIS: u64 = 500;

/// Environment variable names recognized by `Configuration`.
pub const ENV_STORAGE_DIR: &str = "CRATE_STORAGE_DIR";
pub const ENV_AVAILABLE_MEMORY_RATIO: &str = "CRATE_AVAILABLE_MEMORY_RATIO";
pub const ENV_INTERNAL_TIMEOUT: &str = "CRATE_INTERNAL_TIMEOUT";
pub const ENV_PURGE_ON_START: &str = "CRATE_PURGE_ON_START";
pub const ENV_VERBOSE_LOG: &str = "CRATE_VERBOSE_LOG";

pub const DEFAULT_STORAGE_DIR: &str = "./storage";
