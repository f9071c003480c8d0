//! Core engine for a resumable, auto-scaled web crawling fleet.
//!
//! Wires together a request source (`request_queue`/`request_list`), a
//! `session` pool for identity rotation, an `autoscaled_pool` for
//! concurrency control, and a `crawler` core loop that drives them,
//! publishing lifecycle events through `events` and persisting through
//! `storage`.

pub mod autoscaled_pool;
pub mod config;
pub mod cookie;
pub mod crawler;
pub mod events;
pub mod proxy;
pub mod request;
pub mod request_list;
pub mod request_queue;
pub mod runtime;
pub mod session;
pub mod storage;
pub mod system;
pub mod utils;

pub use autoscaled_pool::{AutoscaledPool, AutoscaledPoolOptions};
pub use config::{Configuration, ConfigurationBuilder};
pub use crawler::{Crawler, CrawlerError, CrawlerOptions, CrawlerResult, CrawlingContext, EnqueueStrategy};
pub use events::{CrawlerEvent, EventManager};
pub use proxy::{ProxyConfiguration, ProxyInfo, RotatingProxyConfiguration};
pub use request::{EnqueueResult, QueueOperationInfo, Request, UserData};
pub use request_list::{RequestList, RequestListState, ResumeMismatchError};
pub use request_queue::{RequestQueue, RequestQueueState};
pub use session::{Session, SessionPool};
pub use storage::{Dataset, KeyValueStore, MemoryStorageClient, StorageClient};
pub use system::{DefaultResourceSampler, ResourceSampler, Snapshot, Snapshotter, SystemStatus};
