//! `BasicCrawler` (§4.7): the core per-request state machine, composed out
//! of a `RequestQueue`/`RequestList` source, a `SessionPool`, and an
//! `AutoscaledPool` to drive concurrency.
//!
//! Grounded on the teacher's `orchestrator.rs` run loop: fetch, acquire a
//! resource, call the user handler, classify the outcome, then either mark
//! handled or reclaim — the same shape the teacher uses for its own
//! crawl-then-retry cycle, generalized here to cover both request sources.

pub mod context;
pub mod errors;
pub mod statistics;

pub use context::{CrawlingContext, EnqueueStrategy};
pub use errors::{CrawlerError, CrawlerResult};
pub use statistics::{Statistics, StatisticsSnapshot};

use crate::autoscaled_pool::{AutoscaledPool, AutoscaledPoolOptions};
use crate::config::Configuration;
use crate::events::{CrawlerEvent, EventManager};
use crate::proxy::{ProxyConfiguration, ProxyInfo};
use crate::request::Request;
use crate::request_list::RequestList;
use crate::request_queue::RequestQueue;
use crate::session::SessionPool;
use crate::storage::{KeyValueStore, StorageClient};
use crate::system::{DefaultResourceSampler, ResourceSampler, Snapshotter, SystemStatus};
use crate::utils::{
    DEFAULT_MAX_REQUEST_RETRIES, DEFAULT_PERSIST_STATE_INTERVAL_SECS, DEFAULT_REQUEST_LIST_PERSIST_KEY,
    DEFAULT_REQUEST_QUEUE_PERSIST_KEY, DEFAULT_SESSION_POOL_PERSIST_KEY, DEFAULT_SNAPSHOT_INTERVAL_MILLIS,
    DEFAULT_STATE_STORE_NAME, DEFAULT_STATISTICS_PERSIST_KEY,
};
use log::{debug, info, warn};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// User-supplied handler for a single request. Returning `Err` routes the
/// request through retry classification (§7); returning `Ok` marks it
/// handled.
pub type RequestHandler = Arc<dyn Fn(CrawlingContext) -> BoxFuture<'static, CrawlerResult<()>> + Send + Sync>;

/// Called once a request has exhausted its retries (or hit a
/// `NonRetryable`/`Fatal` error) instead of being marked handled normally.
pub type FailedRequestHandler = Arc<dyn Fn(Request, CrawlerError) -> BoxFuture<'static, ()> + Send + Sync>;

pub struct CrawlerOptions {
    pub max_request_retries: u8,
    pub max_requests_per_crawl: Option<u64>,
    pub use_session_pool: bool,
    pub extra_blocked_status_codes: Vec<u16>,
    pub request_handler_timeout: Duration,
    pub autoscaled_pool: AutoscaledPoolOptions,
    /// Resolves a proxy URL per session, surfaced on
    /// `CrawlingContext::proxy_info`. `None` means every request goes
    /// direct.
    pub proxy_configuration: Option<Arc<dyn ProxyConfiguration>>,
    /// Feeds the run's `Snapshotter`; defaults to a `DefaultResourceSampler`
    /// when unset.
    pub resource_sampler: Option<Arc<dyn ResourceSampler>>,
}

impl Default for CrawlerOptions {
    fn default() -> Self {
        Self {
            max_request_retries: DEFAULT_MAX_REQUEST_RETRIES,
            request_handler_timeout: Duration::from_secs(crate::utils::DEFAULT_REQUEST_HANDLER_TIMEOUT_SECS),
            max_requests_per_crawl: None,
            use_session_pool: true,
            extra_blocked_status_codes: Vec::new(),
            autoscaled_pool: AutoscaledPoolOptions::default(),
            proxy_configuration: None,
            resource_sampler: None,
        }
    }
}

/// Composite request source: a `Crawler` drains an optional static
/// `RequestList` first, then an ever-growing `RequestQueue` (the queue
/// outlives a single run, the list does not).
pub struct Crawler {
    queue: Arc<RequestQueue>,
    list: Option<Arc<RequestList>>,
    session_pool: Arc<SessionPool>,
    events: EventManager,
    storage_client: Arc<dyn StorageClient>,
    stats: Arc<Statistics>,
    options: CrawlerOptions,
    processed: AtomicU64,
    request_handler: RequestHandler,
    failed_request_handler: Option<FailedRequestHandler>,
}

impl Crawler {
    #[must_use]
    pub fn new(
        config: &Configuration,
        queue: Arc<RequestQueue>,
        list: Option<Arc<RequestList>>,
        options: CrawlerOptions,
        request_handler: RequestHandler,
    ) -> Self {
        let session_pool = Arc::new(SessionPool::default().with_events(config.events.clone()));
        Self {
            queue,
            list,
            session_pool,
            events: config.events.clone(),
            storage_client: config.storage_client.clone(),
            stats: Arc::new(Statistics::new()),
            options,
            processed: AtomicU64::new(0),
            request_handler,
            failed_request_handler: None,
        }
    }

    #[must_use]
    pub fn with_failed_request_handler(mut self, handler: FailedRequestHandler) -> Self {
        self.failed_request_handler = Some(handler);
        self
    }

    #[must_use]
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    /// Pulls the next request from the list (if present and not yet
    /// drained) before falling through to the queue, so a fixed seed set
    /// runs ahead of anything discovered via `enqueue_links`.
    fn fetch_next(&self) -> Option<Request> {
        if let Some(list) = &self.list {
            if let Some(req) = list.fetch_next_request() {
                return Some(req);
            }
            if !list.is_finished() {
                return None;
            }
        }
        self.queue.fetch_next_request()
    }

    fn reclaim(&self, request: &Request, forefront: bool) {
        if let Some(list) = &self.list {
            if list.length() > 0 {
                list.reclaim_request(request);
                return;
            }
        }
        self.queue.reclaim_request(&request.id, forefront);
    }

    fn mark_handled(&self, request: &Request) {
        if let Some(list) = &self.list {
            if list.length() > 0 {
                list.mark_request_handled(request);
                return;
            }
        }
        self.queue.mark_request_handled(&request.id);
    }

    fn source_is_finished(&self) -> bool {
        let list_done = self.list.as_ref().is_none_or(|l| l.is_finished());
        list_done && self.queue.is_finished()
    }

    fn hit_request_cap(&self) -> bool {
        self.options
            .max_requests_per_crawl
            .is_some_and(|cap| self.processed.load(Ordering::SeqCst) >= cap)
    }

    /// Writes every component's current `get_state`/`persist_state`
    /// snapshot through `storage_client`, under the shared
    /// `DEFAULT_STATE_STORE_NAME` key-value store (§4.12). Errors are
    /// logged, not propagated — a failed persistence tick shouldn't abort
    /// an otherwise-healthy crawl.
    async fn persist_state_now(&self) {
        let store = self.storage_client.key_value_store(DEFAULT_STATE_STORE_NAME);
        if let Err(err) = store.set(DEFAULT_SESSION_POOL_PERSIST_KEY, self.session_pool.persist_state()).await {
            warn!("failed to persist session pool state: {err:#}");
        }
        if let Err(err) = store.set(DEFAULT_STATISTICS_PERSIST_KEY, self.stats.persist_state()).await {
            warn!("failed to persist statistics: {err:#}");
        }
        if let Err(err) = store.set(DEFAULT_REQUEST_QUEUE_PERSIST_KEY, self.queue.persist_state()).await {
            warn!("failed to persist request queue state: {err:#}");
        }
        if let Some(list) = &self.list {
            if let Err(err) = store.set(DEFAULT_REQUEST_LIST_PERSIST_KEY, list.persist_state()).await {
                warn!("failed to persist request list state: {err:#}");
            }
        }
    }

    /// One task: fetch -> acquire session -> call handler -> classify ->
    /// mark handled or reclaim. Runs entirely inside the future handed to
    /// `AutoscaledPool::run`.
    #[allow(clippy::too_many_arguments)]
    async fn run_one(
        queue: Arc<RequestQueue>,
        session_pool: Arc<SessionPool>,
        stats: Arc<Statistics>,
        events: EventManager,
        options_max_retries: u8,
        extra_blocked_codes: Vec<u16>,
        use_session_pool: bool,
        handler_timeout: Duration,
        proxy_configuration: Option<Arc<dyn ProxyConfiguration>>,
        request_handler: RequestHandler,
        failed_request_handler: Option<FailedRequestHandler>,
        request: Request,
        on_reclaim: Arc<dyn Fn(Request, bool) + Send + Sync>,
        on_handled: Arc<dyn Fn(Request) + Send + Sync>,
    ) -> anyhow::Result<()> {
        let session = if use_session_pool {
            session_pool.get_session(None)
        } else {
            Arc::new(crate::session::Session::new(format!("req_{}", request.id)))
        };

        let proxy_info = proxy_configuration
            .as_ref()
            .and_then(|config| config.new_url(&session.id))
            .map(|url| ProxyInfo { url });

        let ctx = CrawlingContext::new(request.clone(), session.clone(), queue.clone(), proxy_info);
        let outcome = match tokio::time::timeout(handler_timeout, request_handler(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(CrawlerError::HandlerTimeout),
        };
        session.mark_used();

        match outcome {
            Ok(()) => {
                session.mark_good(crate::utils::DEFAULT_ERROR_SCORE_DECREMENT);
                let mut handled = request;
                handled.mark_handled();
                stats.record_finished();
                on_handled(handled);
            }
            Err(err) => {
                debug!("{}", err.log_entry(false));
                let effective_max = request.effective_max_retries(options_max_retries);
                let retires_session = err.retires_session(&extra_blocked_codes);

                if retires_session {
                    session.retire();
                    stats.record_session_retired();
                    events.publish(CrawlerEvent::SessionRetired {
                        session_id: session.id.clone(),
                    });
                } else if err.is_retryable() {
                    session.mark_bad(crate::utils::DEFAULT_ERROR_SCORE_DECREMENT);
                }

                let mut next = request.clone();
                next.error_messages.push(err.log_entry(false));

                let charges = err.charges_retry_count();
                if charges {
                    next.retry_count += 1;
                }

                let exhausted = next.no_retry || !err.is_retryable() || (charges && next.retry_count > effective_max);

                if exhausted {
                    stats.record_failed();
                    warn!(
                        "request {} failed permanently after {} retries: {}",
                        next.id, next.retry_count, err
                    );
                    if let Some(handler) = &failed_request_handler {
                        handler(next.clone(), err).await;
                    }
                    on_handled(next);
                } else {
                    if charges {
                        stats.record_retry();
                    }
                    on_reclaim(next, !retires_session);
                }
            }
        }

        Ok(())
    }

    /// Runs the crawler to completion: drives requests from the list then
    /// the queue at an autoscaled concurrency until both sources are
    /// finished or `max_requests_per_crawl` is hit. Also starts a
    /// `Snapshotter` feeding the autoscaler's `SystemStatus` and a periodic
    /// persistence tick, both torn down once the run finishes.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        info!("crawler run starting");
        let pool = AutoscaledPool::new(AutoscaledPoolOptions {
            min_concurrency: self.options.autoscaled_pool.min_concurrency,
            max_concurrency: self.options.autoscaled_pool.max_concurrency,
            desired_concurrency_ratio: self.options.autoscaled_pool.desired_concurrency_ratio,
            scale_step_ratio: self.options.autoscaled_pool.scale_step_ratio,
            maybe_run_interval: self.options.autoscaled_pool.maybe_run_interval,
            autoscale_interval: self.options.autoscaled_pool.autoscale_interval,
        });
        let status = Arc::new(SystemStatus::new());
        let sampler = self
            .options
            .resource_sampler
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultResourceSampler::default()));
        let snapshotter = Arc::new(
            Snapshotter::new(status.clone(), sampler, Duration::from_millis(DEFAULT_SNAPSHOT_INTERVAL_MILLIS))
                .with_events(self.events.clone()),
        );
        snapshotter.clone().start();

        let this = self.clone();
        let persist_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(DEFAULT_PERSIST_STATE_INTERVAL_SECS));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                this.events.publish(CrawlerEvent::PersistState);
                this.persist_state_now().await;
            }
        });

        let this = self.clone();
        let on_reclaim: Arc<dyn Fn(Request, bool) + Send + Sync> = Arc::new(move |req, forefront| {
            this.reclaim(&req, forefront);
        });
        let this = self.clone();
        let on_handled: Arc<dyn Fn(Request) + Send + Sync> = Arc::new(move |req| {
            this.mark_handled(&req);
        });

        let this = self.clone();
        let run_task = move || -> Option<BoxFuture<'static, anyhow::Result<()>>> {
            if this.hit_request_cap() {
                return None;
            }
            let request = this.fetch_next()?;
            this.processed.fetch_add(1, Ordering::SeqCst);

            let queue = this.queue.clone();
            let session_pool = this.session_pool.clone();
            let stats = this.stats.clone();
            let events = this.events.clone();
            let max_retries = this.options.max_request_retries;
            let extra_blocked = this.options.extra_blocked_status_codes.clone();
            let use_session_pool = this.options.use_session_pool;
            let handler_timeout = this.options.request_handler_timeout;
            let proxy_configuration = this.options.proxy_configuration.clone();
            let request_handler = this.request_handler.clone();
            let failed_handler = this.failed_request_handler.clone();
            let on_reclaim = on_reclaim.clone();
            let on_handled = on_handled.clone();

            Some(Box::pin(Self::run_one(
                queue,
                session_pool,
                stats,
                events,
                max_retries,
                extra_blocked,
                use_session_pool,
                handler_timeout,
                proxy_configuration,
                request_handler,
                failed_handler,
                request,
                on_reclaim,
                on_handled,
            )))
        };

        let this = self.clone();
        let is_finished = move || this.hit_request_cap() || this.source_is_finished();

        pool.run(status.as_ref(), run_task, is_finished).await?;

        persist_handle.abort();
        snapshotter.stop();

        self.events.publish(CrawlerEvent::PersistState);
        self.persist_state_now().await;
        self.events.publish(CrawlerEvent::Exit);
        info!("crawler run finished: {:?}", self.stats.snapshot());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigurationBuilder;
    use std::sync::atomic::AtomicUsize;

    fn test_config() -> Configuration {
        ConfigurationBuilder::new().storage_dir("./storage").build()
    }

    fn noop_handler(counter: Arc<AtomicUsize>) -> RequestHandler {
        Arc::new(move |_ctx| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn processes_every_seeded_request_once() {
        let queue = Arc::new(RequestQueue::new());
        for url in ["https://a", "https://b", "https://c"] {
            queue.add_request(Request::new(url), false);
        }
        let counter = Arc::new(AtomicUsize::new(0));
        let crawler = Arc::new(Crawler::new(
            &test_config(),
            queue.clone(),
            None,
            CrawlerOptions::default(),
            noop_handler(counter.clone()),
        ));
        crawler.clone().run().await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(crawler.statistics().requests_finished, 3);
        assert!(queue.is_finished());
    }

    #[tokio::test]
    async fn failing_handler_exhausts_retries_then_calls_failed_handler() {
        let queue = Arc::new(RequestQueue::new());
        queue.add_request(Request::new("https://a"), false);

        let handler: RequestHandler = Arc::new(|_ctx| {
            Box::pin(async { Err(CrawlerError::NonRetryable("boom".into())) })
        });

        let failed_count = Arc::new(AtomicUsize::new(0));
        let failed_count_clone = failed_count.clone();
        let failed_handler: FailedRequestHandler = Arc::new(move |_req, _err| {
            let failed_count = failed_count_clone.clone();
            Box::pin(async move {
                failed_count.fetch_add(1, Ordering::SeqCst);
            })
        });

        let crawler = Arc::new(
            Crawler::new(&test_config(), queue.clone(), None, CrawlerOptions::default(), handler)
                .with_failed_request_handler(failed_handler),
        );
        crawler.clone().run().await.unwrap();

        assert_eq!(failed_count.load(Ordering::SeqCst), 1);
        assert_eq!(crawler.statistics().requests_failed, 1);
        assert!(queue.is_finished());
    }

    #[tokio::test]
    async fn max_requests_per_crawl_stops_early() {
        let queue = Arc::new(RequestQueue::new());
        for url in ["https://a", "https://b", "https://c"] {
            queue.add_request(Request::new(url), false);
        }
        let counter = Arc::new(AtomicUsize::new(0));
        let options = CrawlerOptions {
            max_requests_per_crawl: Some(1),
            ..Default::default()
        };
        let crawler = Arc::new(Crawler::new(&test_config(), queue.clone(), None, options, noop_handler(counter.clone())));
        crawler.clone().run().await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!queue.is_finished());
    }

    #[tokio::test]
    async fn handler_exceeding_its_timeout_is_treated_as_a_handler_timeout_error() {
        let queue = Arc::new(RequestQueue::new());
        queue.add_request(Request::new("https://a").with_max_retries(0), false);

        let handler: RequestHandler = Arc::new(|_ctx| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            })
        });

        let options = CrawlerOptions {
            request_handler_timeout: Duration::from_millis(1),
            ..Default::default()
        };
        let crawler = Arc::new(Crawler::new(&test_config(), queue.clone(), None, options, handler));
        crawler.clone().run().await.unwrap();

        assert_eq!(crawler.statistics().requests_failed, 1);
        assert!(queue.is_finished());
    }

    #[tokio::test]
    async fn a_retryable_non_retiring_error_marks_the_session_bad() {
        let queue = Arc::new(RequestQueue::new());
        queue.add_request(Request::new("https://a"), false);

        let handler: RequestHandler = Arc::new(|ctx| {
            Box::pin(async move {
                if ctx.request.retry_count == 0 {
                    Err(CrawlerError::Generic("temporary".into()))
                } else {
                    Ok(())
                }
            })
        });

        let crawler = Arc::new(Crawler::new(&test_config(), queue.clone(), None, CrawlerOptions::default(), handler));
        crawler.clone().run().await.unwrap();

        assert_eq!(crawler.statistics().requests_finished, 1);
        assert_eq!(crawler.statistics().retry_count, 1);
    }

    #[tokio::test]
    async fn persisted_state_is_written_through_the_configured_storage_client() {
        let config = test_config();
        let storage_client = config.storage_client.clone();
        let queue = Arc::new(RequestQueue::new());
        queue.add_request(Request::new("https://a"), false);
        let counter = Arc::new(AtomicUsize::new(0));
        let crawler = Arc::new(Crawler::new(&config, queue.clone(), None, CrawlerOptions::default(), noop_handler(counter)));
        crawler.clone().run().await.unwrap();

        let store = storage_client.key_value_store(DEFAULT_STATE_STORE_NAME);
        assert!(store.get(DEFAULT_STATISTICS_PERSIST_KEY).await.unwrap().is_some());
        assert!(store.get(DEFAULT_REQUEST_QUEUE_PERSIST_KEY).await.unwrap().is_some());
    }
}
