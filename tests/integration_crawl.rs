//! End-to-end scenarios against the public API, exercising the
//! `Crawler`/`RequestQueue`/`SessionPool` composition the way an embedder
//! would use it, rather than any single module in isolation.

use crawlkit::{Configuration, ConfigurationBuilder, Crawler, CrawlerError, CrawlerOptions, CrawlingContext, Request, RequestQueue};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn test_config() -> Configuration {
    ConfigurationBuilder::new().storage_dir("./storage").build()
}

/// S1: a crawl with a fixed seed set runs every request exactly once and
/// reports accurate statistics.
#[tokio::test]
async fn basic_crawl_completes_all_seeded_requests() {
    init_logging();
    let queue = Arc::new(RequestQueue::new());
    for url in ["https://example.com/1", "https://example.com/2", "https://example.com/3"] {
        queue.add_request(Request::new(url), false);
    }

    let visited = Arc::new(AtomicUsize::new(0));
    let visited_clone = visited.clone();
    let handler = Arc::new(move |_ctx: CrawlingContext| {
        let visited = visited_clone.clone();
        Box::pin(async move {
            visited.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }) as std::pin::Pin<Box<dyn std::future::Future<Output = crawlkit::CrawlerResult<()>> + Send>>
    });

    let crawler = Arc::new(Crawler::new(
        &test_config(),
        queue.clone(),
        None,
        CrawlerOptions::default(),
        handler,
    ));
    crawler.clone().run().await.unwrap();

    assert_eq!(visited.load(Ordering::SeqCst), 3);
    assert!(queue.is_finished());
    assert_eq!(crawler.statistics().requests_finished, 3);
}

/// S3: a handler that fails a bounded number of times before succeeding
/// ends up marked handled, with the failure count reflected in retries.
#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    init_logging();
    let queue = Arc::new(RequestQueue::new());
    queue.add_request(Request::new("https://example.com/flaky"), false);

    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_clone = attempts.clone();
    let handler = Arc::new(move |_ctx: CrawlingContext| {
        let attempts = attempts_clone.clone();
        Box::pin(async move {
            let count = attempts.fetch_add(1, Ordering::SeqCst);
            if count < 2 {
                Err(CrawlerError::Generic("temporary failure".into()))
            } else {
                Ok(())
            }
        }) as std::pin::Pin<Box<dyn std::future::Future<Output = crawlkit::CrawlerResult<()>> + Send>>
    });

    let crawler = Arc::new(Crawler::new(
        &test_config(),
        queue.clone(),
        None,
        CrawlerOptions::default(),
        handler,
    ));
    crawler.clone().run().await.unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(queue.is_finished());
    let stats = crawler.statistics();
    assert_eq!(stats.requests_finished, 1);
    assert_eq!(stats.retry_count, 2);
}

/// S5: `enqueue_links` called from inside a handler is picked up by the
/// same run without the caller re-invoking `run`.
#[tokio::test]
async fn enqueue_links_from_a_handler_extends_the_crawl() {
    init_logging();
    let queue = Arc::new(RequestQueue::new());
    queue.add_request(Request::new("https://example.com/seed"), false);

    let visited = Arc::new(AtomicUsize::new(0));
    let visited_clone = visited.clone();
    let handler = Arc::new(move |ctx: CrawlingContext| {
        let visited = visited_clone.clone();
        Box::pin(async move {
            visited.fetch_add(1, Ordering::SeqCst);
            if ctx.request.url == "https://example.com/seed" {
                ctx.enqueue_links(vec!["https://example.com/child".to_string()]);
            }
            Ok(())
        }) as std::pin::Pin<Box<dyn std::future::Future<Output = crawlkit::CrawlerResult<()>> + Send>>
    });

    let crawler = Arc::new(Crawler::new(
        &test_config(),
        queue.clone(),
        None,
        CrawlerOptions::default(),
        handler,
    ));
    crawler.clone().run().await.unwrap();

    assert_eq!(visited.load(Ordering::SeqCst), 2);
    assert!(queue.is_finished());
}

/// S6: `max_requests_per_crawl` halts the run early, leaving the remainder
/// of the queue untouched for a future run to pick up.
#[tokio::test]
async fn max_requests_per_crawl_halts_the_run_early() {
    init_logging();
    let queue = Arc::new(RequestQueue::new());
    for url in ["https://example.com/1", "https://example.com/2", "https://example.com/3"] {
        queue.add_request(Request::new(url), false);
    }

    let visited = Arc::new(AtomicUsize::new(0));
    let visited_clone = visited.clone();
    let handler = Arc::new(move |_ctx: CrawlingContext| {
        let visited = visited_clone.clone();
        Box::pin(async move {
            visited.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }) as std::pin::Pin<Box<dyn std::future::Future<Output = crawlkit::CrawlerResult<()>> + Send>>
    });

    let options = CrawlerOptions {
        max_requests_per_crawl: Some(2),
        ..Default::default()
    };
    let crawler = Arc::new(Crawler::new(&test_config(), queue.clone(), None, options, handler));
    crawler.clone().run().await.unwrap();

    assert_eq!(visited.load(Ordering::SeqCst), 2);
    assert!(!queue.is_finished());
}

/// S4: an `HttpBlocked` error on the configured blocked-status list retires
/// the session the request was served on, not just that one request.
#[tokio::test]
async fn blocked_status_retires_the_serving_session() {
    init_logging();
    let queue = Arc::new(RequestQueue::new());
    queue.add_request(Request::new("https://example.com/blocked"), false);

    let seen_session = Arc::new(parking_lot::Mutex::new(None));
    let seen_session_clone = seen_session.clone();
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_clone = attempts.clone();
    let handler = Arc::new(move |ctx: CrawlingContext| {
        let seen_session = seen_session_clone.clone();
        let attempts = attempts_clone.clone();
        Box::pin(async move {
            let count = attempts.fetch_add(1, Ordering::SeqCst);
            if count == 0 {
                *seen_session.lock() = Some(ctx.session.id.clone());
                Err(CrawlerError::HttpBlocked(403))
            } else {
                assert_ne!(Some(ctx.session.id.clone()), seen_session.lock().clone());
                Ok(())
            }
        }) as std::pin::Pin<Box<dyn std::future::Future<Output = crawlkit::CrawlerResult<()>> + Send>>
    });

    let crawler = Arc::new(Crawler::new(
        &test_config(),
        queue.clone(),
        None,
        CrawlerOptions::default(),
        handler,
    ));
    crawler.clone().run().await.unwrap();

    assert!(queue.is_finished());
    assert_eq!(crawler.statistics().sessions_retired, 1);
}

/// S7: links discovered via `enqueue_links_with_options` with a
/// `SameHostname` strategy never cross over to a different host.
#[tokio::test]
async fn enqueue_links_with_options_respects_the_same_hostname_strategy() {
    init_logging();
    let queue = Arc::new(RequestQueue::new());
    queue.add_request(Request::new("https://example.com/seed"), false);

    let handler = Arc::new(move |ctx: CrawlingContext| {
        Box::pin(async move {
            if ctx.request.url == "https://example.com/seed" {
                ctx.enqueue_links_with_options(
                    vec!["https://example.com/child".to_string(), "https://other.com/child".to_string()],
                    crawlkit::EnqueueStrategy::SameHostname,
                    &[],
                );
            }
            Ok(())
        }) as std::pin::Pin<Box<dyn std::future::Future<Output = crawlkit::CrawlerResult<()>> + Send>>
    });

    let crawler = Arc::new(Crawler::new(
        &test_config(),
        queue.clone(),
        None,
        CrawlerOptions::default(),
        handler,
    ));
    crawler.clone().run().await.unwrap();

    assert_eq!(queue.total_count(), 2);
}
