//! Per-request handler context (§4.7): what a `request_handler` closure
//! receives for one `Request`, bundling the session and proxy it was served
//! on and an `enqueue_links` handle back into the originating queue.

use crate::proxy::ProxyInfo;
use crate::request::Request;
use crate::request_queue::RequestQueue;
use crate::session::Session;
use std::sync::Arc;
use url::Url;

/// Which discovered links `enqueue_links` should keep, relative to the
/// request the links were found on (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnqueueStrategy {
    /// Keep every URL regardless of host.
    #[default]
    All,
    /// Keep only URLs sharing the exact hostname of the originating request.
    SameHostname,
    /// Keep only URLs sharing the registrable domain (last two labels) of
    /// the originating request's hostname.
    SameDomain,
    /// Keep only URLs sharing scheme, hostname, and port.
    SameOrigin,
}

fn hostname(url: &str) -> Option<String> {
    Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string))
}

fn registrable_domain(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        host.to_string()
    } else {
        labels[labels.len() - 2..].join(".")
    }
}

fn origin(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    Some(format!(
        "{}://{}:{}",
        parsed.scheme(),
        parsed.host_str()?,
        parsed.port_or_known_default().unwrap_or(0)
    ))
}

fn strategy_matches(strategy: EnqueueStrategy, from_url: &str, candidate_url: &str) -> bool {
    match strategy {
        EnqueueStrategy::All => true,
        EnqueueStrategy::SameHostname => hostname(from_url).is_some_and(|h| hostname(candidate_url).as_deref() == Some(h.as_str())),
        EnqueueStrategy::SameDomain => hostname(from_url)
            .map(|h| registrable_domain(&h))
            .is_some_and(|d| hostname(candidate_url).map(|h| registrable_domain(&h)).as_deref() == Some(d.as_str())),
        EnqueueStrategy::SameOrigin => origin(from_url).is_some_and(|o| origin(candidate_url).as_deref() == Some(o.as_str())),
    }
}

/// Matches `url` against a glob pattern with a single `*` wildcard segment
/// (prefix/infix/suffix only — no character classes, no `**`). A pattern
/// with no `*` requires an exact match.
fn glob_matches(pattern: &str, url: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == url,
        Some((prefix, suffix)) => {
            url.len() >= prefix.len() + suffix.len() && url.starts_with(prefix) && url.ends_with(suffix)
        }
    }
}

/// Passed by value into the user's request handler for each fetch.
///
/// Grounded on the teacher's handler-argument struct: one plain bag rather
/// than a trait, since the handler never needs to swap the crawling context
/// implementation.
pub struct CrawlingContext {
    pub request: Request,
    pub session: Arc<Session>,
    pub proxy_info: Option<ProxyInfo>,
    queue: Arc<RequestQueue>,
}

impl CrawlingContext {
    #[must_use]
    pub fn new(request: Request, session: Arc<Session>, queue: Arc<RequestQueue>, proxy_info: Option<ProxyInfo>) -> Self {
        Self {
            request,
            session,
            proxy_info,
            queue,
        }
    }

    /// Enqueues `urls` back onto the same `RequestQueue` this request came
    /// from, deriving each new request's `unique_key` the normal way.
    /// Returns one `QueueOperationInfo` per URL, in order, so a handler can
    /// tell which links were already known (§4.7 enqueueLinks contract).
    pub fn enqueue_links(&self, urls: impl IntoIterator<Item = String>) -> Vec<crate::request::EnqueueResult> {
        self.enqueue_links_with_options(urls, EnqueueStrategy::All, &[])
    }

    /// Same as `enqueue_links`, filtered first by `strategy` (relative to
    /// this request's own URL) and then by `globs` (kept only if it matches
    /// at least one pattern, when `globs` is non-empty).
    pub fn enqueue_links_with_options(
        &self,
        urls: impl IntoIterator<Item = String>,
        strategy: EnqueueStrategy,
        globs: &[String],
    ) -> Vec<crate::request::EnqueueResult> {
        urls.into_iter()
            .filter(|url| strategy_matches(strategy, &self.request.url, url))
            .filter(|url| globs.is_empty() || globs.iter().any(|pattern| glob_matches(pattern, url)))
            .map(|url| self.queue.add_request(Request::new(url), false))
            .collect()
    }
}
