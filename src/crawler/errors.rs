//! Error kinds and retry classification for the crawler core.
//!
//! Grounded on the teacher's `crawl_types::{CrawlError, FailureKind}`: a
//! plain `Display`/`Error` enum plus a `classify`/`is_retryable` pair, rather
//! than a `thiserror` derive — this crate has no use for `thiserror`'s
//! attribute machinery once every variant needs bespoke routing logic
//! anyway.

use std::fmt;

/// Error surfaced from a request-handler invocation or from the crawler's
/// own orchestration.
///
/// Mirrors §7 of the spec: each variant carries its own retry policy, and
/// `classify()` folds a user-thrown `anyhow::Error` into the closest
/// matching generic-failure variant when the user hands back an opaque
/// error instead of one of these.
#[derive(Debug, Clone)]
pub enum CrawlerError {
    /// Thrown by the user's handler: bypass retry, go straight to the
    /// failed-request handler.
    NonRetryable(String),
    /// Thrown by the user's handler: always retry (still capped by
    /// `max_request_retries`).
    RetryRequest(String),
    /// Proxy/session rotation signal: retire the session, retry on a fresh
    /// one without charging a retry.
    Session(String),
    /// The handler did not complete within `request_handler_timeout_secs`.
    HandlerTimeout,
    /// HTTP layer reported a blocked status code (401/403/429, or
    /// user-configured).
    HttpBlocked(u16),
    /// Anything else raised inside the handler.
    Generic(String),
    /// A `StorageClient`/`QueueBackend` call exhausted its internal retry
    /// budget (see `DEFAULT_QUEUE_CALL_RETRIES`).
    QueueTimeout(String),
    /// Raised during crawler construction/configuration; `run()` fails
    /// immediately and no requests are dispatched.
    Fatal(String),
}

impl fmt::Display for CrawlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonRetryable(msg) => write!(f, "non-retryable error: {msg}"),
            Self::RetryRequest(msg) => write!(f, "retry requested: {msg}"),
            Self::Session(msg) => write!(f, "session error: {msg}"),
            Self::HandlerTimeout => write!(f, "request handler timed out"),
            Self::HttpBlocked(code) => write!(f, "blocked with HTTP status {code}"),
            Self::Generic(msg) => write!(f, "{msg}"),
            Self::QueueTimeout(msg) => write!(f, "queue API call failed: {msg}"),
            Self::Fatal(msg) => write!(f, "fatal crawler error: {msg}"),
        }
    }
}

impl std::error::Error for CrawlerError {}

impl From<anyhow::Error> for CrawlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Generic(format!("{err:#}"))
    }
}

impl CrawlerError {
    /// Whether this error, on its own, should route the request back to
    /// `reclaim` (retryable) rather than straight to the failed-request
    /// handler.
    ///
    /// Retry-count/`no_retry` gating happens one layer up in the crawler
    /// loop — this only answers "is this *kind* of failure ever
    /// retryable".
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::NonRetryable(_) | Self::Fatal(_) => false,
            Self::RetryRequest(_)
            | Self::Session(_)
            | Self::HandlerTimeout
            | Self::HttpBlocked(_)
            | Self::Generic(_)
            | Self::QueueTimeout(_) => true,
        }
    }

    /// Whether this error should retire the current session (401/403/429
    /// or an explicit `Session` error).
    #[must_use]
    pub fn retires_session(&self, extra_blocked_codes: &[u16]) -> bool {
        match self {
            Self::Session(_) => true,
            Self::HttpBlocked(code) => {
                matches!(code, 401 | 403 | 429) || extra_blocked_codes.contains(code)
            }
            _ => false,
        }
    }

    /// Whether a retry for this error charges against `request.retry_count`
    /// (a `Session` error re-serves the request on a fresh session "for
    /// free", per §7's propagation policy).
    #[must_use]
    pub const fn charges_retry_count(&self) -> bool {
        !matches!(self, Self::Session(_))
    }

    /// One tracked log line for `request.error_messages`: message, kind,
    /// and a stack-trace fingerprint. `verbose` toggles between
    /// message-only and the full chained display (`CRATE_VERBOSE_LOG`).
    #[must_use]
    pub fn log_entry(&self, verbose: bool) -> String {
        let kind = self.kind_name();
        if verbose {
            format!("[{kind}] {self:#}", self = DebugVerbose(self))
        } else {
            format!("[{kind}] {self}")
        }
    }

    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::NonRetryable(_) => "non_retryable",
            Self::RetryRequest(_) => "retry_request",
            Self::Session(_) => "session",
            Self::HandlerTimeout => "handler_timeout",
            Self::HttpBlocked(_) => "http_blocked",
            Self::Generic(_) => "generic",
            Self::QueueTimeout(_) => "queue_timeout",
            Self::Fatal(_) => "fatal",
        }
    }
}

struct DebugVerbose<'a>(&'a CrawlerError);

impl fmt::Display for DebugVerbose<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

pub type CrawlerResult<T> = Result<T, CrawlerError>;
