//! Crawler-wide configuration (§6 External Interfaces): storage location,
//! the shared `EventManager`, and the `CRATE_*` environment overrides.
//!
//! Grounded on the teacher's `CrawlConfigBuilder`: a typestate builder using
//! `PhantomData<State>` marker structs so `build()` is only callable once a
//! storage directory has been supplied, either explicitly or from
//! `CRATE_STORAGE_DIR`.

use crate::events::EventManager;
use crate::storage::{MemoryStorageClient, StorageClient};
use crate::utils::{
    DEFAULT_INTERNAL_TIMEOUT, DEFAULT_STORAGE_DIR, ENV_AVAILABLE_MEMORY_RATIO, ENV_INTERNAL_TIMEOUT,
    ENV_PURGE_ON_START, ENV_STORAGE_DIR, ENV_VERBOSE_LOG,
};
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub struct Unset;
pub struct WithStorageDir;

pub struct Configuration {
    pub storage_dir: PathBuf,
    pub available_memory_ratio: f64,
    pub internal_timeout: Duration,
    pub purge_on_start: bool,
    pub verbose_log: bool,
    pub events: EventManager,
    pub storage_client: Arc<dyn StorageClient>,
}

/// Builder whose `build()` is only exposed once in the `WithStorageDir`
/// state, so a `Configuration` can never be constructed without a storage
/// location.
pub struct ConfigurationBuilder<State = Unset> {
    storage_dir: Option<PathBuf>,
    available_memory_ratio: f64,
    internal_timeout: Duration,
    purge_on_start: bool,
    verbose_log: bool,
    events: Option<EventManager>,
    storage_client: Option<Arc<dyn StorageClient>>,
    _state: PhantomData<State>,
}

impl ConfigurationBuilder<Unset> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage_dir: None,
            available_memory_ratio: 0.25,
            internal_timeout: DEFAULT_INTERNAL_TIMEOUT,
            purge_on_start: false,
            verbose_log: false,
            events: None,
            storage_client: None,
            _state: PhantomData,
        }
    }

    /// Reads `CRATE_STORAGE_DIR`, falling back to `DEFAULT_STORAGE_DIR`
    /// when unset, advancing the builder to `WithStorageDir`.
    #[must_use]
    pub fn from_env(self) -> ConfigurationBuilder<WithStorageDir> {
        let storage_dir = std::env::var(ENV_STORAGE_DIR).unwrap_or_else(|_| DEFAULT_STORAGE_DIR.to_string());
        self.storage_dir(storage_dir).apply_env_overrides()
    }

    #[must_use]
    pub fn storage_dir(self, dir: impl Into<PathBuf>) -> ConfigurationBuilder<WithStorageDir> {
        ConfigurationBuilder {
            storage_dir: Some(dir.into()),
            available_memory_ratio: self.available_memory_ratio,
            internal_timeout: self.internal_timeout,
            purge_on_start: self.purge_on_start,
            verbose_log: self.verbose_log,
            events: self.events,
            storage_client: self.storage_client,
            _state: PhantomData,
        }
    }
}

impl Default for ConfigurationBuilder<Unset> {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationBuilder<WithStorageDir> {
    /// Overlays `CRATE_AVAILABLE_MEMORY_RATIO`, `CRATE_INTERNAL_TIMEOUT`,
    /// `CRATE_PURGE_ON_START` and `CRATE_VERBOSE_LOG` on top of whatever
    /// was set programmatically; an unset or unparsable env var leaves the
    /// existing value untouched.
    #[must_use]
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(ratio) = std::env::var(ENV_AVAILABLE_MEMORY_RATIO) {
            if let Ok(ratio) = ratio.parse() {
                self.available_memory_ratio = ratio;
            }
        }
        if let Ok(secs) = std::env::var(ENV_INTERNAL_TIMEOUT) {
            if let Ok(secs) = secs.parse() {
                self.internal_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(purge) = std::env::var(ENV_PURGE_ON_START) {
            self.purge_on_start = purge == "1" || purge.eq_ignore_ascii_case("true");
        }
        if let Ok(verbose) = std::env::var(ENV_VERBOSE_LOG) {
            self.verbose_log = verbose == "1" || verbose.eq_ignore_ascii_case("true");
        }
        self
    }

    #[must_use]
    pub fn available_memory_ratio(mut self, ratio: f64) -> Self {
        self.available_memory_ratio = ratio;
        self
    }

    #[must_use]
    pub fn purge_on_start(mut self, purge: bool) -> Self {
        self.purge_on_start = purge;
        self
    }

    #[must_use]
    pub fn verbose_log(mut self, verbose: bool) -> Self {
        self.verbose_log = verbose;
        self
    }

    #[must_use]
    pub fn events(mut self, events: EventManager) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn storage_client(mut self, client: Arc<dyn StorageClient>) -> Self {
        self.storage_client = Some(client);
        self
    }

    #[must_use]
    pub fn build(self) -> Configuration {
        Configuration {
            storage_dir: self.storage_dir.expect("WithStorageDir state guarantees this is set"),
            available_memory_ratio: self.available_memory_ratio,
            internal_timeout: self.internal_timeout,
            purge_on_start: self.purge_on_start,
            verbose_log: self.verbose_log,
            events: self.events.unwrap_or_default(),
            storage_client: self.storage_client.unwrap_or_else(|| Arc::new(MemoryStorageClient::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_fills_in_defaults_when_nothing_else_is_set() {
        let config = ConfigurationBuilder::new().storage_dir("./storage").build();
        assert_eq!(config.storage_dir, PathBuf::from("./storage"));
        assert!(!config.purge_on_start);
    }

    #[test]
    fn programmatic_overrides_stick_without_env_vars() {
        let config = ConfigurationBuilder::new()
            .storage_dir("./storage")
            .purge_on_start(true)
            .available_memory_ratio(0.5)
            .build();
        assert!(config.purge_on_start);
        assert_eq!(config.available_memory_ratio, 0.5);
    }
}
