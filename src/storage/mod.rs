//! Storage abstraction (§4.12). `RequestQueue`, `RequestList` and
//! `SessionPool` each expose a `get_state`/`persist_state` snapshot of their
//! own shape; the `Crawler` is the one component that owns a
//! `StorageClient` and writes those snapshots through a `KeyValueStore` on
//! its `PersistState` tick, rather than threading a storage handle into
//! every data structure. The crate ships usable out of the box on an
//! in-memory store and an embedder can swap in a disk/Redis/S3-backed one
//! by supplying their own `StorageClient` to `Configuration`.
//!
//! Grounded on the teacher's storage-capability split (a dataset trait, a
//! key-value trait, a queue trait, each independently implementable) and its
//! boxed-future object-safety trick for async trait methods, used here
//! instead of pulling in `async_trait`.

use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable key -> JSON value storage for persisted state records (queue
/// head, session pool snapshot, crawler statistics).
pub trait KeyValueStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<Option<Value>>>;
    fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, anyhow::Result<()>>;
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Append-only record storage (crawl results, enqueue-link reports).
pub trait Dataset: Send + Sync {
    fn push(&self, record: Value) -> BoxFuture<'_, anyhow::Result<()>>;
    fn len(&self) -> BoxFuture<'_, anyhow::Result<u64>>;
}

/// Everything a storage backend needs to provide for the crate to run
/// end to end.
pub trait StorageClient: Send + Sync {
    fn key_value_store(&self, name: &str) -> Arc<dyn KeyValueStore>;
    fn dataset(&self, name: &str) -> Arc<dyn Dataset>;
}

/// Reference in-memory implementation: the default for tests and for
/// embedders who only need crawl-lifetime persistence (§6: non-goal is a
/// disk/network-backed store, not persistence itself).
#[derive(Default)]
pub struct MemoryStorageClient {
    kv_stores: DashMap<String, Arc<MemoryKeyValueStore>>,
    datasets: DashMap<String, Arc<MemoryDataset>>,
}

impl MemoryStorageClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageClient for MemoryStorageClient {
    fn key_value_store(&self, name: &str) -> Arc<dyn KeyValueStore> {
        self.kv_stores
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryKeyValueStore::default()))
            .clone()
    }

    fn dataset(&self, name: &str) -> Arc<dyn Dataset> {
        self.datasets
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryDataset::default()))
            .clone()
    }
}

#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: DashMap<String, Value>,
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<Option<Value>>> {
        let value = self.entries.get(key).map(|v| v.clone());
        Box::pin(async move { Ok(value) })
    }

    fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, anyhow::Result<()>> {
        self.entries.insert(key.to_string(), value);
        Box::pin(async move { Ok(()) })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        self.entries.remove(key);
        Box::pin(async move { Ok(()) })
    }
}

#[derive(Default)]
pub struct MemoryDataset {
    records: DashMap<u64, Value>,
    next_id: AtomicU64,
}

impl Dataset for MemoryDataset {
    fn push(&self, record: Value) -> BoxFuture<'_, anyhow::Result<()>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.records.insert(id, record);
        Box::pin(async move { Ok(()) })
    }

    fn len(&self) -> BoxFuture<'_, anyhow::Result<u64>> {
        let len = self.records.len() as u64;
        Box::pin(async move { Ok(len) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn key_value_store_round_trips_per_name() {
        let client = MemoryStorageClient::new();
        let store = client.key_value_store("queue-state");
        store.set("head", serde_json::json!({"a": 1})).await.unwrap();
        assert_eq!(store.get("head").await.unwrap(), Some(serde_json::json!({"a": 1})));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn dataset_tracks_pushed_record_count() {
        let client = MemoryStorageClient::new();
        let dataset = client.dataset("results");
        assert_eq!(dataset.len().await.unwrap(), 0);
        dataset.push(serde_json::json!({"url": "https://example.com"})).await.unwrap();
        assert_eq!(dataset.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn same_name_returns_the_same_store_instance() {
        let client = MemoryStorageClient::new();
        let a = client.key_value_store("x");
        a.set("k", serde_json::json!(1)).await.unwrap();
        let b = client.key_value_store("x");
        assert_eq!(b.get("k").await.unwrap(), Some(serde_json::json!(1)));
    }
}
