//! Test utilities for tiermem - in-memory collaborators and fault injection
//!
//! - [`InMemoryStore`]: a `RecordStore` backed by a `HashMap`
//! - [`FlakyStore`]: wraps an in-memory store and fails selected operations
//! - [`FailingEmbedder`] / [`CountingEmbedder`]: embedding doubles
//! - [`test_manager`]: a manager over those doubles with a manual clock

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use uuid::Uuid;

use crate::clock::ManualClock;
use crate::config::{Config, EmbeddingProviderKind};
use crate::embedding::{EmbeddingProvider, HashingEmbedder};
use crate::error::{Result, TierMemError};
use crate::index::FlatIndex;
use crate::memory::MemoryManager;
use crate::memory::types::{Record, Tier};
use crate::storage::{RecordStore, RecordStream};

/// Embedding size used by the test doubles
pub const TEST_DIMENSION: usize = 256;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Volatile record store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Mutex<HashMap<Uuid, Record>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Direct read that bypasses the trait, for assertions
    pub fn snapshot(&self, id: Uuid) -> Option<Record> {
        lock(&self.records).get(&id).cloned()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn put(&self, record: &Record) -> Result<Uuid> {
        lock(&self.records).insert(record.id, record.clone());
        Ok(record.id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Record>> {
        Ok(lock(&self.records).get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(lock(&self.records).remove(&id).is_some())
    }

    async fn list_by_tier(&self, tier: Tier) -> Result<RecordStream> {
        let records: Vec<Result<Record>> = lock(&self.records)
            .values()
            .filter(|r| r.tier == tier)
            .cloned()
            .map(Ok)
            .collect();
        Ok(Box::pin(stream::iter(records)))
    }
}

fn injected(op: &str) -> TierMemError {
    TierMemError::StorageUnavailable(format!("injected {op} failure"))
}

/// In-memory store with switchable failures
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    fail_puts: AtomicBool,
    fail_gets: AtomicBool,
    fail_deletes: AtomicBool,
    fail_puts_for: Mutex<HashSet<Uuid>>,
    list_delay: Mutex<Option<Duration>>,
    put_delay: Mutex<Option<Duration>>,
    puts: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Fail every put of one record
    pub fn fail_puts_for(&self, id: Uuid) {
        lock(&self.fail_puts_for).insert(id);
    }

    pub fn heal(&self) {
        self.fail_puts(false);
        self.fail_gets(false);
        self.fail_deletes(false);
        lock(&self.fail_puts_for).clear();
        *lock(&self.list_delay) = None;
        *lock(&self.put_delay) = None;
    }

    /// Delay every listing, to exercise scan deadlines
    pub fn delay_listing(&self, delay: Duration) {
        *lock(&self.list_delay) = Some(delay);
    }

    /// Hold every put for `delay` before writing
    pub fn delay_puts(&self, delay: Duration) {
        *lock(&self.put_delay) = Some(delay);
    }

    pub fn put_calls(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn put(&self, record: &Record) -> Result<Uuid> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) || lock(&self.fail_puts_for).contains(&record.id)
        {
            return Err(injected("put"));
        }
        let delay = *lock(&self.put_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.put(record).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Record>> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(injected("get"));
        }
        self.inner.get(id).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(injected("delete"));
        }
        self.inner.delete(id).await
    }

    async fn list_by_tier(&self, tier: Tier) -> Result<RecordStream> {
        let delay = *lock(&self.list_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.list_by_tier(tier).await
    }
}

/// Embedder that is always down
#[derive(Debug, Clone)]
pub struct FailingEmbedder {
    dimension: usize,
}

impl FailingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(TierMemError::EmbeddingUnavailable(
            "embedding service offline".to_string(),
        ))
    }
}

/// Hashing embedder that counts calls and can be switched off
#[derive(Debug)]
pub struct CountingEmbedder {
    inner: HashingEmbedder,
    calls: AtomicUsize,
    offline: AtomicBool,
}

impl CountingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: HashingEmbedder::new(dimension),
            calls: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(TierMemError::EmbeddingUnavailable("offline".to_string()));
        }
        self.inner.embed(text).await
    }
}

/// Config for tests: hashing embedder, short timeouts
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.embedding.provider = EmbeddingProviderKind::Hashing;
    config.embedding.dimension = TEST_DIMENSION;
    config.embedding.timeout_ms = 1_000;
    config.storage.io_timeout_ms = 1_000;
    config.retrieval.cold_scan_timeout_ms = 1_000;
    config
}

/// Collaborators of a manager built by [`test_manager`]
pub struct TestHarness {
    pub manager: MemoryManager,
    pub store: Arc<FlakyStore>,
    pub embedder: Arc<CountingEmbedder>,
    pub index: Arc<FlatIndex>,
    pub clock: Arc<ManualClock>,
}

/// A manager over a [`FlakyStore`], a [`CountingEmbedder`], a fresh
/// [`FlatIndex`] and a [`ManualClock`]
pub fn test_manager(config: Config) -> TestHarness {
    let store = Arc::new(FlakyStore::new());
    let embedder = Arc::new(CountingEmbedder::new(config.embedding.dimension));
    let index = Arc::new(FlatIndex::new());
    let clock = Arc::new(ManualClock::default());

    let manager = MemoryManager::with_parts(
        config,
        embedder.clone(),
        store.clone(),
        index.clone(),
        clock.clone(),
    );

    TestHarness {
        manager,
        store,
        embedder,
        index,
        clock,
    }
}
