//! Persistent record store
//!
//! The store owns the authoritative copy of every [`Record`]. `put` is the
//! single point of durability: a record is visible to the index and cache
//! only after its `put` has completed.

pub mod file;
pub mod lance;

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;
use crate::memory::types::{Record, Tier};

pub use file::FileStore;
pub use lance::LanceStore;

/// Lazy, finite sequence of records. Each `list_by_tier` call starts a
/// fresh scan, so a listing can always be restarted.
pub type RecordStream = BoxStream<'static, Result<Record>>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace a record; returns its id once durable
    async fn put(&self, record: &Record) -> Result<Uuid>;

    async fn get(&self, id: Uuid) -> Result<Option<Record>>;

    /// Returns false when no record had this id
    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn list_by_tier(&self, tier: Tier) -> Result<RecordStream>;

    async fn count_by_tier(&self, tier: Tier) -> Result<usize> {
        let stream = self.list_by_tier(tier).await?;
        stream.try_fold(0usize, |n, _| async move { Ok(n + 1) }).await
    }

    async fn total_count(&self) -> Result<usize> {
        let mut total = 0;
        for tier in Tier::ALL {
            total += self.count_by_tier(tier).await?;
        }
        Ok(total)
    }
}

/// Drain a tier listing into memory
pub async fn collect_tier(store: &dyn RecordStore, tier: Tier) -> Result<Vec<Record>> {
    store.list_by_tier(tier).await?.try_collect().await
}

/// Every record in the store, Hot first
pub async fn collect_all(store: &dyn RecordStore) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for tier in Tier::ALL {
        records.extend(collect_tier(store, tier).await?);
    }
    Ok(records)
}

/// Open the configured backend under `<data_dir>/<namespace>`
pub async fn open_store(config: &StorageConfig, dimension: usize) -> Result<Arc<dyn RecordStore>> {
    let dir = config.namespace_dir();
    tracing::info!(
        backend = ?config.backend,
        "Opening record store at: {}",
        dir.display()
    );

    match config.backend {
        StorageBackend::Lance => Ok(Arc::new(LanceStore::open(&dir, dimension).await?)),
        StorageBackend::File => Ok(Arc::new(FileStore::open(&dir).await?)),
    }
}
