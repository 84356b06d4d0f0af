//! The memory manager facade
//!
//! [`MemoryManager`] is the only entry point callers use. It owns a shared
//! [`MemoryCore`] that the migration scheduler also drives, so both paths
//! apply the same locking, timeouts and cache invalidation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CacheLayer, CacheStats, CachedHit, QueryEntry, fingerprint};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{Result, TierMemError};
use crate::index::{FlatIndex, TierScope, VectorIndex, scan_cold};
use crate::memory::history;
use crate::memory::locks::RecordLocks;
use crate::memory::recall::{Candidate, Recall, RecallRequest, RecalledRecord, blend, clamp_bias};
use crate::memory::types::{KindRegistry, NewRecord, Record, RecordKind, Tier};
use crate::resilience::{Collaborator, bounded};
use crate::storage::{self, RecordStore, collect_all, collect_tier};
use crate::tiers::{AccessTracker, MigrationReport, MigrationScheduler, SchedulerHandle};

/// With a recency bias, rank from a wider pool than `k` so recency can
/// lift records that are slightly less similar
const CANDIDATE_POOL_FACTOR: usize = 3;

/// What [`MemoryCore::repair_index`] had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Repair {
    Consistent,
    Reindexed,
    Removed,
}

/// State shared by the manager and the migration scheduler
pub struct MemoryCore {
    pub(crate) config: Config,
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) index: Arc<dyn VectorIndex>,
    pub(crate) embedder: Arc<dyn EmbeddingProvider>,
    pub(crate) cache: CacheLayer,
    pub(crate) locks: RecordLocks,
    pub(crate) access: AccessTracker,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) registry: RwLock<KindRegistry>,
    /// Raised when a write pushes the Hot tier over capacity
    pub(crate) pressure: Notify,
}

impl MemoryCore {
    fn io_timeout(&self) -> Duration {
        self.config.storage.io_timeout()
    }

    pub(crate) async fn store_get(&self, id: Uuid) -> Result<Option<Record>> {
        bounded(Collaborator::Storage, "store get", self.io_timeout(), || {
            self.store.get(id)
        })
        .await
    }

    pub(crate) async fn store_put(&self, record: &Record) -> Result<Uuid> {
        bounded(Collaborator::Storage, "store put", self.io_timeout(), || {
            self.store.put(record)
        })
        .await
    }

    pub(crate) async fn store_delete(&self, id: Uuid) -> Result<bool> {
        bounded(Collaborator::Storage, "store delete", self.io_timeout(), || {
            self.store.delete(id)
        })
        .await
    }

    pub(crate) async fn store_count(&self, tier: Tier) -> Result<usize> {
        bounded(Collaborator::Storage, "store count", self.io_timeout(), || {
            self.store.count_by_tier(tier)
        })
        .await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        bounded(
            Collaborator::Embedding,
            "embed",
            self.config.embedding.timeout(),
            || self.embedder.embed(text),
        )
        .await
    }

    fn index_agrees(&self, record: &Record) -> bool {
        if record.tier.is_indexed() {
            self.index.tier_of(record.id) == Some(record.tier)
        } else {
            !self.index.contains(record.id)
        }
    }

    /// Make the index agree with the store for one record. Takes the record
    /// lock, so callers must not hold it.
    pub(crate) async fn repair_index(&self, id: Uuid) -> Result<(Option<Record>, Repair)> {
        let _guard = self.locks.lock(id).await;
        let record = self.store_get(id).await?;

        let repair = match &record {
            Some(r) if r.tier.is_indexed() => {
                if self.index.tier_of(id) == Some(r.tier) {
                    Repair::Consistent
                } else {
                    warn!(error = %TierMemError::IndexInconsistency(id), tier = %r.tier, "Re-indexing record");
                    self.index
                        .insert(id, r.embedding.clone(), r.tier, r.last_accessed);
                    Repair::Reindexed
                }
            }
            _ => {
                if self.index.remove(id) {
                    warn!(error = %TierMemError::IndexInconsistency(id), "Dropped index entry without a Hot/Warm record");
                    self.cache.invalidate_record(id);
                    Repair::Removed
                } else {
                    Repair::Consistent
                }
            }
        };

        Ok((record, repair))
    }

    /// Delete a record from cache, index and store, in that order. The index
    /// entry is restored if the store delete fails.
    pub(crate) async fn forget(&self, id: Uuid) -> Result<()> {
        let _guard = self.locks.lock(id).await;

        let Some(record) = self.store_get(id).await? else {
            self.cache.invalidate_record(id);
            self.index.remove(id);
            self.access.reset(id);
            return Err(TierMemError::NotFound(id));
        };

        self.cache.invalidate_record(id);
        let was_indexed = self.index.remove(id);

        match self.store_delete(id).await {
            Ok(true) => {}
            Ok(false) => return Err(TierMemError::NotFound(id)),
            Err(e) => {
                if was_indexed {
                    self.index.insert(
                        id,
                        record.embedding.clone(),
                        record.tier,
                        record.last_accessed,
                    );
                }
                warn!(%id, error = %e, "Forget failed, index entry restored");
                return Err(e);
            }
        }

        self.cache.invalidate_tier(record.tier);
        self.access.reset(id);
        debug!(%id, tier = %record.tier, "Forgot record");
        Ok(())
    }

    /// Persist one access of a returned record
    async fn record_access(&self, id: Uuid) -> Result<Option<Record>> {
        let _guard = self.locks.lock(id).await;
        let Some(mut record) = self.store_get(id).await? else {
            return Ok(None);
        };

        let now = self.clock.now();
        record.mark_accessed(now);
        self.store_put(&record).await?;

        self.access.record(id, now);
        self.index.touch(id, record.last_accessed);
        self.cache.put_record(record.clone());
        Ok(Some(record))
    }

    /// Fetch a record the index returned, repairing the index if the store
    /// disagrees
    async fn load_indexed(&self, id: Uuid) -> Result<Option<Record>> {
        if let Some(record) = self.cache.get_record(id) {
            if record.tier.is_indexed() {
                return Ok(Some(record));
            }
        }

        let record = match self.store_get(id).await? {
            Some(r) if self.index_agrees(&r) => Some(r),
            _ => self.repair_index(id).await?.0,
        };

        match record {
            Some(r) if r.tier.is_indexed() => {
                self.cache.put_record(r.clone());
                Ok(Some(r))
            }
            _ => Ok(None),
        }
    }
}

/// Counts reported by [`MemoryManager::stats`]
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub hot: usize,
    pub warm: usize,
    pub cold: usize,
    pub total: usize,
    /// Entries in the vector index; equals `hot + warm` when consistent
    pub indexed: usize,
    pub hot_capacity: usize,
    pub warm_capacity: usize,
    pub cache: CacheStats,
    pub cache_hit_ratio: f64,
}

#[derive(Clone)]
pub struct MemoryManager {
    core: Arc<MemoryCore>,
}

impl MemoryManager {
    /// Build a manager over injected collaborators with an exact in-memory
    /// index and the system clock
    pub fn new(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self::with_parts(
            config,
            embedder,
            store,
            Arc::new(FlatIndex::new()),
            Arc::new(SystemClock),
        )
    }

    pub fn with_parts(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn RecordStore>,
        index: Arc<dyn VectorIndex>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = CacheLayer::new(
            config.cache.cache_capacity,
            config.cache.ttl(),
            Arc::clone(&clock),
        );

        Self {
            core: Arc::new(MemoryCore {
                config,
                store,
                index,
                embedder,
                cache,
                locks: RecordLocks::new(),
                access: AccessTracker::new(),
                clock,
                registry: RwLock::new(KindRegistry::new()),
                pressure: Notify::new(),
            }),
        }
    }

    /// Build everything from config and load Hot/Warm records into the index
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let embedder = embedding::from_config(&config.embedding).await?;
        let store = storage::open_store(&config.storage, embedder.dimension()).await?;
        let manager = Self::new(config, embedder, store);

        let indexed = manager.rebuild_index().await?;
        info!(indexed, "Memory manager ready");
        Ok(manager)
    }

    pub fn config(&self) -> &Config {
        &self.core.config
    }

    /// Admit a custom record kind
    pub fn register_kind(&self, name: &str) -> Result<RecordKind> {
        self.core
            .registry
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .register(name)
    }

    pub async fn remember(&self, text: impl Into<String>, kind: RecordKind) -> Result<Uuid> {
        self.remember_with(NewRecord::new(text, kind)).await
    }

    /// Embed, persist and index a new Hot record
    pub async fn remember_with(&self, new: NewRecord) -> Result<Uuid> {
        let core = &self.core;
        core.registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .validate(&new.kind)?;

        let embedding = core.embed(&new.text).await?;

        let mut record = Record::new(new.text, embedding, new.kind, core.clock.now());
        record.metadata = new.metadata;
        let id = record.id;

        let _guard = core.locks.lock(id).await;
        core.store_put(&record).await?;

        core.index
            .insert(id, record.embedding.clone(), Tier::Hot, record.last_accessed);
        core.cache.invalidate_tier(Tier::Hot);
        debug!(%id, kind = %record.kind, "Remembered record");
        core.cache.put_record(record);

        if core.index.count(Tier::Hot) > core.config.tiers.hot_capacity {
            core.pressure.notify_one();
        }

        Ok(id)
    }

    /// Store one user/assistant exchange, tagged with the agent role
    pub async fn remember_interaction(
        &self,
        user: &str,
        ai: &str,
        agent_type: &str,
    ) -> Result<Uuid> {
        let new = NewRecord::new(history::interaction_text(user, ai), RecordKind::Interaction)
            .with_metadata(history::USER_KEY, user)
            .with_metadata(history::AI_KEY, ai)
            .with_metadata(history::AGENT_TYPE_KEY, agent_type);
        self.remember_with(new).await
    }

    pub async fn recall(&self, query: &str, k: usize, recency_bias: f32) -> Recall {
        self.recall_with(RecallRequest::new(query).k(k).recency_bias(recency_bias))
            .await
    }

    /// Ranked search. Never fails: collaborator failures yield a degraded
    /// (possibly empty) result.
    pub async fn recall_with(&self, request: RecallRequest) -> Recall {
        let core = &self.core;
        let k = request.k.unwrap_or(core.config.retrieval.default_k);
        if k == 0 || request.query.trim().is_empty() {
            return Recall::default();
        }

        let bias = clamp_bias(request.recency_bias);
        let key = fingerprint(&request.query, k, bias, request.scope);

        if let Some(entry) = core.cache.get_query(key) {
            if let Some(recall) = self.serve_cached(&entry).await {
                return recall;
            }
        }

        let query = match core.embed(&request.query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Recall degraded: query embedding failed");
                return Recall::degraded();
            }
        };

        let floor = core.config.retrieval.relevance_floor;
        let index_scope = match request.scope {
            TierScope::Hot => TierScope::Hot,
            TierScope::HotWarm | TierScope::All => TierScope::HotWarm,
        };
        let pool = if bias > 0.0 {
            k.saturating_mul(CANDIDATE_POOL_FACTOR)
        } else {
            k
        };

        let mut recall = Recall::default();
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for hit in core.index.search(&query, pool, index_scope, floor) {
            match core.load_indexed(hit.id).await {
                Ok(Some(record)) => {
                    seen.insert(record.id);
                    candidates.push(Candidate {
                        record,
                        similarity: hit.score,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(id = %hit.id, error = %e, "Recall degraded: failed to load record");
                    recall.degraded = true;
                }
            }
        }

        let scan = match request.scope {
            TierScope::All => Some(k),
            TierScope::HotWarm if core.config.retrieval.cold_fallback && candidates.len() < k => {
                Some(k - candidates.len())
            }
            _ => None,
        };

        if let Some(needed) = scan {
            let deadline = request
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| core.config.retrieval.cold_scan_timeout());

            match tokio::time::timeout(deadline, scan_cold(core.store.as_ref(), &query, needed, floor))
                .await
            {
                Ok(Ok(cold)) => {
                    debug!(found = cold.len(), "Cold scan finished");
                    candidates.extend(
                        cold.into_iter()
                            .filter(|(r, _)| seen.insert(r.id))
                            .map(|(record, similarity)| Candidate { record, similarity }),
                    );
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Cold scan failed");
                    recall.partial = true;
                    recall.degraded = true;
                }
                Err(_) => {
                    warn!(timeout_ms = deadline.as_millis() as u64, "Cold scan timed out, returning partial results");
                    recall.partial = true;
                }
            }
        }

        let mut ranked = blend(candidates, bias);
        ranked.truncate(k);

        if !recall.partial && !recall.degraded {
            let hits = ranked
                .iter()
                .map(|r| CachedHit {
                    id: r.record.id,
                    similarity: r.similarity,
                    score: r.score,
                })
                .collect();
            core.cache.put_query(key, hits, request.scope);
        }

        for item in &mut ranked {
            match core.record_access(item.record.id).await {
                Ok(Some(updated)) => item.record = updated,
                Ok(None) => {}
                Err(e) => {
                    warn!(id = %item.record.id, error = %e, "Failed to record access");
                    recall.degraded = true;
                }
            }
        }

        recall.records = ranked;
        recall
    }

    /// Answer from a cached query result; `None` sends the caller back to a
    /// fresh search
    async fn serve_cached(&self, entry: &QueryEntry) -> Option<Recall> {
        let core = &self.core;
        let mut records = Vec::with_capacity(entry.hits.len());

        for hit in &entry.hits {
            match core.record_access(hit.id).await {
                Ok(Some(record)) => records.push(RecalledRecord {
                    record,
                    similarity: hit.similarity,
                    score: hit.score,
                }),
                Ok(None) => {
                    core.cache.invalidate_record(hit.id);
                    return None;
                }
                Err(e) => {
                    warn!(id = %hit.id, error = %e, "Cached recall could not refresh record");
                    return None;
                }
            }
        }

        Some(Recall {
            records,
            from_cache: true,
            partial: false,
            degraded: false,
        })
    }

    /// Delete a record. A second call for the same id returns `NotFound`.
    pub async fn forget(&self, id: Uuid) -> Result<()> {
        self.core.forget(id).await
    }

    /// Look up a record without counting it as an access. A record whose
    /// index entry disagrees with the store is re-indexed on the way.
    pub async fn get(&self, id: Uuid) -> Result<Option<Record>> {
        let core = &self.core;
        if let Some(record) = core.cache.get_record(id) {
            return Ok(Some(record));
        }

        let record = match core.store_get(id).await? {
            Some(r) if core.index_agrees(&r) => Some(r),
            Some(_) => core.repair_index(id).await?.0,
            None => return Ok(None),
        };

        if let Some(r) = &record {
            core.cache.put_record(r.clone());
        }
        Ok(record)
    }

    pub async fn stats(&self) -> Result<MemoryStats> {
        let core = &self.core;
        let hot = core.store_count(Tier::Hot).await?;
        let warm = core.store_count(Tier::Warm).await?;
        let cold = core.store_count(Tier::Cold).await?;
        let cache = core.cache.stats();

        Ok(MemoryStats {
            hot,
            warm,
            cold,
            total: hot + warm + cold,
            indexed: core.index.len(),
            hot_capacity: core.config.tiers.hot_capacity,
            warm_capacity: core.config.tiers.warm_capacity,
            cache,
            cache_hit_ratio: cache.hit_ratio(),
        })
    }

    /// Records in one tier, or all, newest first
    pub async fn list(&self, tier: Option<Tier>, limit: usize) -> Result<Vec<Record>> {
        let store = self.core.store.as_ref();
        let mut records = match tier {
            Some(tier) => collect_tier(store, tier).await?,
            None => collect_all(store).await?,
        };
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    /// The `limit` most recently created records, optionally of one kind
    pub async fn recent(&self, limit: usize, kind: Option<&RecordKind>) -> Result<Vec<Record>> {
        let mut records: Vec<Record> = collect_all(self.core.store.as_ref())
            .await?
            .into_iter()
            .filter(|r| kind.is_none_or(|k| &r.kind == k))
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    /// The last `limit` interactions, optionally of one agent role, as a
    /// transcript oldest first
    pub async fn recent_history(&self, limit: usize, agent_type: Option<&str>) -> Result<String> {
        let mut interactions: Vec<Record> = collect_all(self.core.store.as_ref())
            .await?
            .into_iter()
            .filter(|r| r.kind == RecordKind::Interaction)
            .filter(|r| {
                agent_type.is_none_or(|agent| {
                    r.metadata.get(history::AGENT_TYPE_KEY).map(String::as_str) == Some(agent)
                })
            })
            .collect();

        interactions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let skip = interactions.len().saturating_sub(limit);
        Ok(history::format_history(&interactions[skip..]))
    }

    pub fn format_history(records: &[Record]) -> String {
        history::format_history(records)
    }

    /// Forget every record; returns how many were removed
    pub async fn clear(&self) -> Result<usize> {
        let records = collect_all(self.core.store.as_ref()).await?;
        let mut removed = 0;
        for record in records {
            match self.core.forget(record.id).await {
                Ok(()) => removed += 1,
                Err(TierMemError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        self.core.cache.clear();
        self.core.access.clear();
        info!(removed, "Cleared memory");
        Ok(removed)
    }

    /// Write every record as pretty JSON. Defaults to
    /// `<data_dir>/export_<unix>.json`.
    pub async fn export(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => self.core.config.storage.data_dir.join(format!(
                "export_{}.json",
                self.core.clock.now().timestamp()
            )),
        };

        let records = collect_all(self.core.store.as_ref()).await?;
        let json = serde_json::to_string_pretty(&records)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, json).await?;

        info!(records = records.len(), "Exported memory to {}", path.display());
        Ok(path)
    }

    /// Load every Hot and Warm record into the index, dropping anything else
    pub async fn rebuild_index(&self) -> Result<usize> {
        let core = &self.core;
        core.index.clear();

        let mut indexed = 0;
        for tier in [Tier::Hot, Tier::Warm] {
            for record in collect_tier(core.store.as_ref(), tier).await? {
                core.index
                    .insert(record.id, record.embedding, record.tier, record.last_accessed);
                indexed += 1;
            }
        }

        debug!(indexed, "Rebuilt vector index");
        Ok(indexed)
    }

    pub fn scheduler(&self) -> MigrationScheduler {
        MigrationScheduler::new(Arc::clone(&self.core))
    }

    /// One synchronous scheduler pass
    pub async fn run_migration(&self) -> Result<MigrationReport> {
        self.scheduler().run_pass().await
    }

    /// Start the background scheduler loop
    pub fn spawn_scheduler(&self) -> SchedulerHandle {
        self.scheduler().spawn()
    }
}
