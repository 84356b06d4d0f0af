//! Recency cache in front of the store and index
//!
//! Two independent LRU caches: record content by id, and ranked query
//! results by query fingerprint. Both are views; anything evicted is
//! recoverable from the store. Query entries expire after the configured
//! TTL and are dropped whenever a change could alter their answer.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde::Serialize;
use uuid::Uuid;

use crate::clock::Clock;
use crate::index::TierScope;
use crate::memory::types::{Record, Tier};

/// Default capacity used when a zero capacity slips through
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// One ranked hit remembered for a query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedHit {
    pub id: Uuid,
    pub similarity: f32,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryEntry {
    pub hits: Vec<CachedHit>,
    pub scope: TierScope,
    pub inserted_at: DateTime<Utc>,
}

impl QueryEntry {
    fn names(&self, id: Uuid) -> bool {
        self.hits.iter().any(|h| h.id == id)
    }
}

/// Counters reported through `MemoryManager::stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub capacity: usize,
    pub record_entries: usize,
    pub query_entries: usize,
    pub record_hits: u64,
    pub record_misses: u64,
    pub query_hits: u64,
    pub query_misses: u64,
}

impl CacheStats {
    /// Hits over lookups across both caches; 0.0 before any lookup
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.record_hits + self.query_hits;
        let lookups = hits + self.record_misses + self.query_misses;
        if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        }
    }
}

/// Stable key for a recall: normalized text, k, bias bits and scope
pub fn fingerprint(query: &str, k: usize, recency_bias: f32, scope: TierScope) -> u64 {
    let normalized = query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");

    let mut hasher = DefaultHasher::new();
    normalized.hash(&mut hasher);
    k.hash(&mut hasher);
    recency_bias.to_bits().hash(&mut hasher);
    scope.hash(&mut hasher);
    hasher.finish()
}

pub struct CacheLayer {
    records: Mutex<LruCache<Uuid, Record>>,
    queries: Mutex<LruCache<u64, QueryEntry>>,
    capacity: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    record_hits: AtomicU64,
    record_misses: AtomicU64,
    query_hits: AtomicU64,
    query_misses: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl CacheLayer {
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let cap = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_CACHE_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            records: Mutex::new(LruCache::new(cap)),
            queries: Mutex::new(LruCache::new(cap)),
            capacity: cap.get(),
            ttl,
            clock,
            record_hits: AtomicU64::new(0),
            record_misses: AtomicU64::new(0),
            query_hits: AtomicU64::new(0),
            query_misses: AtomicU64::new(0),
        }
    }

    pub fn get_record(&self, id: Uuid) -> Option<Record> {
        let found = lock(&self.records).get(&id).cloned();
        let counter = if found.is_some() {
            &self.record_hits
        } else {
            &self.record_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Insert a record, evicting the least recently used one when full
    pub fn put_record(&self, record: Record) {
        lock(&self.records).put(record.id, record);
    }

    pub fn contains_record(&self, id: Uuid) -> bool {
        lock(&self.records).contains(&id)
    }

    /// Look up a query entry; expired entries are dropped and count as misses
    pub fn get_query(&self, key: u64) -> Option<QueryEntry> {
        let now = self.clock.now();
        let mut queries = lock(&self.queries);

        let expired = match queries.get(&key) {
            Some(entry) => now - entry.inserted_at >= self.ttl,
            None => {
                self.query_misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            queries.pop(&key);
            self.query_misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.query_hits.fetch_add(1, Ordering::Relaxed);
        queries.get(&key).cloned()
    }

    pub fn put_query(&self, key: u64, hits: Vec<CachedHit>, scope: TierScope) {
        let entry = QueryEntry {
            hits,
            scope,
            inserted_at: self.clock.now(),
        };
        lock(&self.queries).put(key, entry);
    }

    /// Drop a record and every query result that names it
    pub fn invalidate_record(&self, id: Uuid) {
        lock(&self.records).pop(&id);

        let mut queries = lock(&self.queries);
        let stale: Vec<u64> = queries
            .iter()
            .filter(|(_, entry)| entry.names(id))
            .map(|(key, _)| *key)
            .collect();
        for key in stale {
            queries.pop(&key);
        }
    }

    /// Drop query results whose scope covers `tier`
    pub fn invalidate_tier(&self, tier: Tier) {
        let mut queries = lock(&self.queries);
        let stale: Vec<u64> = queries
            .iter()
            .filter(|(_, entry)| entry.scope.covers(tier))
            .map(|(key, _)| *key)
            .collect();
        for key in stale {
            queries.pop(&key);
        }
    }

    /// A record moved between tiers: its content changed and both tiers'
    /// query results may be stale
    pub fn invalidate_move(&self, id: Uuid, from: Tier, to: Tier) {
        self.invalidate_record(id);
        self.invalidate_tier(from);
        self.invalidate_tier(to);
    }

    pub fn clear(&self) {
        lock(&self.records).clear();
        lock(&self.queries).clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            capacity: self.capacity,
            record_entries: lock(&self.records).len(),
            query_entries: lock(&self.queries).len(),
            record_hits: self.record_hits.load(Ordering::Relaxed),
            record_misses: self.record_misses.load(Ordering::Relaxed),
            query_hits: self.query_hits.load(Ordering::Relaxed),
            query_misses: self.query_misses.load(Ordering::Relaxed),
        }
    }
}
