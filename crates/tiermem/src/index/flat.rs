//! Exact in-memory index: every search scores every entry in scope

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::index::{ScoredId, TierScope, VectorIndex, cosine_similarity, rank_order};
use crate::memory::types::Tier;

#[derive(Debug, Clone)]
struct Entry {
    embedding: Vec<f32>,
    tier: Tier,
    last_accessed: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct FlatIndex {
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl FlatIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Entry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Entry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl VectorIndex for FlatIndex {
    fn insert(&self, id: Uuid, embedding: Vec<f32>, tier: Tier, last_accessed: DateTime<Utc>) {
        if !tier.is_indexed() {
            self.write().remove(&id);
            return;
        }
        self.write().insert(
            id,
            Entry {
                embedding,
                tier,
                last_accessed,
            },
        );
    }

    fn remove(&self, id: Uuid) -> bool {
        self.write().remove(&id).is_some()
    }

    fn search(&self, query: &[f32], k: usize, scope: TierScope, floor: f32) -> Vec<ScoredId> {
        if k == 0 {
            return Vec::new();
        }

        let mut hits: Vec<ScoredId> = self
            .read()
            .iter()
            .filter(|(_, entry)| scope.covers(entry.tier))
            .filter_map(|(id, entry)| {
                let score = cosine_similarity(query, &entry.embedding);
                (score >= floor).then_some(ScoredId {
                    id: *id,
                    score,
                    last_accessed: entry.last_accessed,
                })
            })
            .collect();

        hits.sort_by(rank_order);
        hits.truncate(k);
        hits
    }

    fn contains(&self, id: Uuid) -> bool {
        self.read().contains_key(&id)
    }

    fn tier_of(&self, id: Uuid) -> Option<Tier> {
        self.read().get(&id).map(|e| e.tier)
    }

    fn len(&self) -> usize {
        self.read().len()
    }

    fn count(&self, tier: Tier) -> usize {
        self.read().values().filter(|e| e.tier == tier).count()
    }

    fn touch(&self, id: Uuid, last_accessed: DateTime<Utc>) -> bool {
        match self.write().get_mut(&id) {
            Some(entry) => {
                if last_accessed > entry.last_accessed {
                    entry.last_accessed = last_accessed;
                }
                true
            }
            None => false,
        }
    }

    fn ids(&self) -> Vec<Uuid> {
        self.read().keys().copied().collect()
    }

    fn clear(&self) {
        self.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_search_orders_by_similarity() {
        let index = FlatIndex::new();
        let now = Utc::now();
        let close = Uuid::new_v4();
        let far = Uuid::new_v4();
        index.insert(close, vec![1.0, 0.1], Tier::Hot, now);
        index.insert(far, vec![0.2, 1.0], Tier::Warm, now);

        let hits = index.search(&[1.0, 0.0], 5, TierScope::HotWarm, -1.0);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, close);
        assert_eq!(hits[1].id, far);
    }

    #[test]
    fn test_ties_prefer_most_recent_access() {
        let index = FlatIndex::new();
        let now = Utc::now();
        let older = Uuid::new_v4();
        let newer = Uuid::new_v4();
        index.insert(older, vec![1.0, 0.0], Tier::Hot, now - Duration::minutes(5));
        index.insert(newer, vec![1.0, 0.0], Tier::Hot, now);

        let hits = index.search(&[1.0, 0.0], 2, TierScope::HotWarm, 0.0);
        assert_eq!(hits[0].id, newer);

        assert!(index.touch(older, now + Duration::minutes(1)));
        let hits = index.search(&[1.0, 0.0], 2, TierScope::HotWarm, 0.0);
        assert_eq!(hits[0].id, older);
    }

    #[test]
    fn test_floor_discards_without_padding() {
        let index = FlatIndex::new();
        let now = Utc::now();
        index.insert(Uuid::new_v4(), vec![1.0, 0.0], Tier::Hot, now);
        index.insert(Uuid::new_v4(), vec![-1.0, 0.0], Tier::Hot, now);

        let hits = index.search(&[1.0, 0.0], 10, TierScope::HotWarm, 0.0);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_scope_hot_excludes_warm() {
        let index = FlatIndex::new();
        let now = Utc::now();
        let hot = Uuid::new_v4();
        index.insert(hot, vec![1.0], Tier::Hot, now);
        index.insert(Uuid::new_v4(), vec![1.0], Tier::Warm, now);

        let hits = index.search(&[1.0], 10, TierScope::Hot, 0.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, hot);
    }

    #[test]
    fn test_cold_insert_is_a_removal() {
        let index = FlatIndex::new();
        let id = Uuid::new_v4();
        index.insert(id, vec![1.0], Tier::Warm, Utc::now());
        assert!(index.contains(id));

        index.insert(id, vec![1.0], Tier::Cold, Utc::now());
        assert!(!index.contains(id));
        assert!(index.is_empty());
    }

    #[test]
    fn test_counts_and_removal() {
        let index = FlatIndex::new();
        let now = Utc::now();
        let a = Uuid::new_v4();
        index.insert(a, vec![1.0], Tier::Hot, now);
        index.insert(Uuid::new_v4(), vec![1.0], Tier::Warm, now);
        index.insert(Uuid::new_v4(), vec![1.0], Tier::Warm, now);

        assert_eq!(index.len(), 3);
        assert_eq!(index.count(Tier::Hot), 1);
        assert_eq!(index.count(Tier::Warm), 2);
        assert_eq!(index.tier_of(a), Some(Tier::Hot));

        assert!(index.remove(a));
        assert!(!index.remove(a));
        assert_eq!(index.len(), 2);
        assert!(!index.touch(a, now));

        index.clear();
        assert!(index.ids().is_empty());
    }

    #[test]
    fn test_zero_k_returns_nothing() {
        let index = FlatIndex::new();
        index.insert(Uuid::new_v4(), vec![1.0], Tier::Hot, Utc::now());
        assert!(index.search(&[1.0], 0, TierScope::HotWarm, -1.0).is_empty());
    }
}
