//! Vector similarity index over Hot and Warm records
//!
//! Cold records never live in the index; they are reachable only through
//! [`scan_cold`], a full scan over the store's Cold listing.

pub mod flat;

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::memory::types::{Record, Tier};
use crate::storage::RecordStore;

pub use flat::FlatIndex;

/// Which tiers a search covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierScope {
    Hot,
    #[default]
    HotWarm,
    /// Hot and Warm from the index plus a forced Cold scan
    All,
}

impl TierScope {
    /// Whether records of `tier` can appear in results for this scope
    pub fn covers(self, tier: Tier) -> bool {
        match self {
            TierScope::Hot => tier == Tier::Hot,
            TierScope::HotWarm => tier != Tier::Cold,
            TierScope::All => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TierScope::Hot => "hot",
            TierScope::HotWarm => "hot_warm",
            TierScope::All => "all",
        }
    }
}

/// One search hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredId {
    pub id: Uuid,
    pub score: f32,
    pub last_accessed: DateTime<Utc>,
}

/// Highest score first, ties broken by most recent access
pub fn rank_order(a: &ScoredId, b: &ScoredId) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.last_accessed.cmp(&a.last_accessed))
}

pub trait VectorIndex: Send + Sync {
    /// Insert or replace the entry for `id`
    fn insert(&self, id: Uuid, embedding: Vec<f32>, tier: Tier, last_accessed: DateTime<Utc>);

    /// Returns false when `id` was not indexed
    fn remove(&self, id: Uuid) -> bool;

    /// Top `k` entries in `scope` scoring at least `floor`, best first
    fn search(&self, query: &[f32], k: usize, scope: TierScope, floor: f32) -> Vec<ScoredId>;

    fn contains(&self, id: Uuid) -> bool;

    /// Tier recorded for an indexed id
    fn tier_of(&self, id: Uuid) -> Option<Tier>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn count(&self, tier: Tier) -> usize;

    /// Update the recency used for tie-breaking; false if not indexed
    fn touch(&self, id: Uuid, last_accessed: DateTime<Utc>) -> bool;

    fn ids(&self) -> Vec<Uuid>;

    fn clear(&self);
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Exhaustive similarity scan over the Cold tier.
///
/// Streams the store listing so only the current top `k` is held in
/// memory. Dropping the returned future cancels the scan.
pub async fn scan_cold(
    store: &dyn RecordStore,
    query: &[f32],
    k: usize,
    floor: f32,
) -> Result<Vec<(Record, f32)>> {
    if k == 0 {
        return Ok(Vec::new());
    }

    let mut stream = store.list_by_tier(Tier::Cold).await?;
    let mut best: Vec<(Record, f32)> = Vec::new();

    while let Some(record) = stream.try_next().await? {
        let score = cosine_similarity(query, &record.embedding);
        if score < floor {
            continue;
        }
        best.push((record, score));
        best.sort_by(|(ra, sa), (rb, sb)| {
            sb.total_cmp(sa)
                .then_with(|| rb.last_accessed.cmp(&ra.last_accessed))
        });
        best.truncate(k);
    }

    Ok(best)
}
