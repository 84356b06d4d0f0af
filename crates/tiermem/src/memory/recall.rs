//! Recall request/response types and the similarity/recency blend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::index::TierScope;
use crate::memory::types::Record;

/// Parameters for `MemoryManager::recall_with`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallRequest {
    pub query: String,
    /// Maximum number of results; defaults to `retrieval.default_k`
    #[serde(default)]
    pub k: Option<usize>,
    /// Weight of recency against similarity, clamped to [0, 1]
    #[serde(default)]
    pub recency_bias: f32,
    #[serde(default)]
    pub scope: TierScope,
    /// Overrides `retrieval.cold_scan_timeout_ms` for this call
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl RecallRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            k: None,
            recency_bias: 0.0,
            scope: TierScope::default(),
            timeout_ms: None,
        }
    }

    pub fn k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    pub fn recency_bias(mut self, bias: f32) -> Self {
        self.recency_bias = bias;
        self
    }

    pub fn scope(mut self, scope: TierScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Clamp a caller-supplied bias into [0, 1]; NaN means no bias
pub fn clamp_bias(bias: f32) -> f32 {
    if bias.is_nan() { 0.0 } else { bias.clamp(0.0, 1.0) }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecalledRecord {
    pub record: Record,
    /// Raw cosine similarity in [-1, 1]
    pub similarity: f32,
    /// Blended ranking score in [0, 1]
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Recall {
    pub records: Vec<RecalledRecord>,
    /// Served from the query-result cache
    pub from_cache: bool,
    /// The Cold scan was cut short; results cover Hot and Warm only
    pub partial: bool,
    /// A collaborator failed; results may be missing
    pub degraded: bool,
}

impl Recall {
    pub fn degraded() -> Self {
        Self {
            degraded: true,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.record.text.as_str()).collect()
    }
}

/// A candidate before blending
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub record: Record,
    pub similarity: f32,
}

/// Score candidates as `(1-b)*sim_n + b*rec_n` and sort best first.
///
/// `sim_n` maps cosine from [-1, 1] to [0, 1]; `rec_n` is the min-max
/// normalized last access time among the candidates, 1.0 when all are equal.
pub(crate) fn blend(candidates: Vec<Candidate>, bias: f32) -> Vec<RecalledRecord> {
    let bias = clamp_bias(bias);
    let times: Vec<DateTime<Utc>> = candidates.iter().map(|c| c.record.last_accessed).collect();
    let oldest = times.iter().min().copied();
    let newest = times.iter().max().copied();

    let recency = |at: DateTime<Utc>| -> f32 {
        match (oldest, newest) {
            (Some(lo), Some(hi)) if hi > lo => {
                let span = (hi - lo).num_microseconds().unwrap_or(i64::MAX) as f64;
                let offset = (at - lo).num_microseconds().unwrap_or(i64::MAX) as f64;
                (offset / span) as f32
            }
            _ => 1.0,
        }
    };

    let mut ranked: Vec<RecalledRecord> = candidates
        .into_iter()
        .map(|c| {
            let sim_n = (c.similarity + 1.0) / 2.0;
            let rec_n = recency(c.record.last_accessed);
            RecalledRecord {
                score: (1.0 - bias) * sim_n + bias * rec_n,
                similarity: c.similarity,
                record: c.record,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.record.last_accessed.cmp(&a.record.last_accessed))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::RecordKind;
    use chrono::Duration;

    fn candidate(similarity: f32, last_accessed: DateTime<Utc>) -> Candidate {
        let mut record = Record::new("x".into(), vec![1.0], RecordKind::Interaction, last_accessed);
        record.last_accessed = last_accessed;
        Candidate { record, similarity }
    }

    #[test]
    fn test_zero_bias_is_pure_similarity() {
        let now = Utc::now();
        let ranked = blend(
            vec![
                candidate(0.2, now),
                candidate(0.9, now - Duration::days(3)),
            ],
            0.0,
        );
        assert!((ranked[0].similarity - 0.9).abs() < 1e-6);
        assert!((ranked[0].score - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_full_bias_is_pure_recency() {
        let now = Utc::now();
        let ranked = blend(
            vec![
                candidate(0.9, now - Duration::days(3)),
                candidate(0.2, now),
            ],
            1.0,
        );
        assert!((ranked[0].similarity - 0.2).abs() < 1e-6);
        assert!((ranked[0].score - 1.0).abs() < 1e-6);
        assert!(ranked[1].score.abs() < 1e-6);
    }

    #[test]
    fn test_equal_times_normalize_to_one() {
        let now = Utc::now();
        let ranked = blend(vec![candidate(0.0, now), candidate(0.0, now)], 0.5);
        for r in &ranked {
            assert!((r.score - 0.75).abs() < 1e-6);
        }
    }

    #[test]
    fn test_bias_is_clamped() {
        assert_eq!(clamp_bias(-0.5), 0.0);
        assert_eq!(clamp_bias(3.0), 1.0);
        assert_eq!(clamp_bias(f32::NAN), 0.0);
        assert_eq!(clamp_bias(0.25), 0.25);
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let req: RecallRequest = serde_json::from_str(r#"{"query": "paris"}"#).unwrap();
        assert_eq!(req, RecallRequest::new("paris"));
    }
}
