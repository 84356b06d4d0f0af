//! Windowed access statistics used for promotion decisions

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct AccessTracker {
    hits: DashMap<Uuid, VecDeque<DateTime<Utc>>>,
}

impl AccessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, id: Uuid, at: DateTime<Utc>) {
        self.hits.entry(id).or_default().push_back(at);
    }

    /// Accesses of `id` in `(now - window, now]`
    pub fn count_within(&self, id: Uuid, now: DateTime<Utc>, window: Duration) -> usize {
        let since = now - window;
        self.hits
            .get(&id)
            .map(|times| times.iter().filter(|t| **t > since && **t <= now).count())
            .unwrap_or(0)
    }

    /// Ids with more than `threshold` accesses inside the window. Accesses
    /// that fell out of the window are discarded along the way.
    pub fn promotion_candidates(
        &self,
        now: DateTime<Utc>,
        window: Duration,
        threshold: u32,
    ) -> Vec<Uuid> {
        let since = now - window;
        self.hits.retain(|_, times| {
            while times.front().is_some_and(|t| *t <= since) {
                times.pop_front();
            }
            !times.is_empty()
        });

        self.hits
            .iter()
            .filter(|entry| entry.value().len() > threshold as usize)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Forget the counted accesses of `id` (after a promotion or a delete)
    pub fn reset(&self, id: Uuid) {
        self.hits.remove(&id);
    }

    pub fn clear(&self) {
        self.hits.clear();
    }

    pub fn tracked(&self) -> usize {
        self.hits.len()
    }
}
