//! Tier migration scheduler
//!
//! A pass re-evaluates tier membership in a fixed order:
//! 1. promote records whose windowed access count exceeds the threshold
//! 2. demote least-recently-accessed Hot records while Hot is over capacity
//! 3. demote least-recently-accessed Warm records to Cold while Warm is
//!    over capacity, skipping records that entered Warm in this pass
//! 4. reconcile the index against the store
//! 5. forget Cold records past the retention period, when one is set
//!
//! Every move takes the record lock, re-reads the record and changes index
//! membership and the persisted tier together, rolling the index back if
//! the store write fails.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, TierMemError};
use crate::memory::manager::{MemoryCore, Repair};
use crate::memory::types::{Record, Tier};
use crate::storage::collect_tier;

/// A move that could not be completed; retried on the next pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationFailure {
    pub id: Uuid,
    pub from: Tier,
    pub to: Option<Tier>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationReport {
    pub promoted: usize,
    pub demoted_to_warm: usize,
    pub demoted_to_cold: usize,
    pub reindexed: usize,
    pub removed_from_index: usize,
    pub expired: usize,
    pub failures: Vec<MigrationFailure>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Promote,
    Demote { from: Tier },
}

pub struct MigrationScheduler {
    core: Arc<MemoryCore>,
}

impl MigrationScheduler {
    pub fn new(core: Arc<MemoryCore>) -> Self {
        Self { core }
    }

    /// Move one record a single tier. `Ok(None)` means there was nothing to
    /// do: the record is gone, already moved, or at the end of the chain.
    async fn move_record(&self, id: Uuid, step: Step) -> Result<Option<(Tier, Tier)>> {
        let core = &self.core;
        let _guard = core.locks.lock(id).await;

        let Some(mut record) = core.store_get(id).await? else {
            return Ok(None);
        };

        let from = record.tier;
        let to = match step {
            Step::Promote => from.promoted(),
            Step::Demote { from: expected } if expected == from => from.demoted(),
            Step::Demote { .. } => None,
        };
        let Some(to) = to else {
            return Ok(None);
        };

        record.tier = to;
        if to.is_indexed() {
            core.index
                .insert(id, record.embedding.clone(), to, record.last_accessed);
        } else {
            core.index.remove(id);
        }

        if let Err(e) = core.store_put(&record).await {
            if from.is_indexed() {
                core.index
                    .insert(id, record.embedding.clone(), from, record.last_accessed);
            } else {
                core.index.remove(id);
            }
            return Err(e);
        }

        core.cache.invalidate_move(id, from, to);
        debug!(%id, %from, %to, "Moved record");
        Ok(Some((from, to)))
    }

    fn failure(id: Uuid, from: Tier, to: Option<Tier>, error: &TierMemError) -> MigrationFailure {
        warn!(%id, %from, error = %error, "Tier move failed, will retry next pass");
        MigrationFailure {
            id,
            from,
            to,
            error: error.to_string(),
        }
    }

    /// Demote least-recently-accessed records of `tier` until `excess` moved.
    /// Records in `last` are only taken once everything else is exhausted;
    /// records in `skip` are never taken.
    async fn demote_overflow(
        &self,
        tier: Tier,
        mut records: Vec<Record>,
        excess: usize,
        last: &HashSet<Uuid>,
        skip: &HashSet<Uuid>,
        report: &mut MigrationReport,
    ) -> Vec<Uuid> {
        records.retain(|r| !skip.contains(&r.id));
        records.sort_by(|a, b| {
            last.contains(&a.id)
                .cmp(&last.contains(&b.id))
                .then_with(|| a.last_accessed.cmp(&b.last_accessed))
        });

        let mut moved = Vec::new();
        for record in records {
            if moved.len() == excess {
                break;
            }
            match self.move_record(record.id, Step::Demote { from: tier }).await {
                Ok(Some(_)) => moved.push(record.id),
                Ok(None) => {}
                Err(e) => report
                    .failures
                    .push(Self::failure(record.id, tier, tier.demoted(), &e)),
            }
        }
        moved
    }

    /// Run one full pass
    pub async fn run_pass(&self) -> Result<MigrationReport> {
        let core = &self.core;
        let tiers = &core.config.tiers;
        let now = core.clock.now();
        let mut report = MigrationReport::default();

        let mut promoted = HashSet::new();
        let mut entered_warm = HashSet::new();

        for id in core
            .access
            .promotion_candidates(now, tiers.promotion_window(), tiers.promotion_threshold)
        {
            match self.move_record(id, Step::Promote).await {
                Ok(Some((_, to))) => {
                    report.promoted += 1;
                    promoted.insert(id);
                    if to == Tier::Warm {
                        entered_warm.insert(id);
                    }
                    core.access.reset(id);
                }
                Ok(None) => core.access.reset(id),
                Err(e) => {
                    let from = core.index.tier_of(id).unwrap_or(Tier::Cold);
                    report
                        .failures
                        .push(Self::failure(id, from, from.promoted(), &e));
                }
            }
        }

        let hot = collect_tier(core.store.as_ref(), Tier::Hot).await?;
        let excess = hot.len().saturating_sub(tiers.hot_capacity);
        if excess > 0 {
            let moved = self
                .demote_overflow(Tier::Hot, hot, excess, &promoted, &HashSet::new(), &mut report)
                .await;
            report.demoted_to_warm = moved.len();
            entered_warm.extend(moved);
        }

        let warm = collect_tier(core.store.as_ref(), Tier::Warm).await?;
        let excess = warm.len().saturating_sub(tiers.warm_capacity);
        if excess > 0 {
            let moved = self
                .demote_overflow(Tier::Warm, warm, excess, &HashSet::new(), &entered_warm, &mut report)
                .await;
            report.demoted_to_cold = moved.len();
        }

        self.reconcile(&mut report).await?;
        self.sweep_retention(&mut report).await?;

        core.locks.prune();

        if report.is_noop() {
            debug!("Migration pass made no changes");
        } else {
            info!(
                promoted = report.promoted,
                demoted_to_warm = report.demoted_to_warm,
                demoted_to_cold = report.demoted_to_cold,
                reindexed = report.reindexed,
                removed_from_index = report.removed_from_index,
                expired = report.expired,
                failures = report.failures.len(),
                "Migration pass complete"
            );
        }
        Ok(report)
    }

    /// Re-index Hot/Warm records missing from the index and drop index
    /// entries without a Hot/Warm record behind them
    async fn reconcile(&self, report: &mut MigrationReport) -> Result<()> {
        let core = &self.core;
        let mut live = HashSet::new();
        let mut suspects = Vec::new();

        for tier in [Tier::Hot, Tier::Warm] {
            for record in collect_tier(core.store.as_ref(), tier).await? {
                if core.index.tier_of(record.id) != Some(record.tier) {
                    suspects.push(record.id);
                }
                live.insert(record.id);
            }
        }
        suspects.extend(core.index.ids().into_iter().filter(|id| !live.contains(id)));

        for id in suspects {
            match core.repair_index(id).await {
                Ok((_, Repair::Reindexed)) => report.reindexed += 1,
                Ok((_, Repair::Removed)) => report.removed_from_index += 1,
                Ok((_, Repair::Consistent)) => {}
                Err(e) => warn!(%id, error = %e, "Index reconcile failed"),
            }
        }
        Ok(())
    }

    async fn sweep_retention(&self, report: &mut MigrationReport) -> Result<()> {
        let core = &self.core;
        let Some(retention) = core.config.tiers.retention() else {
            return Ok(());
        };

        let cutoff = core.clock.now() - retention;
        for record in collect_tier(core.store.as_ref(), Tier::Cold).await? {
            if record.last_accessed >= cutoff {
                continue;
            }
            match core.forget(record.id).await {
                Ok(()) => report.expired += 1,
                Err(TierMemError::NotFound(_)) => {}
                Err(e) => report
                    .failures
                    .push(Self::failure(record.id, Tier::Cold, None, &e)),
            }
        }
        Ok(())
    }

    /// Run passes on every `demotion_interval` tick and whenever a write
    /// signals Hot-tier pressure, until the handle is shut down
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let interval = self.core.config.tiers.demotion_interval();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            info!(
                interval_secs = interval.as_secs(),
                "Migration scheduler started"
            );

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {}
                    _ = self.core.pressure.notified() => {
                        debug!("Hot tier over capacity, running early pass");
                    }
                }

                if let Err(e) = self.run_pass().await {
                    warn!(error = %e, "Migration pass failed");
                }
            }

            info!("Migration scheduler stopped");
        });

        SchedulerHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

pub struct SchedulerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop and wait for an in-flight pass to finish
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, "Migration scheduler task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
