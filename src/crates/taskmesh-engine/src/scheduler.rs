//! Scheduled-action worker
//!
//! Drains the persistent queue of deferred work: deadline reminders and
//! delayed dependency actions. A tick claims due `pending` rows (the claim
//! marks them `processing` in the same store transaction), dispatches each
//! through the engine, and records the terminal status with `executed_at`.
//! Rows stranded in `processing` by a crash or cancellation are swept back
//! to `pending` by the reaper after a configurable bound.

use crate::config::SchedulerConfig;
use crate::engine::TaskEngine;
use crate::models::{ScheduledKind, ScheduledStatus};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Result of dispatching one claimed row
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub scheduled_id: i64,
    pub kind: ScheduledKind,
    pub status: ScheduledStatus,
    pub error: Option<String>,
}

/// Background worker over the scheduled-action queue.
pub struct Scheduler {
    engine: Arc<TaskEngine>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(engine: Arc<TaskEngine>) -> Self {
        Self::with_config(engine, SchedulerConfig::default())
    }

    pub fn with_config(engine: Arc<TaskEngine>, config: SchedulerConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run ticks until `shutdown` flips to true or the sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval = ?self.config.tick_interval, "scheduler worker started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let reaped = self.reap_stale().await;
                    if reaped > 0 {
                        warn!(reaped, "requeued stale processing rows");
                    }
                    let outcomes = self.tick().await;
                    if !outcomes.is_empty() {
                        debug!(processed = outcomes.len(), "tick complete");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler worker stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One drain pass: claim due rows, dispatch, record outcomes.
    ///
    /// Exposed so tests (and deployments without a resident worker) can
    /// drive the queue deterministically.
    pub async fn tick(&self) -> Vec<TickOutcome> {
        let store = self.engine.store();
        let clock = self.engine.clock();

        let claimed = match store.claim_due(clock.now(), self.config.batch_size).await {
            Ok(rows) => rows,
            Err(err) => {
                error!(error = %err, "failed to claim due scheduled actions");
                return Vec::new();
            }
        };

        let mut outcomes = Vec::with_capacity(claimed.len());
        for row in claimed {
            let (status, payload, error) = match self.engine.execute_scheduled(&row).await {
                Ok(payload) => (ScheduledStatus::Completed, Some(payload), None),
                Err(err) => {
                    warn!(
                        scheduled_id = row.id,
                        kind = %row.kind,
                        error = %err,
                        "scheduled action failed"
                    );
                    (ScheduledStatus::Failed, None, Some(err.to_string()))
                }
            };

            if let Err(err) = store
                .finish_scheduled(row.id, status, clock.now(), payload)
                .await
            {
                error!(scheduled_id = row.id, error = %err, "failed to record outcome");
            }

            outcomes.push(TickOutcome {
                scheduled_id: row.id,
                kind: row.kind,
                status,
                error,
            });
        }
        outcomes
    }

    /// Sweep `processing` rows older than the configured bound back to
    /// `pending`; returns how many were requeued.
    pub async fn reap_stale(&self) -> u64 {
        let store = self.engine.store();
        let clock = self.engine.clock();
        let bound = clock.now()
            - chrono::Duration::from_std(self.config.stale_after)
                .unwrap_or_else(|_| chrono::Duration::seconds(600));
        match store.requeue_stale(bound).await {
            Ok(count) => count,
            Err(err) => {
                error!(error = %err, "reaper sweep failed");
                0
            }
        }
    }
}
