//! Timeline engine: keeps each monitor's status intervals contiguous with
//! exactly one open interval, under concurrent writers.

use std::sync::Arc;
use std::time::Duration;

use statusline_core::errors::{Result, StatusLineError};
use statusline_protocol::timeline::{
    audit_intervals, DeletionOutcome, DeletionPlan, Interval, NewInterval, RecordStatusChange,
    StatusChange, StatusPointerUpdate, TimelineAudit,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::directory::ActorDirectory;
use crate::lock::{LockProvider, LockToken};
use crate::pointer::StatusPointerSink;
use crate::store::TimelineStore;

const ONLY_TIMELINE: &str =
    "Cannot delete the only status timeline. Monitor should have at least one status timeline.";

fn lock_key(monitor_id: Uuid) -> String {
    monitor_id.to_string()
}

/// Orchestrates interval creation and deletion.
///
/// Every write for a monitor runs under that monitor's lock, so creations
/// and deletions of one monitor are fully serialized while different
/// monitors proceed independently.
#[derive(Clone)]
pub struct TimelineEngine {
    store: Arc<dyn TimelineStore>,
    locks: Arc<dyn LockProvider>,
    pointer: Arc<dyn StatusPointerSink>,
    directory: Option<Arc<dyn ActorDirectory>>,
    annotation_timeout: Duration,
}

/// Builder for [`TimelineEngine`]; the directory is optional.
pub struct TimelineEngineBuilder {
    engine: TimelineEngine,
}

impl TimelineEngineBuilder {
    pub fn directory(mut self, directory: Arc<dyn ActorDirectory>) -> Self {
        self.engine.directory = Some(directory);
        self
    }

    pub fn annotation_timeout(mut self, timeout: Duration) -> Self {
        self.engine.annotation_timeout = timeout;
        self
    }

    pub fn build(self) -> TimelineEngine {
        self.engine
    }
}

impl TimelineEngine {
    pub fn builder(
        store: Arc<dyn TimelineStore>,
        locks: Arc<dyn LockProvider>,
        pointer: Arc<dyn StatusPointerSink>,
    ) -> TimelineEngineBuilder {
        TimelineEngineBuilder {
            engine: TimelineEngine {
                store,
                locks,
                pointer,
                directory: None,
                annotation_timeout: Duration::from_secs(2),
            },
        }
    }

    pub fn store(&self) -> &Arc<dyn TimelineStore> {
        &self.store
    }

    /// Opens a new interval for the monitor and closes the previous one.
    ///
    /// The previous interval is the most recently *created* one and is closed
    /// at the new interval's `created_at`.
    #[instrument(skip_all, fields(monitor_id = ?request.monitor_id))]
    pub async fn record_status_change(&self, request: RecordStatusChange) -> Result<StatusChange> {
        let monitor_id = request
            .monitor_id
            .ok_or_else(|| StatusLineError::validation("monitorId is null"))?;
        let status_id = request
            .status_id
            .ok_or_else(|| StatusLineError::validation("monitorStatusId is null"))?;

        let token = self.locks.lock(&lock_key(monitor_id)).await?;
        let outcome = self.record_locked(monitor_id, status_id, request).await;
        self.finish(token, outcome).await
    }

    async fn record_locked(
        &self,
        monitor_id: Uuid,
        status_id: Uuid,
        request: RecordStatusChange,
    ) -> Result<StatusChange> {
        let root_cause = match request.root_cause.clone() {
            Some(root_cause) => Some(root_cause),
            None => self.annotate(&request).await,
        };

        let prior = self.store.find_latest(monitor_id).await?;
        let closed_prior = prior.map(|interval| interval.id);

        let interval = self
            .store
            .append(
                NewInterval {
                    monitor_id,
                    status_id,
                    starts_at: request.starts_at,
                    root_cause,
                    created_by_user_id: request.created_by_user_id,
                },
                closed_prior,
            )
            .await?;

        let pointer = StatusPointerUpdate {
            monitor_id,
            status_id: interval.status_id,
        };
        self.pointer.set_current_status(pointer).await?;

        info!(
            %monitor_id,
            %status_id,
            interval_id = %interval.id,
            closed_prior = ?closed_prior,
            "status change recorded"
        );

        Ok(StatusChange {
            interval,
            closed_prior,
            pointer,
        })
    }

    /// Resolves the initiating user into root-cause text. Never fails: a
    /// missing directory, unknown user, lookup error or slow lookup all
    /// yield `None`.
    async fn annotate(&self, request: &RecordStatusChange) -> Option<String> {
        let user_id = request.initiating_user()?;
        let directory = self.directory.as_ref()?;

        match tokio::time::timeout(self.annotation_timeout, directory.resolve(user_id)).await {
            Ok(Ok(Some(actor))) => Some(actor.root_cause()),
            Ok(Ok(None)) => {
                debug!(%user_id, "initiating user not found; no root cause recorded");
                None
            }
            Ok(Err(err)) => {
                warn!(%user_id, error = %err, "actor lookup failed; no root cause recorded");
                None
            }
            Err(_) => {
                warn!(%user_id, "actor lookup timed out; no root cause recorded");
                None
            }
        }
    }

    /// Deletes an interval and re-links its neighbours.
    ///
    /// The monitor's last remaining interval cannot be deleted.
    #[instrument(skip(self))]
    pub async fn delete_interval(&self, id: Uuid) -> Result<DeletionOutcome> {
        let target = self.get(id).await?;

        let token = self.locks.lock(&lock_key(target.monitor_id)).await?;
        let outcome = self.delete_locked(id).await;
        self.finish(token, outcome).await
    }

    async fn delete_locked(&self, id: Uuid) -> Result<DeletionOutcome> {
        // Re-read under the lock: a concurrent writer may have removed it.
        let target = self.get(id).await?;
        let monitor_id = target.monitor_id;

        if self.store.count(monitor_id).await? <= 1 {
            return Err(StatusLineError::validation(ONLY_TIMELINE));
        }

        let neighbors = self
            .store
            .find_neighbors(monitor_id, target.starts_at)
            .await?;
        let plan = DeletionPlan::restitch(&target, &neighbors);
        self.store.apply_deletion(&plan).await?;

        let pointer = match self.store.find_latest(monitor_id).await? {
            Some(latest) => {
                let update = StatusPointerUpdate {
                    monitor_id,
                    status_id: latest.status_id,
                };
                self.pointer.set_current_status(update).await?;
                Some(update)
            }
            None => None,
        };

        info!(
            %monitor_id,
            interval_id = %id,
            repair = ?plan.repair,
            "status timeline deleted"
        );

        Ok(DeletionOutcome {
            deleted: target,
            repair: plan.repair,
            pointer,
        })
    }

    /// Releases `token` whatever `outcome` was. The operation's own error
    /// takes precedence over a release failure.
    async fn finish<T>(&self, token: LockToken, outcome: Result<T>) -> Result<T> {
        let key = token.key().to_string();
        let released = self.locks.release(token).await;

        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                warn!(%key, error = %release_err, "lock release failed after operation error");
                Err(err)
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Interval> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| StatusLineError::not_found(format!("status timeline {id}")))
    }

    /// The monitor's intervals by `starts_at`, then `created_at`.
    pub async fn timeline(&self, monitor_id: Uuid) -> Result<Vec<Interval>> {
        self.store.list_for_monitor(monitor_id).await
    }

    /// The most recently created interval, which carries the current status.
    pub async fn current(&self, monitor_id: Uuid) -> Result<Option<Interval>> {
        self.store.find_latest(monitor_id).await
    }

    /// Read-only consistency check of one monitor's timeline.
    pub async fn audit(&self, monitor_id: Uuid) -> Result<TimelineAudit> {
        let intervals = self.store.list_for_monitor(monitor_id).await?;
        let audit = audit_intervals(&intervals);
        if !audit.is_consistent() {
            warn!(%monitor_id, violations = audit.violations.len(), "inconsistent status timeline");
        }
        Ok(audit)
    }
}
