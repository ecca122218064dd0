//! Persistence seam for interval records.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use statusline_core::errors::Result;
use statusline_protocol::timeline::{DeletionPlan, Interval, Neighbors, NewInterval};
use tracing::warn;
use uuid::Uuid;

pub use memory::MemoryTimelineStore;
pub use postgres::{migrate, PgTimelineStore};

/// Durable, ordered collection of status intervals.
///
/// "Latest" always means most recently created (`created_at`, then insertion
/// order), never most recently started.
#[async_trait]
pub trait TimelineStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Interval>>;

    async fn find_latest(&self, monitor_id: Uuid) -> Result<Option<Interval>>;

    /// Closest intervals strictly before and strictly after `starts_at`.
    ///
    /// Before: greatest `starts_at`, ties to the greatest `created_at`.
    /// After: smallest `starts_at`, ties to the smallest `created_at`.
    async fn find_neighbors(
        &self,
        monitor_id: Uuid,
        starts_at: DateTime<Utc>,
    ) -> Result<Neighbors>;

    /// Inserts an open interval, assigning `id` and a strictly increasing `created_at`.
    async fn insert(&self, interval: NewInterval) -> Result<Interval>;

    async fn update_ends_at(&self, id: Uuid, ends_at: Option<DateTime<Utc>>) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<()>;

    async fn count(&self, monitor_id: Uuid) -> Result<u64>;

    /// All intervals of a monitor ordered by `starts_at`, then `created_at`.
    async fn list_for_monitor(&self, monitor_id: Uuid) -> Result<Vec<Interval>>;

    /// Hard-deletes closed intervals whose `ends_at` is older than `cutoff`.
    async fn purge_closed_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Inserts `interval` and closes `close` at the new record's `created_at`.
    ///
    /// If closing fails the new record is deleted again before the error is
    /// returned. Backings with transactions override this to commit both
    /// writes together.
    async fn append(&self, interval: NewInterval, close: Option<Uuid>) -> Result<Interval> {
        let created = self.insert(interval).await?;

        if let Some(prior) = close {
            if let Err(err) = self.update_ends_at(prior, Some(created.created_at)).await {
                if let Err(cleanup) = self.delete(created.id).await {
                    warn!(
                        interval_id = %created.id,
                        error = %cleanup,
                        "failed to remove interval after prior close-out failed"
                    );
                }
                return Err(err);
            }
        }

        Ok(created)
    }

    /// Applies the neighbour repair of `plan`, then deletes its target.
    async fn apply_deletion(&self, plan: &DeletionPlan) -> Result<()> {
        if let Some(repair) = plan.repair {
            self.update_ends_at(repair.interval_id, repair.ends_at).await?;
        }
        self.delete(plan.target).await
    }
}
