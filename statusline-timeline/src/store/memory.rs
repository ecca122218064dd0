use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use statusline_core::errors::{Result, StatusLineError};
use statusline_protocol::timeline::{DeletionPlan, Interval, Neighbors, NewInterval};
use uuid::Uuid;

use super::TimelineStore;

struct StoredInterval {
    seq: u64,
    interval: Interval,
}

impl StoredInterval {
    fn recency_key(&self) -> (DateTime<Utc>, u64) {
        (self.interval.created_at, self.seq)
    }

    fn start_key(&self) -> (DateTime<Utc>, DateTime<Utc>, u64) {
        (self.interval.starts_at, self.interval.created_at, self.seq)
    }
}

#[derive(Default)]
struct MemoryState {
    intervals: HashMap<Uuid, StoredInterval>,
    next_seq: u64,
    last_created_at: Option<DateTime<Utc>>,
}

impl MemoryState {
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let created_at = match self.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(created_at);
        created_at
    }

    fn for_monitor(&self, monitor_id: Uuid) -> impl Iterator<Item = &StoredInterval> {
        self.intervals
            .values()
            .filter(move |stored| stored.interval.monitor_id == monitor_id)
    }

    fn insert(&mut self, interval: NewInterval) -> Interval {
        let created_at = self.next_created_at();
        let interval = interval.into_interval(Uuid::new_v4(), created_at);
        self.next_seq += 1;
        self.intervals.insert(
            interval.id,
            StoredInterval {
                seq: self.next_seq,
                interval: interval.clone(),
            },
        );
        interval
    }

    fn ensure_exists(&self, id: Uuid) -> Result<()> {
        if self.intervals.contains_key(&id) {
            Ok(())
        } else {
            Err(StatusLineError::not_found(format!("status timeline {id}")))
        }
    }

    fn set_ends_at(&mut self, id: Uuid, ends_at: Option<DateTime<Utc>>) -> Result<()> {
        let stored = self
            .intervals
            .get_mut(&id)
            .ok_or_else(|| StatusLineError::not_found(format!("status timeline {id}")))?;
        stored.interval.ends_at = ends_at;
        Ok(())
    }

    fn remove(&mut self, id: Uuid) -> Result<()> {
        self.intervals
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StatusLineError::not_found(format!("status timeline {id}")))
    }
}

/// In-memory interval store for tests and single-process deployments.
///
/// Every compound operation runs under one write lock, so `append` and
/// `apply_deletion` are atomic here.
#[derive(Default, Clone)]
pub struct MemoryTimelineStore {
    inner: Arc<RwLock<MemoryState>>,
}

impl MemoryTimelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored intervals across all monitors.
    pub fn len(&self) -> usize {
        self.inner.read().intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TimelineStore for MemoryTimelineStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Interval>> {
        let inner = self.inner.read();
        Ok(inner.intervals.get(&id).map(|stored| stored.interval.clone()))
    }

    async fn find_latest(&self, monitor_id: Uuid) -> Result<Option<Interval>> {
        let inner = self.inner.read();
        Ok(inner
            .for_monitor(monitor_id)
            .max_by_key(|stored| stored.recency_key())
            .map(|stored| stored.interval.clone()))
    }

    async fn find_neighbors(
        &self,
        monitor_id: Uuid,
        starts_at: DateTime<Utc>,
    ) -> Result<Neighbors> {
        let inner = self.inner.read();
        let before = inner
            .for_monitor(monitor_id)
            .filter(|stored| stored.interval.starts_at < starts_at)
            .max_by_key(|stored| stored.start_key())
            .map(|stored| stored.interval.clone());
        let after = inner
            .for_monitor(monitor_id)
            .filter(|stored| stored.interval.starts_at > starts_at)
            .min_by_key(|stored| stored.start_key())
            .map(|stored| stored.interval.clone());

        Ok(Neighbors { before, after })
    }

    async fn insert(&self, interval: NewInterval) -> Result<Interval> {
        Ok(self.inner.write().insert(interval))
    }

    async fn update_ends_at(&self, id: Uuid, ends_at: Option<DateTime<Utc>>) -> Result<()> {
        self.inner.write().set_ends_at(id, ends_at)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.inner.write().remove(id)
    }

    async fn count(&self, monitor_id: Uuid) -> Result<u64> {
        Ok(self.inner.read().for_monitor(monitor_id).count() as u64)
    }

    async fn list_for_monitor(&self, monitor_id: Uuid) -> Result<Vec<Interval>> {
        let inner = self.inner.read();
        let mut stored: Vec<&StoredInterval> = inner.for_monitor(monitor_id).collect();
        stored.sort_by_key(|stored| stored.start_key());
        Ok(stored
            .into_iter()
            .map(|stored| stored.interval.clone())
            .collect())
    }

    async fn purge_closed_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.write();
        let before = inner.intervals.len();
        inner.intervals.retain(|_, stored| {
            !stored
                .interval
                .ends_at
                .is_some_and(|ends_at| ends_at < cutoff)
        });
        Ok((before - inner.intervals.len()) as u64)
    }

    async fn append(&self, interval: NewInterval, close: Option<Uuid>) -> Result<Interval> {
        let mut inner = self.inner.write();
        if let Some(prior) = close {
            inner.ensure_exists(prior)?;
        }
        let created = inner.insert(interval);
        if let Some(prior) = close {
            inner.set_ends_at(prior, Some(created.created_at))?;
        }
        Ok(created)
    }

    async fn apply_deletion(&self, plan: &DeletionPlan) -> Result<()> {
        let mut inner = self.inner.write();
        inner.ensure_exists(plan.target)?;
        if let Some(repair) = plan.repair {
            inner.set_ends_at(repair.interval_id, repair.ends_at)?;
        }
        inner.remove(plan.target)
    }
}
