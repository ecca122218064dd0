use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Interval, Neighbors};

/// New `ends_at` for an interval; `None` reopens it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndsAtRepair {
    pub interval_id: Uuid,
    pub ends_at: Option<DateTime<Utc>>,
}

/// Everything a store must apply, atomically if it can, to delete an interval
/// without leaving a hole in the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionPlan {
    pub target: Uuid,
    pub repair: Option<EndsAtRepair>,
}

impl DeletionPlan {
    /// Re-links the target's neighbours.
    ///
    /// The before-neighbour absorbs the target's span: it ends where the
    /// after-neighbour starts, or becomes open when nothing follows. Without
    /// a before-neighbour the after-neighbour already starts the sequence.
    pub fn restitch(target: &Interval, neighbors: &Neighbors) -> Self {
        let repair = neighbors.before.as_ref().map(|before| EndsAtRepair {
            interval_id: before.id,
            ends_at: neighbors.after.as_ref().map(|after| after.starts_at),
        });

        Self {
            target: target.id,
            repair,
        }
    }
}
