use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{EndsAtRepair, Interval};

/// New value of a monitor's "current status" field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPointerUpdate {
    pub monitor_id: Uuid,
    pub status_id: Uuid,
}

/// Result of recording a status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub interval: Interval,
    /// Interval that was open before this change and is now closed.
    pub closed_prior: Option<Uuid>,
    pub pointer: StatusPointerUpdate,
}

/// Result of deleting an interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionOutcome {
    pub deleted: Interval,
    pub repair: Option<EndsAtRepair>,
    /// `None` only when no remaining interval carries a status.
    pub pointer: Option<StatusPointerUpdate>,
}
