use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A span of time during which a monitor held a single status.
///
/// `ends_at == None` marks the open interval, i.e. the monitor's current
/// status. `created_at` is assigned by the store and is the authoritative
/// "most recent" key; `starts_at` only orders the visible timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub id: Uuid,
    pub monitor_id: Uuid,
    pub status_id: Uuid,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_user_id: Option<Uuid>,
}

impl Interval {
    pub fn is_open(&self) -> bool {
        self.ends_at.is_none()
    }

    /// Order used when presenting a timeline: `starts_at`, then `created_at`.
    pub fn timeline_cmp(&self, other: &Self) -> Ordering {
        self.starts_at
            .cmp(&other.starts_at)
            .then_with(|| self.created_at.cmp(&other.created_at))
    }
}

/// Interval fields supplied by the engine; the store assigns `id` and `created_at`.
///
/// A missing `starts_at` resolves to the record's `created_at`, so a
/// defaulted start coincides exactly with the instant the prior interval is
/// closed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInterval {
    pub monitor_id: Uuid,
    pub status_id: Uuid,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub root_cause: Option<String>,
    #[serde(default)]
    pub created_by_user_id: Option<Uuid>,
}

impl NewInterval {
    /// Materialises the record as an open interval.
    pub fn into_interval(self, id: Uuid, created_at: DateTime<Utc>) -> Interval {
        Interval {
            id,
            monitor_id: self.monitor_id,
            status_id: self.status_id,
            starts_at: self.starts_at.unwrap_or(created_at),
            ends_at: None,
            created_at,
            root_cause: self.root_cause,
            created_by_user_id: self.created_by_user_id,
        }
    }
}

/// The intervals adjacent to a point of a monitor's timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Neighbors {
    pub before: Option<Interval>,
    pub after: Option<Interval>,
}

/// Inbound request to record a monitor's new status.
///
/// Identifiers are optional because requests arrive from the wire; the
/// engine rejects a request missing either of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStatusChange {
    #[serde(default)]
    pub monitor_id: Option<Uuid>,
    #[serde(default)]
    pub status_id: Option<Uuid>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub root_cause: Option<String>,
    #[serde(default)]
    pub created_by_user_id: Option<Uuid>,
    /// Authenticated caller on whose behalf the change is recorded.
    #[serde(default)]
    pub actor: Option<Uuid>,
}

impl RecordStatusChange {
    pub fn new(monitor_id: Uuid, status_id: Uuid) -> Self {
        Self {
            monitor_id: Some(monitor_id),
            status_id: Some(status_id),
            ..Self::default()
        }
    }

    pub fn starts_at(mut self, starts_at: DateTime<Utc>) -> Self {
        self.starts_at = Some(starts_at);
        self
    }

    pub fn root_cause(mut self, root_cause: impl Into<String>) -> Self {
        self.root_cause = Some(root_cause.into());
        self
    }

    pub fn created_by(mut self, user_id: Uuid) -> Self {
        self.created_by_user_id = Some(user_id);
        self
    }

    pub fn actor(mut self, user_id: Uuid) -> Self {
        self.actor = Some(user_id);
        self
    }

    /// The user that triggered the change: the caller wins over the stored creator.
    pub fn initiating_user(&self) -> Option<Uuid> {
        self.actor.or(self.created_by_user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn interval(starts: u32, created: u32) -> Interval {
        NewInterval {
            monitor_id: Uuid::nil(),
            status_id: Uuid::nil(),
            starts_at: Some(at(starts)),
            root_cause: None,
            created_by_user_id: None,
        }
        .into_interval(Uuid::new_v4(), at(created))
    }

    #[test]
    fn missing_start_resolves_to_creation_time() {
        let interval = NewInterval {
            monitor_id: Uuid::nil(),
            status_id: Uuid::nil(),
            starts_at: None,
            root_cause: None,
            created_by_user_id: None,
        }
        .into_interval(Uuid::new_v4(), at(9));
        assert_eq!(interval.starts_at, at(9));
        assert!(interval.is_open());
    }

    #[test]
    fn timeline_order_breaks_ties_on_created_at() {
        let early = interval(10, 11);
        let late = interval(10, 12);
        assert_eq!(early.timeline_cmp(&late), Ordering::Less);
        assert_eq!(interval(9, 23).timeline_cmp(&early), Ordering::Less);
    }

    #[test]
    fn caller_wins_over_stored_creator() {
        let creator = Uuid::new_v4();
        let caller = Uuid::new_v4();
        let request = RecordStatusChange::new(Uuid::new_v4(), Uuid::new_v4()).created_by(creator);
        assert_eq!(request.initiating_user(), Some(creator));
        assert_eq!(request.actor(caller).initiating_user(), Some(caller));
    }

    #[test]
    fn request_tolerates_missing_identifiers() {
        let request: RecordStatusChange =
            serde_json::from_value(serde_json::json!({ "root_cause": "maintenance" })).unwrap();
        assert!(request.monitor_id.is_none());
        assert_eq!(request.root_cause.as_deref(), Some("maintenance"));
    }
}
