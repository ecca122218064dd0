use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Interval;

/// A broken timeline invariant found by [`audit_intervals`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineViolation {
    NoOpenInterval,
    MultipleOpen {
        interval_ids: Vec<Uuid>,
    },
    OpenNotLast {
        interval_id: Uuid,
    },
    Gap {
        before: Uuid,
        after: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    Overlap {
        before: Uuid,
        after: Uuid,
        ends_at: DateTime<Utc>,
        next_starts_at: DateTime<Utc>,
    },
}

/// Consistency report for one monitor's timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineAudit {
    pub interval_count: usize,
    pub open_interval: Option<Uuid>,
    pub violations: Vec<TimelineViolation>,
}

impl TimelineAudit {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Checks the single-open-interval and contiguity invariants.
///
/// Input order does not matter; intervals are walked by `starts_at`, then
/// `created_at`. An empty slice is consistent.
pub fn audit_intervals(intervals: &[Interval]) -> TimelineAudit {
    let mut ordered: Vec<&Interval> = intervals.iter().collect();
    ordered.sort_by(|a, b| a.timeline_cmp(b));

    let open: Vec<Uuid> = ordered
        .iter()
        .filter(|interval| interval.is_open())
        .map(|interval| interval.id)
        .collect();

    let mut violations = Vec::new();
    match open.len() {
        0 if !ordered.is_empty() => violations.push(TimelineViolation::NoOpenInterval),
        0 | 1 => {}
        _ => violations.push(TimelineViolation::MultipleOpen {
            interval_ids: open.clone(),
        }),
    }

    for pair in ordered.windows(2) {
        let (current, next) = (pair[0], pair[1]);
        match current.ends_at {
            None => violations.push(TimelineViolation::OpenNotLast {
                interval_id: current.id,
            }),
            Some(ends_at) if ends_at < next.starts_at => violations.push(TimelineViolation::Gap {
                before: current.id,
                after: next.id,
                from: ends_at,
                to: next.starts_at,
            }),
            Some(ends_at) if ends_at > next.starts_at => {
                violations.push(TimelineViolation::Overlap {
                    before: current.id,
                    after: next.id,
                    ends_at,
                    next_starts_at: next.starts_at,
                })
            }
            Some(_) => {}
        }
    }

    TimelineAudit {
        interval_count: ordered.len(),
        open_interval: (open.len() == 1).then(|| open[0]),
        violations,
    }
}
