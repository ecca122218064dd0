mod audit;
mod interval;
mod outcome;
mod plan;
mod query;

pub use audit::{audit_intervals, TimelineAudit, TimelineViolation};
pub use interval::{Interval, Neighbors, NewInterval, RecordStatusChange};
pub use outcome::{DeletionOutcome, StatusChange, StatusPointerUpdate};
pub use plan::{DeletionPlan, EndsAtRepair};
pub use query::TimelineQuery;
