pub mod timeline;

pub mod prelude {
    pub use crate::timeline::{
        audit_intervals, DeletionOutcome, DeletionPlan, EndsAtRepair, Interval, Neighbors,
        NewInterval, RecordStatusChange, StatusChange, StatusPointerUpdate, TimelineAudit,
        TimelineQuery, TimelineViolation,
    };
}
