//! Statusline: monitor status timelines.
//!
//! Each monitor owns a sequence of status intervals that must stay
//! contiguous, with exactly one open interval carrying the current status.
//!
//! # Crates
//!
//! * `statusline-core`: configuration, errors, logging and the Postgres pool
//! * `statusline-protocol`: interval types, deletion plans and timeline audits
//! * `statusline-timeline`: the engine, its stores, locks and HTTP service

pub use statusline_core::{CoreResult, StatusLineError};
pub use statusline_protocol::timeline::{
    DeletionOutcome, Interval, RecordStatusChange, StatusChange, StatusPointerUpdate,
    TimelineAudit,
};
pub use statusline_timeline::{TimelineEngine, TimelineStore};

pub use statusline_core as core_support;
pub use statusline_protocol as protocol;
pub use statusline_timeline as timeline;

/// Version of the timeline wire format.
pub const STATUSLINE_PROTOCOL_VERSION: &str = "0.1.0";
