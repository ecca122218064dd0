//! Monitor status timelines: per-monitor sequences of contiguous intervals
//! with exactly one open interval, kept consistent under concurrent writers.

pub mod api;
pub mod config;
pub mod directory;
pub mod engine;
pub mod lock;
pub mod pointer;
pub mod retention;
pub mod store;

pub use api::{TimelineApiBuilder, TimelineServerHandle, ACTOR_HEADER};
pub use config::{Backend, TimelineConfig};
pub use directory::{Actor, ActorDirectory, PgActorDirectory, StaticDirectory};
pub use engine::{TimelineEngine, TimelineEngineBuilder};
pub use lock::{LockProvider, LockToken, MemoryLockProvider, PgLeaseLockProvider};
pub use pointer::{MemoryStatusBoard, PgStatusPointer, StatusPointerSink};
pub use retention::{RetentionHandle, RetentionSweeper};
pub use store::{MemoryTimelineStore, PgTimelineStore, TimelineStore};
