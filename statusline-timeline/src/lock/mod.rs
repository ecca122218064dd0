//! Named mutual exclusion used to serialize writes to one monitor's timeline.

mod memory;
mod postgres;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use statusline_core::errors::Result;
use uuid::Uuid;

use memory::HeldSlot;
use postgres::LeaseRenewal;

pub use memory::MemoryLockProvider;
pub use postgres::PgLeaseLockProvider;

/// Proof of holding the lock for `key`.
///
/// Hand it back through [`LockProvider::release`]. Dropping an in-process
/// token also frees the lock and its slot. Dropping a leased token stops
/// renewing the lease, which then expires after its TTL, so a panicking or
/// cancelled holder cannot wedge the key.
#[derive(Debug)]
pub struct LockToken {
    key: String,
    lease_id: Uuid,
    acquired_at: Instant,
    slot: Option<HeldSlot>,
    renewal: Option<LeaseRenewal>,
}

impl LockToken {
    pub(crate) fn guarded(key: &str, slot: HeldSlot) -> Self {
        Self {
            key: key.to_string(),
            lease_id: Uuid::new_v4(),
            acquired_at: Instant::now(),
            slot: Some(slot),
            renewal: None,
        }
    }

    pub(crate) fn leased(key: &str, lease_id: Uuid, renewal: Option<LeaseRenewal>) -> Self {
        Self {
            key: key.to_string(),
            lease_id,
            acquired_at: Instant::now(),
            slot: None,
            renewal,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn lease_id(&self) -> Uuid {
        self.lease_id
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

/// Blocking, non re-entrant lock keyed by arbitrary strings.
///
/// `lock` waits at most the provider's configured timeout and then fails
/// with `StatusLineError::LockTimeout`.
#[async_trait]
pub trait LockProvider: Send + Sync {
    async fn lock(&self, key: &str) -> Result<LockToken>;

    async fn release(&self, token: LockToken) -> Result<()>;
}
