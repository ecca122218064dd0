//! The monitor's denormalised "current status" field.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use statusline_core::db::DatabasePool;
use statusline_core::errors::{Result, StatusLineError};
use statusline_protocol::timeline::StatusPointerUpdate;
use uuid::Uuid;

/// Applies pointer updates produced by the engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusPointerSink: Send + Sync {
    async fn set_current_status(&self, update: StatusPointerUpdate) -> Result<()>;
}

/// In-memory pointer table.
#[derive(Default, Clone)]
pub struct MemoryStatusBoard {
    current: Arc<RwLock<HashMap<Uuid, Uuid>>>,
}

impl MemoryStatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, monitor_id: Uuid) -> Option<Uuid> {
        self.current.read().get(&monitor_id).copied()
    }
}

#[async_trait]
impl StatusPointerSink for MemoryStatusBoard {
    async fn set_current_status(&self, update: StatusPointerUpdate) -> Result<()> {
        self.current.write().insert(update.monitor_id, update.status_id);
        Ok(())
    }
}

/// Writes `monitors.current_status_id`. The `monitors` table belongs to the
/// surrounding platform; an unknown monitor is reported as not found.
#[derive(Clone)]
pub struct PgStatusPointer {
    pool: DatabasePool,
}

impl PgStatusPointer {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusPointerSink for PgStatusPointer {
    async fn set_current_status(&self, update: StatusPointerUpdate) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE monitors
            SET current_status_id = $2, updated_at = clock_timestamp()
            WHERE id = $1
            "#,
        )
        .bind(update.monitor_id)
        .bind(update.status_id)
        .execute(self.pool.inner())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StatusLineError::not_found(format!("monitor {}", update.monitor_id)));
        }
        Ok(())
    }
}
