use std::time::{Duration, Instant};

use async_trait::async_trait;
use statusline_core::db::DatabasePool;
use statusline_core::errors::{Result, StatusLineError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{LockProvider, LockToken};

const MAX_POLL_INTERVAL: Duration = Duration::from_millis(500);
const MIN_RENEW_INTERVAL: Duration = Duration::from_millis(10);

/// Background task extending a held lease every third of its TTL. Dropping
/// it stops the renewals.
#[derive(Debug)]
pub(crate) struct LeaseRenewal {
    task: JoinHandle<()>,
}

impl Drop for LeaseRenewal {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn renew(pool: &DatabasePool, key: &str, lease_id: Uuid, ttl: Duration) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE monitor_locks
        SET expires_at = clock_timestamp() + make_interval(secs => $3)
        WHERE key = $1 AND lease_id = $2
        "#,
    )
    .bind(key)
    .bind(lease_id)
    .bind(ttl.as_secs_f64())
    .execute(pool.inner())
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Distributed lock provider storing time-bounded leases in `monitor_locks`.
///
/// A lease row can be taken over only once its `expires_at` has passed, so
/// a holder that crashed frees its key after `lease_ttl`. While a token is
/// alive its lease is renewed, so operations may outlast the TTL. The table
/// is created by the timeline store migrations.
#[derive(Clone)]
pub struct PgLeaseLockProvider {
    pool: DatabasePool,
    lease_ttl: Duration,
    timeout: Duration,
    poll_interval: Duration,
}

impl PgLeaseLockProvider {
    pub fn new(pool: DatabasePool, lease_ttl: Duration, timeout: Duration) -> Self {
        Self {
            pool,
            lease_ttl,
            timeout,
            poll_interval: Duration::from_millis(25),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn try_acquire(&self, key: &str, lease_id: Uuid) -> Result<bool> {
        let acquired: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO monitor_locks (key, lease_id, acquired_at, expires_at)
            VALUES ($1, $2, clock_timestamp(), clock_timestamp() + make_interval(secs => $3))
            ON CONFLICT (key) DO UPDATE
            SET lease_id = EXCLUDED.lease_id,
                acquired_at = EXCLUDED.acquired_at,
                expires_at = EXCLUDED.expires_at
            WHERE monitor_locks.expires_at <= clock_timestamp()
            RETURNING lease_id
            "#,
        )
        .bind(key)
        .bind(lease_id)
        .bind(self.lease_ttl.as_secs_f64())
        .fetch_optional(self.pool.inner())
        .await?;

        Ok(acquired == Some(lease_id))
    }

    fn spawn_renewal(&self, key: &str, lease_id: Uuid) -> LeaseRenewal {
        let pool = self.pool.clone();
        let key = key.to_string();
        let ttl = self.lease_ttl;
        let every = (ttl / 3).max(MIN_RENEW_INTERVAL);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            loop {
                ticker.tick().await;
                match renew(&pool, &key, lease_id, ttl).await {
                    Ok(true) => debug!(key = %key, %lease_id, "lease renewed"),
                    Ok(false) => {
                        warn!(key = %key, %lease_id, "lease lost before renewal");
                        break;
                    }
                    Err(err) => {
                        warn!(key = %key, %lease_id, error = %err, "lease renewal failed")
                    }
                }
            }
        });

        LeaseRenewal { task }
    }
}

#[async_trait]
impl LockProvider for PgLeaseLockProvider {
    async fn lock(&self, key: &str) -> Result<LockToken> {
        let lease_id = Uuid::new_v4();
        let started = Instant::now();
        let mut backoff = self.poll_interval;

        loop {
            if self.try_acquire(key, lease_id).await? {
                debug!(
                    key,
                    %lease_id,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "lease acquired"
                );
                let renewal = self.spawn_renewal(key, lease_id);
                return Ok(LockToken::leased(key, lease_id, Some(renewal)));
            }

            let waited = started.elapsed();
            if waited >= self.timeout {
                return Err(StatusLineError::LockTimeout {
                    key: key.to_string(),
                    waited_ms: waited.as_millis() as u64,
                });
            }

            tokio::time::sleep(backoff.min(self.timeout - waited)).await;
            backoff = (backoff * 2).min(MAX_POLL_INTERVAL);
        }
    }

    async fn release(&self, mut token: LockToken) -> Result<()> {
        drop(token.renewal.take());
        let result = sqlx::query("DELETE FROM monitor_locks WHERE key = $1 AND lease_id = $2")
            .bind(token.key())
            .bind(token.lease_id())
            .execute(self.pool.inner())
            .await?;

        if result.rows_affected() == 0 {
            warn!(
                key = token.key(),
                lease_id = %token.lease_id(),
                held_ms = token.held_for().as_millis() as u64,
                "lease expired before release"
            );
            return Err(StatusLineError::Lock(format!(
                "lease {} on {} expired before release",
                token.lease_id(),
                token.key()
            )));
        }

        Ok(())
    }
}
