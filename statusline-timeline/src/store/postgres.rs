use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, Transaction};
use statusline_core::config::CoreConfig;
use statusline_core::db::DatabasePool;
use statusline_core::errors::{Result, StatusLineError};
use statusline_protocol::timeline::{DeletionPlan, Interval, Neighbors, NewInterval};
use uuid::Uuid;

use super::TimelineStore;

const COLUMNS: &str = "id, monitor_id, status_id, starts_at, ends_at, created_at, \
                       root_cause, created_by_user_id";

/// Runs the embedded migrations (interval table and lease table).
pub async fn migrate(pool: &DatabasePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool.inner()).await?;
    Ok(())
}

/// Postgres-backed interval store.
///
/// `created_at` comes from `clock_timestamp()` and `seq` breaks ties between
/// rows created within the same microsecond.
#[derive(Clone)]
pub struct PgTimelineStore {
    pool: DatabasePool,
}

impl PgTimelineStore {
    /// Connects to the database using the supplied configuration and ensures migrations ran.
    pub async fn from_config(config: &CoreConfig) -> Result<Self> {
        let pool = DatabasePool::connect(config).await?;
        Self::from_pool(pool).await
    }

    /// Builds the store from an existing database pool.
    pub async fn from_pool(pool: DatabasePool) -> Result<Self> {
        migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    async fn insert_in(
        tx: &mut Transaction<'_, Postgres>,
        interval: &NewInterval,
    ) -> Result<Interval> {
        let row = sqlx::query_as::<_, IntervalRow>(&format!(
            r#"
            WITH clock AS (SELECT clock_timestamp() AS now)
            INSERT INTO monitor_status_timelines (
                id, monitor_id, status_id, starts_at, root_cause,
                created_by_user_id, created_at, updated_at
            )
            SELECT $1, $2, $3, COALESCE($4, clock.now), $5, $6, clock.now, clock.now
            FROM clock
            RETURNING {COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(interval.monitor_id)
        .bind(interval.status_id)
        .bind(interval.starts_at)
        .bind(&interval.root_cause)
        .bind(interval.created_by_user_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.into())
    }

    async fn set_ends_at_in(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        ends_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE monitor_status_timelines
            SET ends_at = $2, updated_at = clock_timestamp()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(ends_at)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StatusLineError::not_found(format!("status timeline {id}")));
        }
        Ok(())
    }

    async fn delete_in(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM monitor_status_timelines WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StatusLineError::not_found(format!("status timeline {id}")));
        }
        Ok(())
    }

    async fn find_one(
        &self,
        sql: &str,
        monitor_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Interval>> {
        let row = sqlx::query_as::<_, IntervalRow>(sql)
            .bind(monitor_id)
            .bind(at)
            .fetch_optional(self.pool.inner())
            .await?;
        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl TimelineStore for PgTimelineStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Interval>> {
        let row = sqlx::query_as::<_, IntervalRow>(&format!(
            "SELECT {COLUMNS} FROM monitor_status_timelines WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.inner())
        .await?;

        Ok(row.map(Into::into))
    }

    async fn find_latest(&self, monitor_id: Uuid) -> Result<Option<Interval>> {
        let row = sqlx::query_as::<_, IntervalRow>(&format!(
            r#"
            SELECT {COLUMNS} FROM monitor_status_timelines
            WHERE monitor_id = $1
            ORDER BY created_at DESC, seq DESC
            LIMIT 1
            "#
        ))
        .bind(monitor_id)
        .fetch_optional(self.pool.inner())
        .await?;

        Ok(row.map(Into::into))
    }

    async fn find_neighbors(
        &self,
        monitor_id: Uuid,
        starts_at: DateTime<Utc>,
    ) -> Result<Neighbors> {
        let before = self
            .find_one(
                &format!(
                    r#"
                    SELECT {COLUMNS} FROM monitor_status_timelines
                    WHERE monitor_id = $1 AND starts_at < $2
                    ORDER BY starts_at DESC, created_at DESC, seq DESC
                    LIMIT 1
                    "#
                ),
                monitor_id,
                starts_at,
            )
            .await?;
        let after = self
            .find_one(
                &format!(
                    r#"
                    SELECT {COLUMNS} FROM monitor_status_timelines
                    WHERE monitor_id = $1 AND starts_at > $2
                    ORDER BY starts_at ASC, created_at ASC, seq ASC
                    LIMIT 1
                    "#
                ),
                monitor_id,
                starts_at,
            )
            .await?;

        Ok(Neighbors { before, after })
    }

    async fn insert(&self, interval: NewInterval) -> Result<Interval> {
        let mut tx = self.pool.inner().begin().await?;
        let created = Self::insert_in(&mut tx, &interval).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn update_ends_at(&self, id: Uuid, ends_at: Option<DateTime<Utc>>) -> Result<()> {
        let mut tx = self.pool.inner().begin().await?;
        Self::set_ends_at_in(&mut tx, id, ends_at).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.inner().begin().await?;
        Self::delete_in(&mut tx, id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn count(&self, monitor_id: Uuid) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM monitor_status_timelines WHERE monitor_id = $1",
        )
        .bind(monitor_id)
        .fetch_one(self.pool.inner())
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn list_for_monitor(&self, monitor_id: Uuid) -> Result<Vec<Interval>> {
        let rows = sqlx::query_as::<_, IntervalRow>(&format!(
            r#"
            SELECT {COLUMNS} FROM monitor_status_timelines
            WHERE monitor_id = $1
            ORDER BY starts_at ASC, created_at ASC, seq ASC
            "#
        ))
        .bind(monitor_id)
        .fetch_all(self.pool.inner())
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn purge_closed_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM monitor_status_timelines
            WHERE ends_at IS NOT NULL AND ends_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(self.pool.inner())
        .await?;

        Ok(result.rows_affected())
    }

    async fn append(&self, interval: NewInterval, close: Option<Uuid>) -> Result<Interval> {
        let mut tx = self.pool.inner().begin().await?;
        let created = Self::insert_in(&mut tx, &interval).await?;
        if let Some(prior) = close {
            Self::set_ends_at_in(&mut tx, prior, Some(created.created_at)).await?;
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn apply_deletion(&self, plan: &DeletionPlan) -> Result<()> {
        let mut tx = self.pool.inner().begin().await?;
        if let Some(repair) = plan.repair {
            Self::set_ends_at_in(&mut tx, repair.interval_id, repair.ends_at).await?;
        }
        Self::delete_in(&mut tx, plan.target).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[derive(FromRow)]
struct IntervalRow {
    id: Uuid,
    monitor_id: Uuid,
    status_id: Uuid,
    starts_at: DateTime<Utc>,
    ends_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    root_cause: Option<String>,
    created_by_user_id: Option<Uuid>,
}

impl From<IntervalRow> for Interval {
    fn from(row: IntervalRow) -> Self {
        Interval {
            id: row.id,
            monitor_id: row.monitor_id,
            status_id: row.status_id,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            created_at: row.created_at,
            root_cause: row.root_cause,
            created_by_user_id: row.created_by_user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statusline_protocol::timeline::EndsAtRepair;

    /// Connects to `DATABASE_URL`; these tests are skipped without it.
    async fn store() -> Option<PgTimelineStore> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let pool = DatabasePool::connect_with_url(&url).await.expect("database reachable");
        Some(PgTimelineStore::from_pool(pool).await.expect("migrations run"))
    }

    fn opening(monitor_id: Uuid) -> NewInterval {
        NewInterval {
            monitor_id,
            status_id: Uuid::new_v4(),
            starts_at: None,
            root_cause: None,
            created_by_user_id: None,
        }
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn append_closes_prior_at_creation_time() {
        let Some(store) = store().await else { return };
        let monitor = Uuid::new_v4();

        let first = store.append(opening(monitor), None).await.unwrap();
        assert_eq!(first.starts_at, first.created_at);
        let second = store.append(opening(monitor), Some(first.id)).await.unwrap();

        let timeline = store.list_for_monitor(monitor).await.unwrap();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].ends_at, Some(second.created_at));
        assert_eq!(timeline[1].starts_at, second.created_at);
        assert!(second.created_at > first.created_at);
        assert_eq!(
            store.find_latest(monitor).await.unwrap().map(|latest| latest.id),
            Some(second.id)
        );
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn append_rolls_back_when_prior_is_missing() {
        let Some(store) = store().await else { return };
        let monitor = Uuid::new_v4();

        let err = store
            .append(opening(monitor), Some(Uuid::new_v4()))
            .await
            .unwrap_err();

        assert!(matches!(err, StatusLineError::NotFound(_)));
        assert_eq!(store.count(monitor).await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn apply_deletion_rolls_back_when_target_is_missing() {
        let Some(store) = store().await else { return };
        let monitor = Uuid::new_v4();
        let first = store.append(opening(monitor), None).await.unwrap();
        let second = store.append(opening(monitor), Some(first.id)).await.unwrap();

        let plan = DeletionPlan {
            target: Uuid::new_v4(),
            repair: Some(EndsAtRepair {
                interval_id: first.id,
                ends_at: None,
            }),
        };
        let err = store.apply_deletion(&plan).await.unwrap_err();

        assert!(matches!(err, StatusLineError::NotFound(_)));
        let first = store.find_by_id(first.id).await.unwrap().expect("first kept");
        assert_eq!(first.ends_at, Some(second.created_at));
        assert_eq!(store.count(monitor).await.unwrap(), 2);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn purge_keeps_open_intervals() {
        let Some(store) = store().await else { return };
        let monitor = Uuid::new_v4();
        let first = store.append(opening(monitor), None).await.unwrap();
        let second = store.append(opening(monitor), Some(first.id)).await.unwrap();

        store
            .purge_closed_before(second.created_at + chrono::Duration::seconds(1))
            .await
            .unwrap();

        let remaining = store.list_for_monitor(monitor).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second.id);
        assert!(remaining[0].is_open());
    }
}
