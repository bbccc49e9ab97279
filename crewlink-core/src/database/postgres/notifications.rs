use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crewlink_model::{JobId, UserId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::ports::{NewNotification, NotificationRecord, NotificationRepository};
use crate::error::StoreResult;

#[derive(Debug, Clone)]
pub struct PostgresNotificationRepository {
    pool: PgPool,
}

impl PostgresNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    job_id: Option<Uuid>,
    title: String,
    message: String,
    created_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl NotificationRepository for PostgresNotificationRepository {
    async fn push(
        &self,
        notification: NewNotification,
        now: DateTime<Utc>,
    ) -> StoreResult<NotificationRecord> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            INSERT INTO notifications (id, user_id, job_id, title, message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, job_id, title, message, created_at, read_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(notification.user_id.to_uuid())
        .bind(notification.job_id.map(|id| id.to_uuid()))
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(now)
        .fetch_one(self.pool())
        .await?;

        Ok(NotificationRecord {
            id: row.id,
            user_id: UserId(row.user_id),
            job_id: row.job_id.map(JobId),
            title: row.title,
            message: row.message,
            created_at: row.created_at,
            read_at: row.read_at,
        })
    }

    async fn unread_count(&self, user_id: UserId) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id.to_uuid())
        .fetch_one(self.pool())
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn mark_all_read(&self, user_id: UserId, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = $2 WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id.to_uuid())
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected())
    }

    async fn prune_read(&self, read_before: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE read_at < $1")
            .bind(read_before)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }
}
