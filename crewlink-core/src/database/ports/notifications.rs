use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crewlink_model::{JobId, UserId};
use uuid::Uuid;

use crate::error::StoreResult;

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: UserId,
    pub job_id: Option<JobId>,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub job_id: Option<JobId>,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn push(
        &self,
        notification: NewNotification,
        now: DateTime<Utc>,
    ) -> StoreResult<NotificationRecord>;

    async fn unread_count(&self, user_id: UserId) -> StoreResult<u64>;

    /// Mark every unread notification of the user as read, returning how
    /// many changed.
    async fn mark_all_read(&self, user_id: UserId, now: DateTime<Utc>) -> StoreResult<u64>;

    /// Delete notifications read before `read_before`. Unread ones are
    /// never removed.
    async fn prune_read(&self, read_before: DateTime<Utc>) -> StoreResult<u64>;
}
