use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crewlink_model::{JobId, LocationCapability, LocationSample};

use crate::error::StoreResult;

#[derive(Debug, Clone)]
pub struct NewLocationGrant {
    pub job_id: JobId,
    pub worker_phone_hash: String,
    pub code_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationGrantRecord {
    pub job_id: JobId,
    pub worker_phone_hash: String,
    pub code_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait LocationGrantRepository: Send + Sync {
    /// Store a grant, replacing any previous grant for the same job and
    /// phone (consumed or not).
    async fn replace(&self, grant: NewLocationGrant) -> StoreResult<LocationGrantRecord>;

    async fn find(
        &self,
        job_id: JobId,
        worker_phone_hash: &str,
    ) -> StoreResult<Option<LocationGrantRecord>>;

    /// Increment the attempt counter. Returns the count after this
    /// attempt, or 0 when no grant matches.
    async fn record_attempt(
        &self,
        job_id: JobId,
        worker_phone_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<i32>;

    /// Set `consumed_at` if the grant with this code hash is still
    /// unconsumed. Returns whether this call consumed it.
    async fn mark_consumed(
        &self,
        job_id: JobId,
        worker_phone_hash: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Remove unconsumed grants that expired before `before`. Consumed
    /// grants stay behind as tombstones until replaced. Returns rows removed.
    async fn purge_expired(&self, before: DateTime<Utc>) -> StoreResult<u64>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationTokenRecord {
    pub token_hash: String,
    pub job_id: JobId,
    pub worker_phone_hash: String,
    pub capabilities: Vec<LocationCapability>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait LocationTokenRepository: Send + Sync {
    async fn insert(&self, token: LocationTokenRecord) -> StoreResult<()>;

    async fn find_by_hash(&self, token_hash: &str) -> StoreResult<Option<LocationTokenRecord>>;

    async fn purge_expired(&self, before: DateTime<Utc>) -> StoreResult<u64>;
}

/// Last-value store for location samples, one per job.
#[async_trait]
pub trait LatestSampleStore: Send + Sync {
    /// Keep `sample` unless the stored one is strictly newer. Returns whether
    /// the sample was kept. Samples with equal timestamps replace each other.
    async fn record_if_newer(&self, sample: &LocationSample) -> StoreResult<bool>;

    async fn latest(&self, job_id: JobId) -> StoreResult<Option<LocationSample>>;

    /// Forget the job's sample so the next one is kept whatever its time.
    async fn clear(&self, job_id: JobId) -> StoreResult<()>;
}
