use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crewlink_model::{JobId, LocationCapability, LocationSample};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::ports::{
    LatestSampleStore, LocationGrantRecord, LocationGrantRepository, LocationTokenRecord,
    LocationTokenRepository, NewLocationGrant,
};
use crate::error::StoreResult;

/// Grants, scoped tokens and latest samples share one adapter; they are
/// only ever used together.
#[derive(Debug, Clone)]
pub struct PostgresLocationRepository {
    pool: PgPool,
}

impl PostgresLocationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GrantRow {
    job_id: Uuid,
    worker_phone_hash: String,
    code_hash: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    consumed_at: Option<DateTime<Utc>>,
    attempts: i32,
    last_attempt_at: Option<DateTime<Utc>>,
}

impl From<GrantRow> for LocationGrantRecord {
    fn from(row: GrantRow) -> Self {
        LocationGrantRecord {
            job_id: JobId(row.job_id),
            worker_phone_hash: row.worker_phone_hash,
            code_hash: row.code_hash,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            consumed_at: row.consumed_at,
            attempts: row.attempts,
            last_attempt_at: row.last_attempt_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TokenRow {
    token_hash: String,
    job_id: Uuid,
    worker_phone_hash: String,
    capabilities: Vec<String>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TokenRow {
    fn into_record(self) -> StoreResult<LocationTokenRecord> {
        let capabilities = self
            .capabilities
            .iter()
            .map(|cap| cap.parse::<LocationCapability>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LocationTokenRecord {
            token_hash: self.token_hash,
            job_id: JobId(self.job_id),
            worker_phone_hash: self.worker_phone_hash,
            capabilities,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SampleRow {
    job_id: Uuid,
    latitude: f64,
    longitude: f64,
    recorded_at: DateTime<Utc>,
    emitter_role: String,
}

#[async_trait]
impl LocationGrantRepository for PostgresLocationRepository {
    async fn replace(&self, grant: NewLocationGrant) -> StoreResult<LocationGrantRecord> {
        let row = sqlx::query_as::<_, GrantRow>(
            r#"
            INSERT INTO location_grants (
                job_id, worker_phone_hash, code_hash, issued_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (job_id, worker_phone_hash) DO UPDATE
            SET code_hash = EXCLUDED.code_hash,
                issued_at = EXCLUDED.issued_at,
                expires_at = EXCLUDED.expires_at,
                consumed_at = NULL,
                attempts = 0,
                last_attempt_at = NULL
            RETURNING
                job_id, worker_phone_hash, code_hash, issued_at, expires_at,
                consumed_at, attempts, last_attempt_at
            "#,
        )
        .bind(grant.job_id.to_uuid())
        .bind(&grant.worker_phone_hash)
        .bind(&grant.code_hash)
        .bind(grant.issued_at)
        .bind(grant.expires_at)
        .fetch_one(self.pool())
        .await?;

        Ok(row.into())
    }

    async fn find(
        &self,
        job_id: JobId,
        worker_phone_hash: &str,
    ) -> StoreResult<Option<LocationGrantRecord>> {
        let row = sqlx::query_as::<_, GrantRow>(
            r#"
            SELECT
                job_id, worker_phone_hash, code_hash, issued_at, expires_at,
                consumed_at, attempts, last_attempt_at
            FROM location_grants
            WHERE job_id = $1 AND worker_phone_hash = $2
            "#,
        )
        .bind(job_id.to_uuid())
        .bind(worker_phone_hash)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(Into::into))
    }

    async fn record_attempt(
        &self,
        job_id: JobId,
        worker_phone_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<i32> {
        let attempts: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE location_grants
            SET attempts = attempts + 1,
                last_attempt_at = $3
            WHERE job_id = $1 AND worker_phone_hash = $2
            RETURNING attempts
            "#,
        )
        .bind(job_id.to_uuid())
        .bind(worker_phone_hash)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        Ok(attempts.unwrap_or(0))
    }

    async fn mark_consumed(
        &self,
        job_id: JobId,
        worker_phone_hash: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE location_grants
            SET consumed_at = $4
            WHERE job_id = $1
              AND worker_phone_hash = $2
              AND code_hash = $3
              AND consumed_at IS NULL
            "#,
        )
        .bind(job_id.to_uuid())
        .bind(worker_phone_hash)
        .bind(code_hash)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM location_grants WHERE expires_at < $1 AND consumed_at IS NULL",
        )
        .bind(before)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LocationTokenRepository for PostgresLocationRepository {
    async fn insert(&self, token: LocationTokenRecord) -> StoreResult<()> {
        let capabilities: Vec<&str> = token.capabilities.iter().map(|c| c.as_str()).collect();

        sqlx::query(
            r#"
            INSERT INTO location_tokens (
                token_hash, job_id, worker_phone_hash, capabilities, issued_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&token.token_hash)
        .bind(token.job_id.to_uuid())
        .bind(&token.worker_phone_hash)
        .bind(capabilities)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> StoreResult<Option<LocationTokenRecord>> {
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT token_hash, job_id, worker_phone_hash, capabilities, issued_at, expires_at
            FROM location_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(self.pool())
        .await?;

        row.map(TokenRow::into_record).transpose()
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM location_tokens WHERE expires_at < $1")
            .bind(before)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LatestSampleStore for PostgresLocationRepository {
    async fn record_if_newer(&self, sample: &LocationSample) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO latest_location_samples (
                job_id, latitude, longitude, recorded_at, emitter_role
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (job_id) DO UPDATE
            SET latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                recorded_at = EXCLUDED.recorded_at,
                emitter_role = EXCLUDED.emitter_role
            WHERE latest_location_samples.recorded_at <= EXCLUDED.recorded_at
            "#,
        )
        .bind(sample.job_id.to_uuid())
        .bind(sample.latitude)
        .bind(sample.longitude)
        .bind(sample.recorded_at)
        .bind(sample.emitter_role.as_str())
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn latest(&self, job_id: JobId) -> StoreResult<Option<LocationSample>> {
        let row = sqlx::query_as::<_, SampleRow>(
            r#"
            SELECT job_id, latitude, longitude, recorded_at, emitter_role
            FROM latest_location_samples
            WHERE job_id = $1
            "#,
        )
        .bind(job_id.to_uuid())
        .fetch_optional(self.pool())
        .await?;

        row.map(|row| -> StoreResult<LocationSample> {
            Ok(LocationSample {
                job_id: JobId(row.job_id),
                latitude: row.latitude,
                longitude: row.longitude,
                recorded_at: row.recorded_at,
                emitter_role: row.emitter_role.parse()?,
            })
        })
        .transpose()
    }

    async fn clear(&self, job_id: JobId) -> StoreResult<()> {
        sqlx::query("DELETE FROM latest_location_samples WHERE job_id = $1")
            .bind(job_id.to_uuid())
            .execute(self.pool())
            .await?;

        Ok(())
    }
}
