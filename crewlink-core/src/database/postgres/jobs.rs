use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crewlink_model::{Job, JobId, UserId};
use sqlx::PgPool;
use uuid::Uuid;

use super::rows::{JobRow, job_columns};
use crate::database::ports::{ContractorGuard, JobGuard, JobRepository, JobUpdate};
use crate::error::StoreResult;

#[derive(Debug, Clone)]
pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn contractor_mode(guard: ContractorGuard) -> (&'static str, Option<Uuid>) {
    match guard {
        ContractorGuard::Any => ("any", None),
        ContractorGuard::Unset => ("unset", None),
        ContractorGuard::Assigned => ("assigned", None),
        ContractorGuard::Is(id) => ("is", Some(id.to_uuid())),
    }
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    async fn insert(&self, job: &Job) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, customer_id, title, status, job_type, contractor_id, workers_needed,
                assigned_workers, scheduled_start_date, advance_paid, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(job.id.to_uuid())
        .bind(job.customer_id.to_uuid())
        .bind(&job.title)
        .bind(job.status.as_str())
        .bind(job.job_type.as_str())
        .bind(job.contractor_id.map(|id| id.to_uuid()))
        .bind(job.workers_needed as i32)
        .bind(
            job.assigned_workers
                .iter()
                .map(|w| w.to_uuid())
                .collect::<Vec<_>>(),
        )
        .bind(job.scheduled_start_date)
        .bind(job.advance_paid)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn get(&self, id: JobId) -> StoreResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(concat!(
            "SELECT ",
            job_columns!(),
            " FROM jobs WHERE id = $1"
        ))
        .bind(id.to_uuid())
        .fetch_optional(self.pool())
        .await?;

        row.map(JobRow::into_job).transpose()
    }

    async fn compare_and_set(
        &self,
        id: JobId,
        guard: &JobGuard,
        update: JobUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Job>> {
        let statuses: Vec<&str> = guard.statuses.iter().map(|s| s.as_str()).collect();
        let (mode, expected_contractor) = contractor_mode(guard.contractor);

        let row = sqlx::query_as::<_, JobRow>(concat!(
            r#"
            UPDATE jobs
            SET status = COALESCE($5, status),
                contractor_id = COALESCE($6, contractor_id),
                assigned_workers = COALESCE($7, assigned_workers),
                updated_at = $8
            WHERE id = $1
              AND status = ANY($2)
              AND CASE $3
                    WHEN 'any' THEN TRUE
                    WHEN 'unset' THEN contractor_id IS NULL
                    WHEN 'assigned' THEN contractor_id IS NOT NULL
                    ELSE contractor_id = $4
                  END
            RETURNING "#,
            job_columns!()
        ))
        .bind(id.to_uuid())
        .bind(statuses)
        .bind(mode)
        .bind(expected_contractor)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.contractor_id.map(|id| id.to_uuid()))
        .bind(
            update
                .assigned_workers
                .map(|workers| workers.iter().map(|w| w.to_uuid()).collect::<Vec<_>>()),
        )
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        row.map(JobRow::into_job).transpose()
    }

    async fn find_active_for_contractor(&self, contractor_id: UserId) -> StoreResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(concat!(
            "SELECT ",
            job_columns!(),
            r#"
            FROM jobs
            WHERE contractor_id = $1
              AND status IN ('ACCEPTED', 'IN_PROGRESS')
            ORDER BY updated_at DESC
            LIMIT 1
            "#
        ))
        .bind(contractor_id.to_uuid())
        .fetch_optional(self.pool())
        .await?;

        row.map(JobRow::into_job).transpose()
    }

    async fn find_active_for_customer(&self, customer_id: UserId) -> StoreResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(concat!(
            "SELECT ",
            job_columns!(),
            r#"
            FROM jobs
            WHERE customer_id = $1
              AND status NOT IN ('COMPLETED', 'CANCELLED', 'DISPUTED')
            ORDER BY updated_at DESC
            LIMIT 1
            "#
        ))
        .bind(customer_id.to_uuid())
        .fetch_optional(self.pool())
        .await?;

        row.map(JobRow::into_job).transpose()
    }
}
