use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crewlink_model::{Job, JobId, JobStatus, JobType, Quote, QuoteId, QuoteSubmission, UserId};
use rust_decimal::Decimal;
use sqlx::PgPool;

use super::rows::{JobRow, QuoteRow, job_columns, quote_columns};
use crate::database::ports::{AcceptedQuote, QuoteRepository};
use crate::error::StoreResult;

#[derive(Debug, Clone)]
pub struct PostgresQuoteRepository {
    pool: PgPool,
}

impl PostgresQuoteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl QuoteRepository for PostgresQuoteRepository {
    async fn get(&self, id: QuoteId) -> StoreResult<Option<Quote>> {
        let row = sqlx::query_as::<_, QuoteRow>(concat!(
            "SELECT ",
            quote_columns!(),
            " FROM quotes WHERE id = $1"
        ))
        .bind(id.to_uuid())
        .fetch_optional(self.pool())
        .await?;

        row.map(QuoteRow::into_quote).transpose()
    }

    async fn list_for_job(&self, job_id: JobId) -> StoreResult<Vec<Quote>> {
        let rows = sqlx::query_as::<_, QuoteRow>(concat!(
            "SELECT ",
            quote_columns!(),
            " FROM quotes WHERE job_id = $1 ORDER BY created_at"
        ))
        .bind(job_id.to_uuid())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(QuoteRow::into_quote).collect()
    }

    async fn upsert_pending(
        &self,
        submission: QuoteSubmission,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<(Quote, Job)>> {
        let mut tx = self.pool().begin().await?;

        let job_row = sqlx::query_as::<_, JobRow>(concat!(
            "SELECT ",
            job_columns!(),
            " FROM jobs WHERE id = $1 FOR UPDATE"
        ))
        .bind(submission.job_id.to_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(job) = job_row.map(JobRow::into_job).transpose()? else {
            return Ok(None);
        };
        if job.job_type != JobType::Bidding || !job.status.is_open() {
            return Ok(None);
        }

        // The conflict branch only fires for a still-pending quote; any other
        // status leaves the row untouched and returns nothing.
        let quote_row = sqlx::query_as::<_, QuoteRow>(concat!(
            r#"
            INSERT INTO quotes (
                id, job_id, contractor_id, amount, total_amount, notes, add_ons, documents,
                status, advance_requested, advance_amount, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'PENDING', FALSE, 0, $9, $9)
            ON CONFLICT (job_id, contractor_id) DO UPDATE
            SET amount = EXCLUDED.amount,
                total_amount = EXCLUDED.total_amount,
                notes = EXCLUDED.notes,
                add_ons = EXCLUDED.add_ons,
                documents = EXCLUDED.documents,
                updated_at = EXCLUDED.updated_at
            WHERE quotes.status = 'PENDING'
            RETURNING "#,
            quote_columns!()
        ))
        .bind(QuoteId::new().to_uuid())
        .bind(submission.job_id.to_uuid())
        .bind(submission.contractor_id.to_uuid())
        .bind(submission.amount)
        .bind(submission.total_amount)
        .bind(submission.notes)
        .bind(submission.add_ons)
        .bind(submission.documents)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(quote) = quote_row.map(QuoteRow::into_quote).transpose()? else {
            return Ok(None);
        };

        let job = if job.status == JobStatus::Pending {
            let row = sqlx::query_as::<_, JobRow>(concat!(
                "UPDATE jobs SET status = 'QUOTED', updated_at = $2 WHERE id = $1 RETURNING ",
                job_columns!()
            ))
            .bind(submission.job_id.to_uuid())
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            row.into_job()?
        } else {
            job
        };

        tx.commit().await?;
        Ok(Some((quote, job)))
    }

    async fn accept(
        &self,
        job_id: JobId,
        quote_id: QuoteId,
        customer_id: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<AcceptedQuote>> {
        let mut tx = self.pool().begin().await?;

        let job_row = sqlx::query_as::<_, JobRow>(concat!(
            r#"
            UPDATE jobs
            SET status = 'ACCEPTED',
                contractor_id = q.contractor_id,
                updated_at = $4
            FROM quotes q
            WHERE jobs.id = $1
              AND jobs.status = 'QUOTED'
              AND jobs.customer_id = $3
              AND q.id = $2
              AND q.job_id = jobs.id
              AND q.status = 'PENDING'
            RETURNING "#,
            "jobs.id, jobs.customer_id, jobs.title, jobs.status, jobs.job_type, \
             jobs.contractor_id, jobs.workers_needed, jobs.assigned_workers, \
             jobs.scheduled_start_date, jobs.advance_paid, jobs.created_at, jobs.updated_at"
        ))
        .bind(job_id.to_uuid())
        .bind(quote_id.to_uuid())
        .bind(customer_id.to_uuid())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(job) = job_row.map(JobRow::into_job).transpose()? else {
            return Ok(None);
        };

        let quote = sqlx::query_as::<_, QuoteRow>(concat!(
            "UPDATE quotes SET status = 'ACCEPTED', updated_at = $2 WHERE id = $1 RETURNING ",
            quote_columns!()
        ))
        .bind(quote_id.to_uuid())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?
        .into_quote()?;

        let invalidated = sqlx::query(
            r#"
            UPDATE quotes
            SET status = 'INVALIDATED', updated_at = $3
            WHERE job_id = $1 AND id <> $2 AND status <> 'INVALIDATED'
            "#,
        )
        .bind(job_id.to_uuid())
        .bind(quote_id.to_uuid())
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(Some(AcceptedQuote {
            job,
            quote,
            invalidated,
        }))
    }

    async fn request_advance(
        &self,
        quote_id: QuoteId,
        contractor_id: UserId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Quote>> {
        let row = sqlx::query_as::<_, QuoteRow>(concat!(
            r#"
            UPDATE quotes
            SET advance_requested = TRUE,
                advance_amount = $3,
                updated_at = $4
            WHERE id = $1
              AND contractor_id = $2
              AND status = 'ACCEPTED'
              AND advance_requested = FALSE
              AND EXISTS (
                  SELECT 1 FROM jobs j
                  WHERE j.id = quotes.job_id
                    AND j.status = 'ACCEPTED'
                    AND j.contractor_id = $2
                    AND j.advance_paid = 0
              )
            RETURNING "#,
            quote_columns!()
        ))
        .bind(quote_id.to_uuid())
        .bind(contractor_id.to_uuid())
        .bind(amount)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        row.map(QuoteRow::into_quote).transpose()
    }

    async fn delete_pending(&self, quote_id: QuoteId, contractor_id: UserId) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM quotes
            WHERE id = $1
              AND contractor_id = $2
              AND status = 'PENDING'
              AND EXISTS (
                  SELECT 1 FROM jobs j
                  WHERE j.id = quotes.job_id
                    AND j.status IN ('PENDING', 'QUOTED')
              )
            "#,
        )
        .bind(quote_id.to_uuid())
        .bind(contractor_id.to_uuid())
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn schedule_meeting(
        &self,
        quote_id: QuoteId,
        contractor_id: UserId,
        when: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Quote>> {
        let row = sqlx::query_as::<_, QuoteRow>(concat!(
            r#"
            UPDATE quotes
            SET meeting_scheduled_on = $3,
                updated_at = $4
            WHERE id = $1
              AND contractor_id = $2
              AND status <> 'INVALIDATED'
              AND EXISTS (
                  SELECT 1 FROM jobs j
                  WHERE j.id = quotes.job_id
                    AND j.status IN ('PENDING', 'QUOTED', 'ACCEPTED')
              )
            RETURNING "#,
            quote_columns!()
        ))
        .bind(quote_id.to_uuid())
        .bind(contractor_id.to_uuid())
        .bind(when)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        row.map(QuoteRow::into_quote).transpose()
    }

    async fn record_advance_payment(
        &self,
        job_id: JobId,
        customer_id: UserId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(concat!(
            r#"
            UPDATE jobs
            SET advance_paid = $3,
                updated_at = $4
            WHERE id = $1
              AND customer_id = $2
              AND status IN ('ACCEPTED', 'IN_PROGRESS')
              AND advance_paid = 0
              AND EXISTS (
                  SELECT 1 FROM quotes q
                  WHERE q.job_id = jobs.id
                    AND q.status = 'ACCEPTED'
                    AND q.advance_requested
                    AND q.advance_amount = $3
              )
            RETURNING "#,
            job_columns!()
        ))
        .bind(job_id.to_uuid())
        .bind(customer_id.to_uuid())
        .bind(amount)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        row.map(JobRow::into_job).transpose()
    }
}
