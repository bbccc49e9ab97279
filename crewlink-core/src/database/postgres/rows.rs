use chrono::{DateTime, Utc};
use crewlink_model::{Job, JobId, Quote, QuoteId, UserId, WorkerId};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

macro_rules! job_columns {
    () => {
        "id, customer_id, title, status, job_type, contractor_id, workers_needed, \
         assigned_workers, scheduled_start_date, advance_paid, created_at, updated_at"
    };
}

macro_rules! quote_columns {
    () => {
        "id, job_id, contractor_id, amount, total_amount, notes, add_ons, documents, status, \
         advance_requested, advance_amount, meeting_scheduled_on, created_at, updated_at"
    };
}

pub(crate) use {job_columns, quote_columns};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct JobRow {
    id: Uuid,
    customer_id: Uuid,
    title: String,
    status: String,
    job_type: String,
    contractor_id: Option<Uuid>,
    workers_needed: i32,
    assigned_workers: Vec<Uuid>,
    scheduled_start_date: Option<DateTime<Utc>>,
    advance_paid: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    pub(crate) fn into_job(self) -> StoreResult<Job> {
        let workers_needed = u32::try_from(self.workers_needed).map_err(|_| {
            StoreError::Corrupt(format!(
                "job {} has negative workers_needed {}",
                self.id, self.workers_needed
            ))
        })?;

        Ok(Job {
            id: JobId(self.id),
            customer_id: UserId(self.customer_id),
            title: self.title,
            status: self.status.parse()?,
            job_type: self.job_type.parse()?,
            contractor_id: self.contractor_id.map(UserId),
            workers_needed,
            assigned_workers: self.assigned_workers.into_iter().map(WorkerId).collect(),
            scheduled_start_date: self.scheduled_start_date,
            advance_paid: self.advance_paid,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct QuoteRow {
    id: Uuid,
    job_id: Uuid,
    contractor_id: Uuid,
    amount: Decimal,
    total_amount: Option<Decimal>,
    notes: Option<String>,
    add_ons: Vec<String>,
    documents: Vec<String>,
    status: String,
    advance_requested: bool,
    advance_amount: Decimal,
    meeting_scheduled_on: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl QuoteRow {
    pub(crate) fn into_quote(self) -> StoreResult<Quote> {
        Ok(Quote {
            id: QuoteId(self.id),
            job_id: JobId(self.job_id),
            contractor_id: UserId(self.contractor_id),
            amount: self.amount,
            total_amount: self.total_amount,
            notes: self.notes,
            add_ons: self.add_ons,
            documents: self.documents,
            status: self.status.parse()?,
            advance_requested: self.advance_requested,
            advance_amount: self.advance_amount,
            meeting_scheduled_on: self.meeting_scheduled_on,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
