use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crewlink_model::{Job, JobId, Quote, QuoteId, QuoteSubmission, UserId};
use rust_decimal::Decimal;

use crate::error::StoreResult;

/// A quote acceptance as committed: the job now ACCEPTED and the winning
/// quote. Siblings were invalidated in the same step.
#[derive(Debug, Clone)]
pub struct AcceptedQuote {
    pub job: Job,
    pub quote: Quote,
    pub invalidated: u64,
}

/// Quote storage. Every mutating call is one atomic step across the quote
/// and job tables and returns `None`/`false` when its precondition did not
/// hold, leaving both tables unchanged.
#[async_trait]
pub trait QuoteRepository: Send + Sync {
    async fn get(&self, id: QuoteId) -> StoreResult<Option<Quote>>;

    /// All quotes on the job, invalidated ones included, oldest first.
    async fn list_for_job(&self, job_id: JobId) -> StoreResult<Vec<Quote>>;

    /// Insert or overwrite the contractor's PENDING quote.
    ///
    /// Precondition: the job is a BIDDING job in PENDING or QUOTED and any
    /// existing quote from this contractor is still PENDING. A PENDING job
    /// moves to QUOTED.
    async fn upsert_pending(
        &self,
        submission: QuoteSubmission,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<(Quote, Job)>>;

    /// Precondition: the job is QUOTED and posted by `customer_id`, and the
    /// quote is PENDING on that job.
    async fn accept(
        &self,
        job_id: JobId,
        quote_id: QuoteId,
        customer_id: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<AcceptedQuote>>;

    /// Precondition: the quote is ACCEPTED, owned by `contractor_id`, has no
    /// advance requested yet, and its job is ACCEPTED with nothing paid.
    async fn request_advance(
        &self,
        quote_id: QuoteId,
        contractor_id: UserId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Quote>>;

    /// Precondition: the quote is PENDING, owned by `contractor_id`, and its
    /// job is PENDING or QUOTED.
    async fn delete_pending(&self, quote_id: QuoteId, contractor_id: UserId) -> StoreResult<bool>;

    /// Precondition: the quote is live, owned by `contractor_id`, and its job
    /// is PENDING, QUOTED or ACCEPTED.
    async fn schedule_meeting(
        &self,
        quote_id: QuoteId,
        contractor_id: UserId,
        when: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Quote>>;

    /// Precondition: the job is posted by `customer_id`, ACCEPTED or
    /// IN_PROGRESS, nothing paid yet, and its accepted quote requested an
    /// advance of exactly `amount`.
    async fn record_advance_payment(
        &self,
        job_id: JobId,
        customer_id: UserId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Job>>;
}
