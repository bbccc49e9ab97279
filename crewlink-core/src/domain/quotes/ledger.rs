use std::{any::type_name_of_val, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use crewlink_model::{
    ADVANCE_CAP_PERCENT, Actor, Job, JobId, JobStatus, JobType, Quote, QuoteId, QuoteStatus,
    QuoteSubmission, RoomEvent,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::database::ports::{AcceptedQuote, JobRepository, QuoteRepository};
use crate::error::{DomainError, DomainResult};
use crate::realtime::Announcer;

/// A contractor's offer as received from the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuoteDraft {
    pub amount: Decimal,
    #[serde(default)]
    pub total_amount: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub add_ons: Vec<String>,
    #[serde(default)]
    pub documents: Vec<String>,
}

impl QuoteDraft {
    fn validate(&self) -> DomainResult<()> {
        if self.amount <= Decimal::ZERO {
            return Err(DomainError::validation("amount must be positive"));
        }
        if let Some(total) = self.total_amount
            && total < self.amount
        {
            return Err(DomainError::validation(
                "total_amount must not be below amount",
            ));
        }
        Ok(())
    }
}

/// Quotes on BIDDING jobs and the advance-payment bookkeeping that follows
/// acceptance.
#[derive(Clone)]
pub struct QuoteLedger {
    jobs: Arc<dyn JobRepository>,
    quotes: Arc<dyn QuoteRepository>,
    announcer: Announcer,
}

impl fmt::Debug for QuoteLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuoteLedger")
            .field("jobs", &type_name_of_val(self.jobs.as_ref()))
            .field("quotes", &type_name_of_val(self.quotes.as_ref()))
            .finish_non_exhaustive()
    }
}

impl QuoteLedger {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        quotes: Arc<dyn QuoteRepository>,
        announcer: Announcer,
    ) -> Self {
        Self {
            jobs,
            quotes,
            announcer,
        }
    }

    /// Insert or overwrite the contractor's pending quote. The first quote
    /// on a job moves it from PENDING to QUOTED.
    pub async fn submit(&self, job_id: JobId, actor: &Actor, draft: QuoteDraft) -> DomainResult<Quote> {
        if !actor.is_contractor() {
            return Err(DomainError::unauthorized("only contractors can submit quotes"));
        }
        draft.validate()?;

        let job = self.load_job(job_id).await?;
        if job.job_type != JobType::Bidding {
            return Err(DomainError::validation("only BIDDING jobs take quotes"));
        }
        ensure_open(&job)?;

        let submission = QuoteSubmission {
            job_id,
            contractor_id: actor.id,
            amount: draft.amount,
            total_amount: draft.total_amount,
            notes: draft.notes,
            add_ons: draft.add_ons,
            documents: draft.documents,
        };

        let Some((quote, updated)) = self.quotes.upsert_pending(submission, Utc::now()).await? else {
            let current = self.load_job(job_id).await?;
            ensure_open(&current)?;
            return Err(DomainError::conflict("quote is no longer pending"));
        };

        if job.status != updated.status {
            tracing::info!(
                %job_id,
                from = %job.status,
                to = %updated.status,
                contractor_id = %actor.id,
                "job transition"
            );
        }
        tracing::debug!(%job_id, quote_id = %quote.id, amount = %quote.amount, "quote submitted");

        self.announcer
            .notify(
                updated.customer_id,
                Some(job_id),
                "New quote",
                format!("A contractor quoted {} for \"{}\"", quote.amount, updated.title),
            )
            .await;
        Ok(quote)
    }

    /// Award the job to `quote_id`. Sibling quotes are invalidated in the
    /// same step; a second acceptance on the job fails with `Conflict`.
    pub async fn accept(
        &self,
        job_id: JobId,
        quote_id: QuoteId,
        actor: &Actor,
    ) -> DomainResult<AcceptedQuote> {
        let job = self.load_job(job_id).await?;
        if !(actor.is_customer() && job.is_customer(actor.id)) {
            return Err(DomainError::unauthorized(
                "only the posting customer can accept quotes",
            ));
        }
        let quote = self.load_quote(job_id, quote_id).await?;

        if job.status.is_terminal() {
            return Err(DomainError::transition(job.status, JobStatus::Accepted));
        }
        if job.status != JobStatus::Quoted {
            return Err(DomainError::conflict(format!(
                "job is {} and no longer open for acceptance",
                job.status
            )));
        }
        if quote.status != QuoteStatus::Pending {
            return Err(DomainError::conflict("quote is no longer pending"));
        }

        let Some(accepted) = self
            .quotes
            .accept(job_id, quote_id, actor.id, Utc::now())
            .await?
        else {
            let current = self.load_job(job_id).await?;
            if current.status.is_terminal() {
                return Err(DomainError::transition(current.status, JobStatus::Accepted));
            }
            return Err(DomainError::conflict("job has already been awarded"));
        };

        tracing::info!(
            %job_id,
            from = %job.status,
            to = %accepted.job.status,
            %quote_id,
            invalidated = accepted.invalidated,
            "job transition"
        );

        self.announcer.job_event(
            &accepted.job,
            RoomEvent::JobAccepted {
                job_id,
                contractor_id: accepted.quote.contractor_id,
            },
        );
        self.announcer
            .notify(
                accepted.quote.contractor_id,
                Some(job_id),
                "Quote accepted",
                format!("Your quote for \"{}\" was accepted", accepted.job.title),
            )
            .await;
        Ok(accepted)
    }

    /// Ask for part of the quote up front. Allowed once per quote, before
    /// anything has been paid, up to and including the advance cap.
    pub async fn request_advance(
        &self,
        job_id: JobId,
        quote_id: QuoteId,
        actor: &Actor,
        amount: Decimal,
    ) -> DomainResult<Quote> {
        let job = self.load_job(job_id).await?;
        let quote = self.load_quote(job_id, quote_id).await?;
        if !(actor.is_contractor() && quote.contractor_id == actor.id && job.is_assigned_to(actor.id)) {
            return Err(DomainError::unauthorized(
                "only the assigned contractor can request an advance on its quote",
            ));
        }
        if job.status != JobStatus::Accepted {
            return Err(DomainError::InvalidTransition(format!(
                "advances can only be requested while the job is ACCEPTED, not {}",
                job.status
            )));
        }

        if amount <= Decimal::ZERO {
            return Err(DomainError::validation("advance must be positive"));
        }
        let cap = quote.max_advance();
        if amount > cap {
            return Err(DomainError::validation(format!(
                "advance {amount} exceeds {ADVANCE_CAP_PERCENT}% of the quote total ({cap})"
            )));
        }
        if !job.advance_paid.is_zero() {
            return Err(DomainError::conflict("an advance has already been paid"));
        }
        if quote.advance_requested {
            return Err(DomainError::conflict("an advance was already requested"));
        }

        let requested = self
            .quotes
            .request_advance(quote_id, actor.id, amount, Utc::now())
            .await?
            .ok_or_else(|| DomainError::conflict("quote changed while requesting an advance"))?;

        tracing::info!(%job_id, %quote_id, %amount, "advance requested");
        self.announcer
            .notify(
                job.customer_id,
                Some(job_id),
                "Advance requested",
                format!("An advance of {amount} was requested for \"{}\"", job.title),
            )
            .await;
        Ok(requested)
    }

    /// Withdraw a pending quote. The job keeps its QUOTED status even when
    /// no quotes remain.
    pub async fn cancel_quote(&self, job_id: JobId, quote_id: QuoteId, actor: &Actor) -> DomainResult<()> {
        let job = self.load_job(job_id).await?;
        let quote = self.load_quote(job_id, quote_id).await?;
        ensure_owner(&quote, actor)?;
        ensure_open(&job)?;
        if quote.status != QuoteStatus::Pending {
            return Err(DomainError::conflict("only pending quotes can be withdrawn"));
        }

        if !self.quotes.delete_pending(quote_id, actor.id).await? {
            return Err(DomainError::conflict("quote changed while withdrawing it"));
        }

        tracing::debug!(%job_id, %quote_id, "quote withdrawn");
        Ok(())
    }

    /// The posting customer sees every live quote; a contractor sees only
    /// its own.
    pub async fn list_quotes(&self, job_id: JobId, actor: &Actor) -> DomainResult<Vec<Quote>> {
        let job = self.load_job(job_id).await?;
        let quotes = self.quotes.list_for_job(job_id).await?;

        if actor.is_customer() {
            if !job.is_customer(actor.id) {
                return Err(DomainError::unauthorized("job belongs to another customer"));
            }
            return Ok(quotes.into_iter().filter(Quote::is_live).collect());
        }
        Ok(quotes
            .into_iter()
            .filter(|quote| quote.contractor_id == actor.id)
            .collect())
    }

    pub async fn schedule_meeting(
        &self,
        job_id: JobId,
        quote_id: QuoteId,
        actor: &Actor,
        when: DateTime<Utc>,
    ) -> DomainResult<Quote> {
        let job = self.load_job(job_id).await?;
        let quote = self.load_quote(job_id, quote_id).await?;
        ensure_owner(&quote, actor)?;

        let now = Utc::now();
        if when <= now {
            return Err(DomainError::validation("meeting must be scheduled in the future"));
        }
        if !matches!(
            job.status,
            JobStatus::Pending | JobStatus::Quoted | JobStatus::Accepted
        ) {
            return Err(DomainError::InvalidTransition(format!(
                "meetings cannot be scheduled on a {} job",
                job.status
            )));
        }
        if !quote.is_live() {
            return Err(DomainError::conflict("quote has been invalidated"));
        }

        let scheduled = self
            .quotes
            .schedule_meeting(quote_id, actor.id, when, now)
            .await?
            .ok_or_else(|| DomainError::conflict("quote changed while scheduling"))?;

        self.announcer
            .notify(
                job.customer_id,
                Some(job_id),
                "Meeting scheduled",
                format!("A meeting for \"{}\" is set for {}", job.title, when.to_rfc3339()),
            )
            .await;
        Ok(scheduled)
    }

    /// Record the result of the external payment exchange. The amount must
    /// match the requested advance exactly.
    pub async fn record_advance_payment(
        &self,
        job_id: JobId,
        actor: &Actor,
        amount: Decimal,
    ) -> DomainResult<Job> {
        let job = self.load_job(job_id).await?;
        if !(actor.is_customer() && job.is_customer(actor.id)) {
            return Err(DomainError::unauthorized(
                "only the posting customer can pay an advance",
            ));
        }
        if !job.status.is_engaged() {
            return Err(DomainError::InvalidTransition(format!(
                "advances cannot be paid on a {} job",
                job.status
            )));
        }
        if !job.advance_paid.is_zero() {
            return Err(DomainError::conflict("an advance has already been paid"));
        }

        let requested = self
            .quotes
            .list_for_job(job_id)
            .await?
            .into_iter()
            .find(|quote| quote.status == QuoteStatus::Accepted && quote.advance_requested)
            .ok_or_else(|| DomainError::validation("no advance has been requested"))?;
        if requested.advance_amount != amount {
            return Err(DomainError::validation(format!(
                "payment {amount} does not match the requested advance {}",
                requested.advance_amount
            )));
        }

        let paid = self
            .quotes
            .record_advance_payment(job_id, actor.id, amount, Utc::now())
            .await?
            .ok_or_else(|| DomainError::conflict("an advance has already been paid"))?;

        tracing::info!(%job_id, %amount, "advance paid");
        if let Some(contractor) = paid.contractor_id {
            self.announcer
                .notify(
                    contractor,
                    Some(job_id),
                    "Advance paid",
                    format!("The customer paid an advance of {amount} for \"{}\"", paid.title),
                )
                .await;
        }
        Ok(paid)
    }

    async fn load_job(&self, job_id: JobId) -> DomainResult<Job> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or(DomainError::NotFound("job"))
    }

    async fn load_quote(&self, job_id: JobId, quote_id: QuoteId) -> DomainResult<Quote> {
        self.quotes
            .get(quote_id)
            .await?
            .filter(|quote| quote.job_id == job_id)
            .ok_or(DomainError::NotFound("quote"))
    }
}

fn ensure_open(job: &Job) -> DomainResult<()> {
    if job.status.is_open() {
        Ok(())
    } else {
        Err(DomainError::InvalidTransition(format!(
            "quotes can only change while a job is PENDING or QUOTED, not {}",
            job.status
        )))
    }
}

fn ensure_owner(quote: &Quote, actor: &Actor) -> DomainResult<()> {
    if actor.is_contractor() && quote.contractor_id == actor.id {
        Ok(())
    } else {
        Err(DomainError::unauthorized("quote belongs to another contractor"))
    }
}
