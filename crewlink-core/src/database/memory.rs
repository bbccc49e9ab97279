//! Process-local storage.
//!
//! Jobs and quotes share one mutex so that every cross-table step (first
//! quote moving a job to QUOTED, acceptance invalidating siblings) is a
//! single critical section.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crewlink_model::{
    Job, JobId, JobStatus, JobType, LocationSample, Quote, QuoteId, QuoteStatus, QuoteSubmission,
    UserId,
};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::database::ports::{
    AcceptedQuote, JobGuard, JobRepository, JobUpdate, LatestSampleStore, LocationGrantRecord,
    LocationGrantRepository, LocationTokenRecord, LocationTokenRepository, NewLocationGrant,
    NewNotification, NotificationRecord, NotificationRepository, QuoteRepository,
};
use crate::error::StoreResult;

#[derive(Debug, Default)]
struct MarketTables {
    jobs: HashMap<JobId, Job>,
    quotes: HashMap<QuoteId, Quote>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    market: Mutex<MarketTables>,
    grants: Mutex<HashMap<(JobId, String), LocationGrantRecord>>,
    tokens: Mutex<HashMap<String, LocationTokenRecord>>,
    samples: Mutex<HashMap<JobId, LocationSample>>,
    notifications: Mutex<Vec<NotificationRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryStore {
    async fn insert(&self, job: &Job) -> StoreResult<()> {
        self.market.lock().await.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: JobId) -> StoreResult<Option<Job>> {
        Ok(self.market.lock().await.jobs.get(&id).cloned())
    }

    async fn compare_and_set(
        &self,
        id: JobId,
        guard: &JobGuard,
        update: JobUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Job>> {
        let mut market = self.market.lock().await;
        let Some(job) = market.jobs.get_mut(&id) else {
            return Ok(None);
        };
        if !guard.matches(job) {
            return Ok(None);
        }
        update.apply(job, now);
        Ok(Some(job.clone()))
    }

    async fn find_active_for_contractor(&self, contractor_id: UserId) -> StoreResult<Option<Job>> {
        let market = self.market.lock().await;
        Ok(market
            .jobs
            .values()
            .filter(|job| job.contractor_id == Some(contractor_id))
            .filter(|job| job.status.is_engaged())
            .max_by_key(|job| job.updated_at)
            .cloned())
    }

    async fn find_active_for_customer(&self, customer_id: UserId) -> StoreResult<Option<Job>> {
        let market = self.market.lock().await;
        Ok(market
            .jobs
            .values()
            .filter(|job| job.customer_id == customer_id)
            .filter(|job| !job.status.is_terminal())
            .max_by_key(|job| job.updated_at)
            .cloned())
    }
}

#[async_trait]
impl QuoteRepository for InMemoryStore {
    async fn get(&self, id: QuoteId) -> StoreResult<Option<Quote>> {
        Ok(self.market.lock().await.quotes.get(&id).cloned())
    }

    async fn list_for_job(&self, job_id: JobId) -> StoreResult<Vec<Quote>> {
        let market = self.market.lock().await;
        let mut quotes: Vec<Quote> = market
            .quotes
            .values()
            .filter(|quote| quote.job_id == job_id)
            .cloned()
            .collect();
        quotes.sort_by_key(|quote| quote.created_at);
        Ok(quotes)
    }

    async fn upsert_pending(
        &self,
        submission: QuoteSubmission,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<(Quote, Job)>> {
        let mut guard = self.market.lock().await;
        let market = &mut *guard;

        let Some(job) = market.jobs.get_mut(&submission.job_id) else {
            return Ok(None);
        };
        if job.job_type != JobType::Bidding || !job.status.is_open() {
            return Ok(None);
        }

        let existing = market
            .quotes
            .values()
            .find(|quote| {
                quote.job_id == submission.job_id && quote.contractor_id == submission.contractor_id
            })
            .cloned();

        let quote = match existing {
            Some(prior) if prior.status != QuoteStatus::Pending => return Ok(None),
            Some(prior) => Quote {
                amount: submission.amount,
                total_amount: submission.total_amount,
                notes: submission.notes,
                add_ons: submission.add_ons,
                documents: submission.documents,
                updated_at: now,
                ..prior
            },
            None => Quote {
                id: QuoteId::new(),
                job_id: submission.job_id,
                contractor_id: submission.contractor_id,
                amount: submission.amount,
                total_amount: submission.total_amount,
                notes: submission.notes,
                add_ons: submission.add_ons,
                documents: submission.documents,
                status: QuoteStatus::Pending,
                advance_requested: false,
                advance_amount: Decimal::ZERO,
                meeting_scheduled_on: None,
                created_at: now,
                updated_at: now,
            },
        };

        if job.status == JobStatus::Pending {
            job.status = JobStatus::Quoted;
            job.updated_at = now;
        }
        let job = job.clone();
        market.quotes.insert(quote.id, quote.clone());

        Ok(Some((quote, job)))
    }

    async fn accept(
        &self,
        job_id: JobId,
        quote_id: QuoteId,
        customer_id: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<AcceptedQuote>> {
        let mut guard = self.market.lock().await;
        let market = &mut *guard;

        let Some(job) = market.jobs.get_mut(&job_id) else {
            return Ok(None);
        };
        if job.status != JobStatus::Quoted || job.customer_id != customer_id {
            return Ok(None);
        }
        let Some(contractor_id) = market
            .quotes
            .get(&quote_id)
            .filter(|quote| quote.job_id == job_id && quote.status == QuoteStatus::Pending)
            .map(|quote| quote.contractor_id)
        else {
            return Ok(None);
        };

        job.status = JobStatus::Accepted;
        job.contractor_id = Some(contractor_id);
        job.updated_at = now;
        let job = job.clone();

        let mut invalidated = 0;
        let mut accepted = None;
        for quote in market.quotes.values_mut().filter(|q| q.job_id == job_id) {
            if quote.id == quote_id {
                quote.status = QuoteStatus::Accepted;
                quote.updated_at = now;
                accepted = Some(quote.clone());
            } else if quote.status != QuoteStatus::Invalidated {
                quote.status = QuoteStatus::Invalidated;
                quote.updated_at = now;
                invalidated += 1;
            }
        }

        Ok(accepted.map(|quote| AcceptedQuote {
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
        let mut guard = self.market.lock().await;
        let market = &mut *guard;

        let Some(quote) = market.quotes.get_mut(&quote_id) else {
            return Ok(None);
        };
        if quote.status != QuoteStatus::Accepted
            || quote.contractor_id != contractor_id
            || quote.advance_requested
        {
            return Ok(None);
        }
        let job_ready = market.jobs.get(&quote.job_id).is_some_and(|job| {
            job.status == JobStatus::Accepted
                && job.contractor_id == Some(contractor_id)
                && job.advance_paid.is_zero()
        });
        if !job_ready {
            return Ok(None);
        }

        quote.advance_requested = true;
        quote.advance_amount = amount;
        quote.updated_at = now;
        Ok(Some(quote.clone()))
    }

    async fn delete_pending(&self, quote_id: QuoteId, contractor_id: UserId) -> StoreResult<bool> {
        let mut market = self.market.lock().await;

        let Some(quote) = market.quotes.get(&quote_id) else {
            return Ok(false);
        };
        let job_open = market
            .jobs
            .get(&quote.job_id)
            .is_some_and(|job| job.status.is_open());
        if quote.status != QuoteStatus::Pending || quote.contractor_id != contractor_id || !job_open
        {
            return Ok(false);
        }

        market.quotes.remove(&quote_id);
        Ok(true)
    }

    async fn schedule_meeting(
        &self,
        quote_id: QuoteId,
        contractor_id: UserId,
        when: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Quote>> {
        let mut guard = self.market.lock().await;
        let market = &mut *guard;

        let Some(quote) = market.quotes.get_mut(&quote_id) else {
            return Ok(None);
        };
        if !quote.is_live() || quote.contractor_id != contractor_id {
            return Ok(None);
        }
        let job_ok = market.jobs.get(&quote.job_id).is_some_and(|job| {
            matches!(
                job.status,
                JobStatus::Pending | JobStatus::Quoted | JobStatus::Accepted
            )
        });
        if !job_ok {
            return Ok(None);
        }

        quote.meeting_scheduled_on = Some(when);
        quote.updated_at = now;
        Ok(Some(quote.clone()))
    }

    async fn record_advance_payment(
        &self,
        job_id: JobId,
        customer_id: UserId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Job>> {
        let mut guard = self.market.lock().await;
        let market = &mut *guard;

        let Some(job) = market.jobs.get_mut(&job_id) else {
            return Ok(None);
        };
        if job.customer_id != customer_id
            || !job.status.is_engaged()
            || !job.advance_paid.is_zero()
        {
            return Ok(None);
        }
        let requested = market.quotes.values().any(|quote| {
            quote.job_id == job_id
                && quote.status == QuoteStatus::Accepted
                && quote.advance_requested
                && quote.advance_amount == amount
        });
        if !requested {
            return Ok(None);
        }

        job.advance_paid = amount;
        job.updated_at = now;
        Ok(Some(job.clone()))
    }
}

#[async_trait]
impl LocationGrantRepository for InMemoryStore {
    async fn replace(&self, grant: NewLocationGrant) -> StoreResult<LocationGrantRecord> {
        let record = LocationGrantRecord {
            job_id: grant.job_id,
            worker_phone_hash: grant.worker_phone_hash,
            code_hash: grant.code_hash,
            issued_at: grant.issued_at,
            expires_at: grant.expires_at,
            consumed_at: None,
            attempts: 0,
            last_attempt_at: None,
        };
        self.grants.lock().await.insert(
            (record.job_id, record.worker_phone_hash.clone()),
            record.clone(),
        );
        Ok(record)
    }

    async fn find(
        &self,
        job_id: JobId,
        worker_phone_hash: &str,
    ) -> StoreResult<Option<LocationGrantRecord>> {
        let grants = self.grants.lock().await;
        Ok(grants.get(&(job_id, worker_phone_hash.to_string())).cloned())
    }

    async fn record_attempt(
        &self,
        job_id: JobId,
        worker_phone_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<i32> {
        let mut grants = self.grants.lock().await;
        Ok(match grants.get_mut(&(job_id, worker_phone_hash.to_string())) {
            Some(record) => {
                record.attempts += 1;
                record.last_attempt_at = Some(now);
                record.attempts
            }
            None => 0,
        })
    }

    async fn mark_consumed(
        &self,
        job_id: JobId,
        worker_phone_hash: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut grants = self.grants.lock().await;
        match grants.get_mut(&(job_id, worker_phone_hash.to_string())) {
            Some(record) if record.consumed_at.is_none() && record.code_hash == code_hash => {
                record.consumed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let mut grants = self.grants.lock().await;
        let initial = grants.len();
        grants.retain(|_, record| record.consumed_at.is_some() || record.expires_at >= before);
        Ok((initial - grants.len()) as u64)
    }
}

#[async_trait]
impl LocationTokenRepository for InMemoryStore {
    async fn insert(&self, token: LocationTokenRecord) -> StoreResult<()> {
        self.tokens
            .lock()
            .await
            .insert(token.token_hash.clone(), token);
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> StoreResult<Option<LocationTokenRecord>> {
        Ok(self.tokens.lock().await.get(token_hash).cloned())
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let mut tokens = self.tokens.lock().await;
        let initial = tokens.len();
        tokens.retain(|_, record| record.expires_at >= before);
        Ok((initial - tokens.len()) as u64)
    }
}

#[async_trait]
impl LatestSampleStore for InMemoryStore {
    async fn record_if_newer(&self, sample: &LocationSample) -> StoreResult<bool> {
        let mut samples = self.samples.lock().await;
        if let Some(current) = samples.get(&sample.job_id)
            && current.recorded_at > sample.recorded_at
        {
            return Ok(false);
        }
        samples.insert(sample.job_id, sample.clone());
        Ok(true)
    }

    async fn latest(&self, job_id: JobId) -> StoreResult<Option<LocationSample>> {
        Ok(self.samples.lock().await.get(&job_id).cloned())
    }

    async fn clear(&self, job_id: JobId) -> StoreResult<()> {
        self.samples.lock().await.remove(&job_id);
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for InMemoryStore {
    async fn push(
        &self,
        notification: NewNotification,
        now: DateTime<Utc>,
    ) -> StoreResult<NotificationRecord> {
        let record = NotificationRecord {
            id: Uuid::now_v7(),
            user_id: notification.user_id,
            job_id: notification.job_id,
            title: notification.title,
            message: notification.message,
            created_at: now,
            read_at: None,
        };
        self.notifications.lock().await.push(record.clone());
        Ok(record)
    }

    async fn unread_count(&self, user_id: UserId) -> StoreResult<u64> {
        let notifications = self.notifications.lock().await;
        Ok(notifications
            .iter()
            .filter(|n| n.user_id == user_id && n.read_at.is_none())
            .count() as u64)
    }

    async fn mark_all_read(&self, user_id: UserId, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut notifications = self.notifications.lock().await;
        let mut changed = 0;
        for record in notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && n.read_at.is_none())
        {
            record.read_at = Some(now);
            changed += 1;
        }
        Ok(changed)
    }

    async fn prune_read(&self, read_before: DateTime<Utc>) -> StoreResult<u64> {
        let mut notifications = self.notifications.lock().await;
        let initial = notifications.len();
        notifications.retain(|n| n.read_at.is_none_or(|read_at| read_at >= read_before));
        Ok((initial - notifications.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewlink_model::EmitterRole;

    fn bidding_job(customer_id: UserId) -> Job {
        let now = Utc::now();
        Job {
            id: JobId::new(),
            customer_id,
            title: "Paint fence".into(),
            status: JobStatus::Pending,
            job_type: JobType::Bidding,
            contractor_id: None,
            workers_needed: 2,
            assigned_workers: Vec::new(),
            scheduled_start_date: None,
            advance_paid: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    fn submission(job_id: JobId, contractor_id: UserId, amount: i64) -> QuoteSubmission {
        QuoteSubmission {
            job_id,
            contractor_id,
            amount: Decimal::from(amount),
            total_amount: None,
            notes: None,
            add_ons: Vec::new(),
            documents: Vec::new(),
        }
    }

    #[tokio::test]
    async fn resubmission_overwrites_pending_quote() {
        let store = InMemoryStore::new();
        let job = bidding_job(UserId::new());
        JobRepository::insert(&store, &job).await.unwrap();
        let contractor = UserId::new();

        let (first, job_after) = store
            .upsert_pending(submission(job.id, contractor, 100), Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job_after.status, JobStatus::Quoted);

        let (second, _) = store
            .upsert_pending(submission(job.id, contractor, 80), Utc::now())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.amount, Decimal::from(80));
        assert_eq!(store.list_for_job(job.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn accept_invalidates_siblings_in_one_step() {
        let store = InMemoryStore::new();
        let customer = UserId::new();
        let job = bidding_job(customer);
        JobRepository::insert(&store, &job).await.unwrap();

        let (winner, _) = store
            .upsert_pending(submission(job.id, UserId::new(), 100), Utc::now())
            .await
            .unwrap()
            .unwrap();
        store
            .upsert_pending(submission(job.id, UserId::new(), 90), Utc::now())
            .await
            .unwrap()
            .unwrap();

        let accepted = store
            .accept(job.id, winner.id, customer, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(accepted.job.status, JobStatus::Accepted);
        assert_eq!(accepted.job.contractor_id, Some(winner.contractor_id));
        assert_eq!(accepted.invalidated, 1);

        let again = store
            .accept(job.id, winner.id, customer, Utc::now())
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn strictly_older_samples_are_not_kept() {
        let store = InMemoryStore::new();
        let job_id = JobId::new();
        let sample = |secs: i64| LocationSample {
            job_id,
            latitude: 1.0,
            longitude: 2.0,
            recorded_at: DateTime::<Utc>::from_timestamp(secs, 0).unwrap(),
            emitter_role: EmitterRole::Worker,
        };

        assert!(store.record_if_newer(&sample(10)).await.unwrap());
        assert!(!store.record_if_newer(&sample(8)).await.unwrap());
        assert!(store.record_if_newer(&sample(10)).await.unwrap());
        assert!(store.record_if_newer(&sample(12)).await.unwrap());
        assert_eq!(
            store.latest(job_id).await.unwrap().unwrap().recorded_at.timestamp(),
            12
        );

        store.clear(job_id).await.unwrap();
        assert!(store.latest(job_id).await.unwrap().is_none());
        assert!(store.record_if_newer(&sample(8)).await.unwrap());
    }

    #[tokio::test]
    async fn grants_are_consumed_once() {
        let store = InMemoryStore::new();
        let job_id = JobId::new();
        let now = Utc::now();
        store
            .replace(NewLocationGrant {
                job_id,
                worker_phone_hash: "phone".into(),
                code_hash: "code".into(),
                issued_at: now,
                expires_at: now + chrono::Duration::minutes(30),
            })
            .await
            .unwrap();

        assert!(store.mark_consumed(job_id, "phone", "code", now).await.unwrap());
        assert!(!store.mark_consumed(job_id, "phone", "code", now).await.unwrap());
    }

    #[tokio::test]
    async fn consumed_grants_outlive_the_purge() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let grant = |job_id| NewLocationGrant {
            job_id,
            worker_phone_hash: "phone".into(),
            code_hash: "code".into(),
            issued_at: now,
            expires_at: now + chrono::Duration::minutes(30),
        };
        let (used, unused) = (JobId::new(), JobId::new());
        store.replace(grant(used)).await.unwrap();
        store.replace(grant(unused)).await.unwrap();
        assert!(store.mark_consumed(used, "phone", "code", now).await.unwrap());

        let removed = LocationGrantRepository::purge_expired(&store, now + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.find(used, "phone").await.unwrap().is_some());
        assert!(store.find(unused, "phone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn attempts_are_counted_per_grant() {
        let store = InMemoryStore::new();
        let job_id = JobId::new();
        let now = Utc::now();
        assert_eq!(store.record_attempt(job_id, "phone", now).await.unwrap(), 0);

        store
            .replace(NewLocationGrant {
                job_id,
                worker_phone_hash: "phone".into(),
                code_hash: "code".into(),
                issued_at: now,
                expires_at: now + chrono::Duration::minutes(30),
            })
            .await
            .unwrap();
        assert_eq!(store.record_attempt(job_id, "phone", now).await.unwrap(), 1);
        assert_eq!(store.record_attempt(job_id, "phone", now).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn only_old_read_notifications_are_pruned() {
        let store = InMemoryStore::new();
        let (reader, other) = (UserId::new(), UserId::new());
        let now = Utc::now();
        for user_id in [reader, reader, other] {
            store
                .push(
                    NewNotification {
                        user_id,
                        job_id: None,
                        title: "Quote".into(),
                        message: "received".into(),
                    },
                    now,
                )
                .await
                .unwrap();
        }
        store.mark_all_read(reader, now).await.unwrap();

        assert_eq!(store.prune_read(now).await.unwrap(), 0);
        assert_eq!(
            store
                .prune_read(now + chrono::Duration::seconds(1))
                .await
                .unwrap(),
            2
        );
        assert_eq!(store.unread_count(other).await.unwrap(), 1);
        assert_eq!(store.notifications.lock().await.len(), 1);
    }
}
