use std::{any::type_name_of_val, fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use crewlink_model::{
    Actor, Coordinates, EmitterRole, Job, JobId, LocationCapability, LocationSample, RoomEvent,
    RoomKey, TravelEndReason, TravelStatus, UserId,
};
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::broadcast::error::RecvError;

use super::sharing::TokenScope;
use crate::database::ports::{JobRepository, LatestSampleStore};
use crate::domain::jobs::JobClosedListener;
use crate::error::{DomainError, DomainResult};
use crate::realtime::{RoomHub, RoomSubscription};

const DEFAULT_IDLE_MINUTES: i64 = 15;

/// Seconds a sample's `recorded_at` may run ahead of the server clock.
pub const MAX_CLOCK_SKEW_SECS: i64 = 120;

/// Who is acting on a travel session.
#[derive(Debug, Clone)]
pub enum TravelCredential {
    /// The assigned contractor, authenticated by session.
    Contractor(Actor),
    /// A worker holding a scoped location token.
    Worker(TokenScope),
}

impl TravelCredential {
    fn emitter(&self) -> Emitter {
        match self {
            TravelCredential::Contractor(actor) => Emitter::Contractor(actor.id),
            TravelCredential::Worker(scope) => Emitter::Worker(scope.worker_phone_hash.clone()),
        }
    }

    fn role(&self) -> EmitterRole {
        match self {
            TravelCredential::Contractor(_) => EmitterRole::Contractor,
            TravelCredential::Worker(_) => EmitterRole::Worker,
        }
    }

    /// Token scope checks that need no storage access.
    fn check_scope(&self, job_id: JobId, capability: LocationCapability) -> DomainResult<()> {
        match self {
            TravelCredential::Worker(scope) if scope.job_id != job_id => Err(
                DomainError::unauthorized("location token is scoped to another job"),
            ),
            TravelCredential::Worker(scope) if !scope.capabilities.contains(&capability) => Err(
                DomainError::unauthorized(format!("token does not allow {capability}")),
            ),
            TravelCredential::Contractor(actor) if !actor.is_contractor() => Err(
                DomainError::unauthorized("only contractors travel to jobs"),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Emitter {
    Contractor(UserId),
    Worker(String),
}

#[derive(Debug, Clone)]
struct TravelSession {
    emitter: Emitter,
    role: EmitterRole,
    started_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

/// Result of pushing a sample.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    Accepted(LocationSample),
    /// A newer sample was already stored; this one was discarded.
    Dropped,
}

/// Per-job live location relay with at most one traveler per job.
#[derive(Clone)]
pub struct LocationBroadcastChannel {
    jobs: Arc<dyn JobRepository>,
    samples: Arc<dyn LatestSampleStore>,
    hub: RoomHub,
    sessions: Arc<DashMap<JobId, TravelSession>>,
    idle_timeout: Duration,
}

impl fmt::Debug for LocationBroadcastChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationBroadcastChannel")
            .field("samples", &type_name_of_val(self.samples.as_ref()))
            .field("active_sessions", &self.sessions.len())
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

impl LocationBroadcastChannel {
    pub fn new(jobs: Arc<dyn JobRepository>, samples: Arc<dyn LatestSampleStore>, hub: RoomHub) -> Self {
        Self {
            jobs,
            samples,
            hub,
            sessions: Arc::new(DashMap::new()),
            idle_timeout: Duration::minutes(DEFAULT_IDLE_MINUTES),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Open the job's travel session. Starting again as the current
    /// traveler is a no-op; anyone else gets `Conflict`.
    pub async fn start_travel(
        &self,
        job_id: JobId,
        credential: &TravelCredential,
    ) -> DomainResult<TravelStatus> {
        credential.check_scope(job_id, LocationCapability::StartTravel)?;
        let job = self.load(job_id).await?;
        if let TravelCredential::Contractor(actor) = credential
            && !job.is_assigned_to(actor.id)
        {
            return Err(DomainError::unauthorized(
                "only the assigned contractor can travel to this job",
            ));
        }
        if !job.status.is_engaged() {
            return Err(DomainError::InvalidTransition(format!(
                "travel can only start while a job is ACCEPTED or IN_PROGRESS, not {}",
                job.status
            )));
        }

        let now = Utc::now();
        let emitter = credential.emitter();
        let (started_at, fresh) = match self.sessions.entry(job_id) {
            Entry::Occupied(existing) if existing.get().emitter == emitter => {
                (existing.get().started_at, false)
            }
            Entry::Occupied(existing) => {
                return Err(DomainError::conflict(format!(
                    "a {} is already travelling to this job",
                    existing.get().role
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(TravelSession {
                    emitter,
                    role: credential.role(),
                    started_at: now,
                    last_activity: now,
                });
                (now, true)
            }
        };

        // samples from an earlier session must not hold back this one's
        if fresh {
            self.samples.clear(job_id).await?;
            tracing::info!(%job_id, emitter = %credential.role(), "travel started");
            self.hub.publish(
                RoomKey::Job(job_id),
                RoomEvent::TravelStarted {
                    job_id,
                    emitter_role: credential.role(),
                    started_at,
                },
            );
        }

        Ok(TravelStatus {
            job_id,
            active: true,
            emitter_role: Some(credential.role()),
            started_at: Some(started_at),
            last_sample: self.samples.latest(job_id).await?,
        })
    }

    /// Record and relay a position. Out-of-order samples are dropped
    /// without error; samples dated more than [`MAX_CLOCK_SKEW_SECS`] ahead of
    /// the server clock are rejected.
    pub async fn push_sample(
        &self,
        job_id: JobId,
        credential: &TravelCredential,
        latitude: f64,
        longitude: f64,
        recorded_at: Option<DateTime<Utc>>,
    ) -> DomainResult<SampleOutcome> {
        credential.check_scope(job_id, LocationCapability::UpdateLocation)?;
        self.ensure_traveler(job_id, credential)?;
        let coordinates = Coordinates::new(latitude, longitude)?;

        let now = Utc::now();
        let recorded_at = recorded_at.unwrap_or(now);
        if recorded_at > now + Duration::seconds(MAX_CLOCK_SKEW_SECS) {
            tracing::warn!(%job_id, %recorded_at, "sample dated in the future");
            return Err(DomainError::validation(format!(
                "recorded_at may not be more than {MAX_CLOCK_SKEW_SECS} seconds ahead of server time"
            )));
        }
        let sample = LocationSample {
            job_id,
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            recorded_at,
            emitter_role: credential.role(),
        };

        if let Some(mut session) = self.sessions.get_mut(&job_id) {
            session.last_activity = now;
        }

        if !self.samples.record_if_newer(&sample).await? {
            tracing::debug!(%job_id, recorded_at = %sample.recorded_at, "dropped out-of-order sample");
            return Ok(SampleOutcome::Dropped);
        }

        self.hub
            .publish(RoomKey::Job(job_id), RoomEvent::LocationUpdate(sample.clone()));
        Ok(SampleOutcome::Accepted(sample))
    }

    pub async fn end_travel(&self, job_id: JobId, credential: &TravelCredential) -> DomainResult<()> {
        credential.check_scope(job_id, LocationCapability::EndTravel)?;
        self.ensure_traveler(job_id, credential)?;

        let emitter = credential.emitter();
        if self
            .sessions
            .remove_if(&job_id, |_, session| session.emitter == emitter)
            .is_none()
        {
            return Err(DomainError::InvalidTransition(
                "no active travel session for this job".into(),
            ));
        }

        tracing::info!(%job_id, emitter = %credential.role(), "travel ended");
        self.publish_ended(job_id, TravelEndReason::Ended);
        Ok(())
    }

    /// Join the job's live feed. The last known sample, if any, is yielded
    /// before live events.
    pub async fn subscribe(&self, job_id: JobId, subscriber: &Actor) -> DomainResult<LocationSubscription> {
        let job = self.load(job_id).await?;
        ensure_party(&job, subscriber)?;

        let inner = self.hub.subscribe(RoomKey::Job(job_id));
        let pending = self.samples.latest(job_id).await?;
        Ok(LocationSubscription { pending, inner })
    }

    pub async fn travel_status(&self, job_id: JobId, actor: &Actor) -> DomainResult<TravelStatus> {
        let job = self.load(job_id).await?;
        ensure_party(&job, actor)?;

        let session = self.sessions.get(&job_id).map(|s| s.value().clone());
        Ok(TravelStatus {
            job_id,
            active: session.is_some(),
            emitter_role: session.as_ref().map(|s| s.role),
            started_at: session.as_ref().map(|s| s.started_at),
            last_sample: self.samples.latest(job_id).await?,
        })
    }

    /// Close any session on a job that has reached a terminal status.
    pub fn end_travel_for_job(&self, job_id: JobId) -> bool {
        if self.sessions.remove(&job_id).is_none() {
            return false;
        }
        tracing::info!(%job_id, "travel ended with job");
        self.publish_ended(job_id, TravelEndReason::JobClosed);
        true
    }

    /// Close sessions with no activity for the idle timeout. Returns the
    /// affected jobs.
    pub fn expire_idle_sessions(&self, now: DateTime<Utc>) -> Vec<JobId> {
        let idle = |session: &TravelSession| now - session.last_activity >= self.idle_timeout;

        let candidates: Vec<JobId> = self
            .sessions
            .iter()
            .filter(|entry| idle(entry.value()))
            .map(|entry| *entry.key())
            .collect();

        let mut expired = Vec::with_capacity(candidates.len());
        for job_id in candidates {
            if self
                .sessions
                .remove_if(&job_id, |_, session| idle(session))
                .is_some()
            {
                tracing::info!(%job_id, "travel session expired");
                self.publish_ended(job_id, TravelEndReason::Idle);
                expired.push(job_id);
            }
        }
        expired
    }

    fn ensure_traveler(&self, job_id: JobId, credential: &TravelCredential) -> DomainResult<()> {
        let Some(session) = self.sessions.get(&job_id) else {
            return Err(DomainError::InvalidTransition(
                "no active travel session for this job".into(),
            ));
        };
        if session.emitter != credential.emitter() {
            tracing::warn!(%job_id, "travel update from a non-owning emitter");
            return Err(DomainError::unauthorized(
                "travel session belongs to another emitter",
            ));
        }
        Ok(())
    }

    fn publish_ended(&self, job_id: JobId, reason: TravelEndReason) {
        self.hub
            .publish(RoomKey::Job(job_id), RoomEvent::TravelEnded { job_id, reason });
    }

    async fn load(&self, job_id: JobId) -> DomainResult<Job> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or(DomainError::NotFound("job"))
    }
}

#[async_trait]
impl JobClosedListener for LocationBroadcastChannel {
    async fn job_closed(&self, job_id: JobId) {
        self.end_travel_for_job(job_id);
    }
}

fn ensure_party(job: &Job, actor: &Actor) -> DomainResult<()> {
    if job.is_party(actor) {
        Ok(())
    } else {
        Err(DomainError::unauthorized(
            "only the posting customer or the assigned contractor can follow this job",
        ))
    }
}

/// Handle on a job's live feed. Dropping it unsubscribes.
#[derive(Debug)]
pub struct LocationSubscription {
    pending: Option<LocationSample>,
    inner: RoomSubscription,
}

impl LocationSubscription {
    pub fn job_id(&self) -> Option<JobId> {
        match self.inner.key() {
            RoomKey::Job(id) => Some(id),
            RoomKey::Actor(_) => None,
        }
    }

    pub async fn recv(&mut self) -> Result<RoomEvent, RecvError> {
        if let Some(sample) = self.pending.take() {
            return Ok(RoomEvent::LocationUpdate(sample));
        }
        self.inner.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryStore;
    use crewlink_model::{JobStatus, JobType};
    use rust_decimal::Decimal;

    struct Fixture {
        channel: LocationBroadcastChannel,
        job: Job,
        contractor: Actor,
        customer: Actor,
    }

    async fn fixture(status: JobStatus) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let contractor = Actor::contractor(UserId::new());
        let customer = Actor::customer(UserId::new());
        let now = Utc::now();
        let job = Job {
            id: JobId::new(),
            customer_id: customer.id,
            title: "Boiler".into(),
            status,
            job_type: JobType::Immediate,
            contractor_id: Some(contractor.id),
            workers_needed: 1,
            assigned_workers: Vec::new(),
            scheduled_start_date: None,
            advance_paid: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        };
        JobRepository::insert(store.as_ref(), &job).await.unwrap();

        Fixture {
            channel: LocationBroadcastChannel::new(store.clone(), store, RoomHub::new(16)),
            job,
            contractor,
            customer,
        }
    }

    fn worker(job_id: JobId, phone_hash: &str) -> TravelCredential {
        TravelCredential::Worker(TokenScope {
            job_id,
            worker_phone_hash: phone_hash.into(),
            capabilities: LocationCapability::WORKER_DEFAULT.to_vec(),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    #[tokio::test]
    async fn second_traveler_conflicts() {
        let fx = fixture(JobStatus::Accepted).await;
        let first = worker(fx.job.id, "a");

        fx.channel.start_travel(fx.job.id, &first).await.unwrap();
        fx.channel.start_travel(fx.job.id, &first).await.unwrap();

        let err = fx
            .channel
            .start_travel(fx.job.id, &TravelCredential::Contractor(fx.contractor))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn samples_need_the_owning_session() {
        let fx = fixture(JobStatus::InProgress).await;
        let owner = worker(fx.job.id, "a");

        let err = fx
            .channel
            .push_sample(fx.job.id, &owner, 1.0, 1.0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));

        fx.channel.start_travel(fx.job.id, &owner).await.unwrap();
        let err = fx
            .channel
            .push_sample(fx.job.id, &worker(fx.job.id, "b"), 1.0, 1.0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));

        let err = fx
            .channel
            .push_sample(fx.job.id, &owner, 91.0, 1.0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn token_for_another_job_is_rejected() {
        let fx = fixture(JobStatus::Accepted).await;
        let err = fx
            .channel
            .start_travel(fx.job.id, &worker(JobId::new(), "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn subscribers_get_last_known_sample_first() {
        let fx = fixture(JobStatus::Accepted).await;
        let traveler = TravelCredential::Contractor(fx.contractor);
        fx.channel.start_travel(fx.job.id, &traveler).await.unwrap();
        fx.channel
            .push_sample(fx.job.id, &traveler, 12.9, 77.6, None)
            .await
            .unwrap();

        let mut sub = fx.channel.subscribe(fx.job.id, &fx.customer).await.unwrap();
        match sub.recv().await.unwrap() {
            RoomEvent::LocationUpdate(sample) => assert_eq!(sample.latitude, 12.9),
            other => panic!("unexpected event {other:?}"),
        }

        fx.channel.end_travel(fx.job.id, &traveler).await.unwrap();
        assert_eq!(
            sub.recv().await.unwrap(),
            RoomEvent::TravelEnded {
                job_id: fx.job.id,
                reason: TravelEndReason::Ended
            }
        );
    }

    #[tokio::test]
    async fn strangers_cannot_subscribe() {
        let fx = fixture(JobStatus::Accepted).await;
        let err = fx
            .channel
            .subscribe(fx.job.id, &Actor::customer(UserId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let fx = fixture(JobStatus::Accepted).await;
        let channel = fx.channel.with_idle_timeout(Duration::minutes(5));
        channel
            .start_travel(fx.job.id, &worker(fx.job.id, "a"))
            .await
            .unwrap();

        assert!(channel.expire_idle_sessions(Utc::now()).is_empty());
        let expired = channel.expire_idle_sessions(Utc::now() + Duration::minutes(6));
        assert_eq!(expired, vec![fx.job.id]);

        let status = channel.travel_status(fx.job.id, &fx.customer).await.unwrap();
        assert!(!status.active);
    }

    #[tokio::test]
    async fn closing_the_job_ends_travel() {
        let fx = fixture(JobStatus::Accepted).await;
        fx.channel
            .start_travel(fx.job.id, &worker(fx.job.id, "a"))
            .await
            .unwrap();

        fx.channel.job_closed(fx.job.id).await;
        assert_eq!(fx.channel.active_sessions(), 0);
        assert!(!fx.channel.end_travel_for_job(fx.job.id));
    }

    #[tokio::test]
    async fn future_dated_samples_are_rejected() {
        let fx = fixture(JobStatus::Accepted).await;
        let traveler = TravelCredential::Contractor(fx.contractor);
        fx.channel.start_travel(fx.job.id, &traveler).await.unwrap();

        let err = fx
            .channel
            .push_sample(fx.job.id, &traveler, 1.0, 1.0, Some(Utc::now() + Duration::days(365)))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        // a little drift is tolerated and does not block the present
        let drifted = Utc::now() + Duration::seconds(30);
        let outcome = fx
            .channel
            .push_sample(fx.job.id, &traveler, 1.0, 1.0, Some(drifted))
            .await
            .unwrap();
        assert!(matches!(outcome, SampleOutcome::Accepted(_)));
        let status = fx.channel.travel_status(fx.job.id, &fx.customer).await.unwrap();
        assert_eq!(status.last_sample.map(|s| s.recorded_at), Some(drifted));
    }

    #[tokio::test]
    async fn a_new_session_starts_a_fresh_ordering_baseline() {
        let fx = fixture(JobStatus::InProgress).await;
        let traveler = worker(fx.job.id, "a");
        let base = Utc::now();

        fx.channel.start_travel(fx.job.id, &traveler).await.unwrap();
        fx.channel
            .push_sample(fx.job.id, &traveler, 1.0, 1.0, Some(base + Duration::seconds(60)))
            .await
            .unwrap();
        fx.channel.end_travel(fx.job.id, &traveler).await.unwrap();

        let status = fx.channel.start_travel(fx.job.id, &traveler).await.unwrap();
        assert!(status.last_sample.is_none());

        let outcome = fx
            .channel
            .push_sample(fx.job.id, &traveler, 2.0, 2.0, Some(base))
            .await
            .unwrap();
        assert!(matches!(outcome, SampleOutcome::Accepted(_)));

        // restarting the running session keeps its baseline
        fx.channel.start_travel(fx.job.id, &traveler).await.unwrap();
        let outcome = fx
            .channel
            .push_sample(fx.job.id, &traveler, 3.0, 3.0, Some(base - Duration::seconds(5)))
            .await
            .unwrap();
        assert_eq!(outcome, SampleOutcome::Dropped);
    }
}
