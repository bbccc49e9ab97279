use std::{any::type_name_of_val, fmt, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use crewlink_model::{
    Actor, ActorRole, Job, JobId, JobStatus, JobType, NewJob, RoomEvent, WorkerId,
};
use rust_decimal::Decimal;

use super::CancellationPolicy;
use crate::database::ports::{ContractorGuard, JobGuard, JobRepository, JobUpdate};
use crate::error::{DomainError, DomainResult};
use crate::realtime::Announcer;

const MAX_TITLE_LENGTH: usize = 200;
const MAX_WORKERS_NEEDED: u32 = 50;

const LIVE_STATUSES: [JobStatus; 4] = [
    JobStatus::Pending,
    JobStatus::Quoted,
    JobStatus::Accepted,
    JobStatus::InProgress,
];

/// Notified after a job reaches a terminal status.
#[async_trait]
pub trait JobClosedListener: Send + Sync {
    async fn job_closed(&self, job_id: JobId);
}

/// Owns every job status transition.
///
/// Each operation checks the caller and the current status, then commits
/// through a compare-and-set on the job row. When the compare-and-set loses
/// a race the job is re-read to report why.
#[derive(Clone)]
pub struct JobStateMachine {
    jobs: Arc<dyn JobRepository>,
    announcer: Announcer,
    policy: CancellationPolicy,
    listeners: Vec<Arc<dyn JobClosedListener>>,
}

impl fmt::Debug for JobStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobStateMachine")
            .field("jobs", &type_name_of_val(self.jobs.as_ref()))
            .field("announcer", &self.announcer)
            .field("policy", &self.policy)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl JobStateMachine {
    pub fn new(jobs: Arc<dyn JobRepository>, announcer: Announcer) -> Self {
        Self {
            jobs,
            announcer,
            policy: CancellationPolicy::default(),
            listeners: Vec::new(),
        }
    }

    pub fn with_cancellation_policy(mut self, policy: CancellationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn JobClosedListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn cancellation_policy(&self) -> CancellationPolicy {
        self.policy
    }

    pub async fn post_job(&self, actor: &Actor, new_job: NewJob) -> DomainResult<Job> {
        if !actor.is_customer() {
            return Err(DomainError::unauthorized("only customers can post jobs"));
        }

        let title = new_job.title.trim();
        if title.is_empty() || title.chars().count() > MAX_TITLE_LENGTH {
            return Err(DomainError::validation(format!(
                "title must be between 1 and {MAX_TITLE_LENGTH} characters"
            )));
        }
        if new_job.workers_needed == 0 || new_job.workers_needed > MAX_WORKERS_NEEDED {
            return Err(DomainError::validation(format!(
                "workers_needed must be between 1 and {MAX_WORKERS_NEEDED}"
            )));
        }

        let now = Utc::now();
        match (new_job.job_type, new_job.scheduled_start_date) {
            (JobType::Scheduled, None) => {
                return Err(DomainError::validation(
                    "scheduled jobs need a scheduled_start_date",
                ));
            }
            (_, Some(start)) if start <= now => {
                return Err(DomainError::validation(
                    "scheduled_start_date must be in the future",
                ));
            }
            _ => {}
        }

        let job = Job {
            id: JobId::new(),
            customer_id: actor.id,
            title: title.to_string(),
            status: JobStatus::Pending,
            job_type: new_job.job_type,
            contractor_id: None,
            workers_needed: new_job.workers_needed,
            assigned_workers: Vec::new(),
            scheduled_start_date: new_job.scheduled_start_date,
            advance_paid: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        };
        self.jobs.insert(&job).await?;

        tracing::info!(job_id = %job.id, customer_id = %actor.id, job_type = %job.job_type, "job posted");
        Ok(job)
    }

    pub async fn get_job(&self, job_id: JobId, actor: &Actor) -> DomainResult<Job> {
        let job = self.load(job_id).await?;
        let visible = job.is_party(actor) || (actor.is_contractor() && job.status.is_open());
        if !visible {
            return Err(DomainError::unauthorized("job is not visible to this account"));
        }
        Ok(job)
    }

    /// First-come claim of an IMMEDIATE or SCHEDULED job. Of several
    /// concurrent claims exactly one succeeds; the rest get `Conflict`.
    pub async fn claim(
        &self,
        job_id: JobId,
        actor: &Actor,
        worker_ids: Vec<WorkerId>,
    ) -> DomainResult<Job> {
        if !actor.is_contractor() {
            return Err(DomainError::unauthorized("only contractors can claim jobs"));
        }

        let job = self.load(job_id).await?;
        if !job.job_type.is_claimable() {
            return Err(DomainError::validation(
                "bidding jobs are awarded through quotes, not claims",
            ));
        }
        if job.status.is_terminal() {
            return Err(DomainError::transition(job.status, JobStatus::Accepted));
        }
        if job.status != JobStatus::Pending || job.contractor_id.is_some() {
            return Err(DomainError::conflict("job has already been claimed"));
        }
        let workers = normalize_workers(&job, worker_ids)?;

        let guard = JobGuard::status_in(&[JobStatus::Pending]).with_contractor(ContractorGuard::Unset);
        let update = JobUpdate {
            status: Some(JobStatus::Accepted),
            contractor_id: Some(actor.id),
            assigned_workers: Some(workers),
        };

        let Some(claimed) = self
            .jobs
            .compare_and_set(job_id, &guard, update, Utc::now())
            .await?
        else {
            let err = self
                .explain_rejection(job_id, JobStatus::Accepted, "job has already been claimed")
                .await;
            tracing::debug!(%job_id, contractor_id = %actor.id, error = %err, "claim lost");
            return Err(err);
        };

        self.finish(
            &claimed,
            job.status,
            actor,
            RoomEvent::JobAccepted {
                job_id,
                contractor_id: actor.id,
            },
        )
        .await;
        self.announcer
            .notify(
                claimed.customer_id,
                Some(job_id),
                "Job accepted",
                format!("A contractor accepted \"{}\"", claimed.title),
            )
            .await;

        Ok(claimed)
    }

    /// Replace the worker set of an engaged job.
    pub async fn assign_workers(
        &self,
        job_id: JobId,
        actor: &Actor,
        worker_ids: Vec<WorkerId>,
    ) -> DomainResult<Job> {
        let job = self.load(job_id).await?;
        ensure_assigned_contractor(&job, actor)?;
        if !job.status.is_engaged() {
            return Err(DomainError::InvalidTransition(format!(
                "workers can only be assigned while a job is ACCEPTED or IN_PROGRESS, not {}",
                job.status
            )));
        }
        let workers = normalize_workers(&job, worker_ids)?;

        let guard = JobGuard::status_in(&[JobStatus::Accepted, JobStatus::InProgress])
            .with_contractor(ContractorGuard::Is(actor.id));
        let update = JobUpdate {
            assigned_workers: Some(workers),
            ..JobUpdate::default()
        };

        let updated = self
            .jobs
            .compare_and_set(job_id, &guard, update, Utc::now())
            .await?
            .ok_or_else(|| DomainError::conflict("job changed while assigning workers"))?;

        tracing::info!(%job_id, workers = updated.assigned_workers.len(), "workers assigned");
        Ok(updated)
    }

    pub async fn start(&self, job_id: JobId, actor: &Actor) -> DomainResult<Job> {
        let job = self.load(job_id).await?;
        ensure_assigned_contractor(&job, actor)?;
        let job = self
            .advance(&job, actor, JobStatus::InProgress, ContractorGuard::Is(actor.id))
            .await?;

        self.announcer
            .notify(
                job.customer_id,
                Some(job_id),
                "Work started",
                format!("Work on \"{}\" has started", job.title),
            )
            .await;
        Ok(job)
    }

    pub async fn complete(&self, job_id: JobId, actor: &Actor) -> DomainResult<Job> {
        let job = self.load(job_id).await?;
        ensure_assigned_contractor(&job, actor)?;
        let job = self
            .advance(&job, actor, JobStatus::Completed, ContractorGuard::Is(actor.id))
            .await?;

        self.announcer
            .notify(
                job.customer_id,
                Some(job_id),
                "Job completed",
                format!("\"{}\" was marked complete", job.title),
            )
            .await;
        Ok(job)
    }

    pub async fn cancel(&self, job_id: JobId, actor: &Actor) -> DomainResult<Job> {
        let job = self.load(job_id).await?;
        ensure_party(&job, actor)?;
        if job.status.is_terminal() {
            return Err(DomainError::transition(job.status, JobStatus::Cancelled));
        }

        let in_progress_allowed = self.policy.permits_in_progress(actor.role);
        if job.status == JobStatus::InProgress && !in_progress_allowed {
            return Err(DomainError::InvalidTransition(format!(
                "an IN_PROGRESS job cannot be cancelled by the {} (policy: {})",
                actor.role.as_str().to_ascii_lowercase(),
                self.policy
            )));
        }

        let statuses: &[JobStatus] = if in_progress_allowed {
            &LIVE_STATUSES
        } else {
            &LIVE_STATUSES[..3]
        };
        let guard = JobGuard::status_in(statuses).with_contractor(party_guard(actor));
        let cancelled = self
            .commit(&job, guard, JobStatus::Cancelled)
            .await?;

        self.finish(
            &cancelled,
            job.status,
            actor,
            RoomEvent::JobCancelled {
                job_id,
                by: actor.role,
            },
        )
        .await;
        self.notify_counterparty(&cancelled, actor, "Job cancelled", "was cancelled")
            .await;
        Ok(cancelled)
    }

    pub async fn dispute(&self, job_id: JobId, actor: &Actor) -> DomainResult<Job> {
        let job = self.load(job_id).await?;
        ensure_party(&job, actor)?;
        if job.status.is_terminal() {
            return Err(DomainError::transition(job.status, JobStatus::Disputed));
        }
        if job.contractor_id.is_none() {
            return Err(DomainError::InvalidTransition(
                "a job can only be disputed once a contractor is assigned".into(),
            ));
        }

        let contractor = match actor.role {
            ActorRole::Customer => ContractorGuard::Assigned,
            ActorRole::Contractor => ContractorGuard::Is(actor.id),
        };
        let guard = JobGuard::status_in(&LIVE_STATUSES).with_contractor(contractor);
        let disputed = self.commit(&job, guard, JobStatus::Disputed).await?;

        self.finish(
            &disputed,
            job.status,
            actor,
            RoomEvent::JobDisputed {
                job_id,
                by: actor.role,
            },
        )
        .await;
        self.notify_counterparty(&disputed, actor, "Job disputed", "was disputed")
            .await;
        Ok(disputed)
    }

    /// The caller's current job: for a contractor the most recent
    /// ACCEPTED/IN_PROGRESS assignment, for a customer the most recently
    /// updated non-terminal posting.
    pub async fn active_job(&self, actor: &Actor) -> DomainResult<Option<Job>> {
        let job = match actor.role {
            ActorRole::Contractor => self.jobs.find_active_for_contractor(actor.id).await?,
            ActorRole::Customer => self.jobs.find_active_for_customer(actor.id).await?,
        };
        Ok(job)
    }

    async fn load(&self, job_id: JobId) -> DomainResult<Job> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or(DomainError::NotFound("job"))
    }

    /// Move along the forward path (`from` is the only accepted source).
    async fn advance(
        &self,
        job: &Job,
        actor: &Actor,
        to: JobStatus,
        contractor: ContractorGuard,
    ) -> DomainResult<Job> {
        if !job.status.can_transition_to(to) {
            return Err(DomainError::transition(job.status, to));
        }
        let guard = JobGuard::status_in(&[job.status]).with_contractor(contractor);
        let updated = self.commit(job, guard, to).await?;

        let event = match to {
            JobStatus::InProgress => RoomEvent::JobStarted { job_id: job.id },
            _ => RoomEvent::JobCompleted { job_id: job.id },
        };
        self.finish(&updated, job.status, actor, event).await;
        Ok(updated)
    }

    async fn commit(&self, job: &Job, guard: JobGuard, to: JobStatus) -> DomainResult<Job> {
        match self
            .jobs
            .compare_and_set(job.id, &guard, JobUpdate::status(to), Utc::now())
            .await?
        {
            Some(updated) => Ok(updated),
            None => Err(self
                .explain_rejection(job.id, to, "job changed concurrently")
                .await),
        }
    }

    async fn explain_rejection(&self, job_id: JobId, to: JobStatus, conflict: &str) -> DomainError {
        match self.jobs.get(job_id).await {
            Ok(Some(current)) if !current.status.can_transition_to(to) => {
                if current.status.is_terminal() {
                    DomainError::transition(current.status, to)
                } else {
                    DomainError::conflict(conflict)
                }
            }
            Ok(Some(_)) => DomainError::conflict(conflict),
            Ok(None) => DomainError::NotFound("job"),
            Err(err) => err.into(),
        }
    }

    async fn finish(&self, job: &Job, from: JobStatus, actor: &Actor, event: RoomEvent) {
        tracing::info!(
            job_id = %job.id,
            from = %from,
            to = %job.status,
            actor_id = %actor.id,
            role = %actor.role,
            "job transition"
        );

        self.announcer.job_event(job, event);

        if job.status.is_terminal() {
            for listener in &self.listeners {
                listener.job_closed(job.id).await;
            }
        }
    }

    async fn notify_counterparty(&self, job: &Job, actor: &Actor, title: &str, verb: &str) {
        let recipient = match actor.role {
            ActorRole::Customer => job.contractor_id,
            ActorRole::Contractor => Some(job.customer_id),
        };
        if let Some(recipient) = recipient {
            self.announcer
                .notify(recipient, Some(job.id), title, format!("\"{}\" {verb}", job.title))
                .await;
        }
    }
}

fn ensure_assigned_contractor(job: &Job, actor: &Actor) -> DomainResult<()> {
    if actor.is_contractor() && job.is_assigned_to(actor.id) {
        Ok(())
    } else {
        Err(DomainError::unauthorized(
            "only the assigned contractor can do this",
        ))
    }
}

fn ensure_party(job: &Job, actor: &Actor) -> DomainResult<()> {
    if job.is_party(actor) {
        Ok(())
    } else {
        Err(DomainError::unauthorized(
            "only the posting customer or the assigned contractor can do this",
        ))
    }
}

fn party_guard(actor: &Actor) -> ContractorGuard {
    match actor.role {
        ActorRole::Customer => ContractorGuard::Any,
        ActorRole::Contractor => ContractorGuard::Is(actor.id),
    }
}

/// Collapse duplicates (first occurrence wins) and enforce `workers_needed`.
fn normalize_workers(job: &Job, worker_ids: Vec<WorkerId>) -> DomainResult<Vec<WorkerId>> {
    let mut workers = Vec::with_capacity(worker_ids.len());
    for id in worker_ids {
        if !workers.contains(&id) {
            workers.push(id);
        }
    }
    if workers.len() > job.workers_needed as usize {
        return Err(DomainError::validation(format!(
            "{} workers assigned but the job needs at most {}",
            workers.len(),
            job.workers_needed
        )));
    }
    Ok(workers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryStore;
    use crate::realtime::RoomHub;
    use crewlink_model::{RoomKey, UserId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener(AtomicUsize);

    #[async_trait]
    impl JobClosedListener for CountingListener {
        async fn job_closed(&self, _job_id: JobId) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn machine() -> (JobStateMachine, RoomHub) {
        let store = Arc::new(InMemoryStore::new());
        let hub = RoomHub::new(16);
        let machine = JobStateMachine::new(store.clone(), Announcer::new(hub.clone(), store));
        (machine, hub)
    }

    fn immediate(title: &str) -> NewJob {
        NewJob {
            title: title.into(),
            job_type: JobType::Immediate,
            workers_needed: 2,
            scheduled_start_date: None,
        }
    }

    #[tokio::test]
    async fn full_forward_path() {
        let (machine, _) = machine();
        let customer = Actor::customer(UserId::new());
        let contractor = Actor::contractor(UserId::new());

        let job = machine.post_job(&customer, immediate("Fix sink")).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        let job = machine.claim(job.id, &contractor, vec![]).await.unwrap();
        assert_eq!(job.status, JobStatus::Accepted);
        assert_eq!(job.contractor_id, Some(contractor.id));

        let job = machine.start(job.id, &contractor).await.unwrap();
        assert_eq!(job.status, JobStatus::InProgress);

        let job = machine.complete(job.id, &contractor).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn claim_rejects_bidding_jobs() {
        let (machine, _) = machine();
        let customer = Actor::customer(UserId::new());
        let job = machine
            .post_job(
                &customer,
                NewJob {
                    job_type: JobType::Bidding,
                    ..immediate("Roof")
                },
            )
            .await
            .unwrap();

        let err = machine
            .claim(job.id, &Actor::contractor(UserId::new()), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn second_claim_conflicts() {
        let (machine, _) = machine();
        let customer = Actor::customer(UserId::new());
        let job = machine.post_job(&customer, immediate("Move sofa")).await.unwrap();

        machine
            .claim(job.id, &Actor::contractor(UserId::new()), vec![])
            .await
            .unwrap();
        let err = machine
            .claim(job.id, &Actor::contractor(UserId::new()), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn start_requires_assigned_contractor() {
        let (machine, _) = machine();
        let customer = Actor::customer(UserId::new());
        let contractor = Actor::contractor(UserId::new());
        let job = machine.post_job(&customer, immediate("Tiles")).await.unwrap();
        machine.claim(job.id, &contractor, vec![]).await.unwrap();

        let err = machine
            .start(job.id, &Actor::contractor(UserId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn in_progress_cancellation_follows_policy() {
        let (machine, _) = machine();
        let customer = Actor::customer(UserId::new());
        let contractor = Actor::contractor(UserId::new());
        let job = machine.post_job(&customer, immediate("Garden")).await.unwrap();
        machine.claim(job.id, &contractor, vec![]).await.unwrap();
        machine.start(job.id, &contractor).await.unwrap();

        let err = machine.cancel(job.id, &customer).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));

        let permissive = machine
            .clone()
            .with_cancellation_policy(CancellationPolicy::Customer);
        let err = permissive.cancel(job.id, &contractor).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));
        let cancelled = permissive.cancel(job.id, &customer).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn dispute_needs_a_contractor() {
        let (machine, _) = machine();
        let customer = Actor::customer(UserId::new());
        let job = machine.post_job(&customer, immediate("Fence")).await.unwrap();

        let err = machine.dispute(job.id, &customer).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn terminal_transitions_notify_listeners_and_rooms() {
        let (machine, hub) = machine();
        let listener = Arc::new(CountingListener(AtomicUsize::new(0)));
        let machine = machine.with_listener(listener.clone());
        let customer = Actor::customer(UserId::new());
        let contractor = Actor::contractor(UserId::new());
        let job = machine.post_job(&customer, immediate("Wiring")).await.unwrap();
        machine.claim(job.id, &contractor, vec![]).await.unwrap();

        let mut room = hub.subscribe(RoomKey::Job(job.id));
        machine.dispute(job.id, &contractor).await.unwrap();

        assert_eq!(
            room.recv().await.unwrap(),
            RoomEvent::JobDisputed {
                job_id: job.id,
                by: ActorRole::Contractor
            }
        );
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn assign_workers_collapses_duplicates_and_checks_capacity() {
        let (machine, _) = machine();
        let customer = Actor::customer(UserId::new());
        let contractor = Actor::contractor(UserId::new());
        let job = machine.post_job(&customer, immediate("Paint")).await.unwrap();
        machine.claim(job.id, &contractor, vec![]).await.unwrap();

        let worker = WorkerId::new();
        let job = machine
            .assign_workers(job.id, &contractor, vec![worker, worker])
            .await
            .unwrap();
        assert_eq!(job.assigned_workers, vec![worker]);

        let err = machine
            .assign_workers(
                job.id,
                &contractor,
                vec![WorkerId::new(), WorkerId::new(), WorkerId::new()],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn open_jobs_are_visible_to_any_contractor() {
        let (machine, _) = machine();
        let customer = Actor::customer(UserId::new());
        let job = machine.post_job(&customer, immediate("Shelves")).await.unwrap();

        assert!(machine
            .get_job(job.id, &Actor::contractor(UserId::new()))
            .await
            .is_ok());
        assert!(matches!(
            machine
                .get_job(job.id, &Actor::customer(UserId::new()))
                .await,
            Err(DomainError::Unauthorized(_))
        ));
    }
}
