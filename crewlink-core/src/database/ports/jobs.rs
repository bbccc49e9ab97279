use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crewlink_model::{Job, JobId, JobStatus, UserId, WorkerId};

use crate::error::StoreResult;

/// Expected state of the contractor slot for a conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractorGuard {
    Any,
    Unset,
    Assigned,
    Is(UserId),
}

impl ContractorGuard {
    pub fn matches(&self, contractor_id: Option<UserId>) -> bool {
        match self {
            ContractorGuard::Any => true,
            ContractorGuard::Unset => contractor_id.is_none(),
            ContractorGuard::Assigned => contractor_id.is_some(),
            ContractorGuard::Is(expected) => contractor_id == Some(*expected),
        }
    }
}

/// Precondition of a compare-and-set on a job row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobGuard {
    pub statuses: Vec<JobStatus>,
    pub contractor: ContractorGuard,
}

impl JobGuard {
    pub fn status_in(statuses: &[JobStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            contractor: ContractorGuard::Any,
        }
    }

    pub fn with_contractor(mut self, contractor: ContractorGuard) -> Self {
        self.contractor = contractor;
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.statuses.contains(&job.status) && self.contractor.matches(job.contractor_id)
    }
}

/// Fields written when a guard holds. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub contractor_id: Option<UserId>,
    pub assigned_workers: Option<Vec<WorkerId>>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply(self, job: &mut Job, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(contractor_id) = self.contractor_id {
            job.contractor_id = Some(contractor_id);
        }
        if let Some(workers) = self.assigned_workers {
            job.assigned_workers = workers;
        }
        job.updated_at = now;
    }
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: &Job) -> StoreResult<()>;

    async fn get(&self, id: JobId) -> StoreResult<Option<Job>>;

    /// Atomically apply `update` if the stored job satisfies `guard`.
    ///
    /// Returns the updated job, or `None` when the job is missing or the
    /// guard did not hold. Exactly one of several racing callers with the
    /// same guard observes `Some`.
    async fn compare_and_set(
        &self,
        id: JobId,
        guard: &JobGuard,
        update: JobUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Job>>;

    /// Most recently updated ACCEPTED or IN_PROGRESS job assigned to the
    /// contractor.
    async fn find_active_for_contractor(&self, contractor_id: UserId) -> StoreResult<Option<Job>>;

    /// Most recently updated non-terminal job posted by the customer.
    async fn find_active_for_customer(&self, customer_id: UserId) -> StoreResult<Option<Job>>;
}
