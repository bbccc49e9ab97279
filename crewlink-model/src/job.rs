use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::actor::Actor;
use crate::error::ModelError;
use crate::ids::{JobId, UserId, WorkerId};

/// Lifecycle status of a job.
///
/// The allowed moves form a one-way graph:
///
/// ```text
/// PENDING ──► QUOTED ──► ACCEPTED ──► IN_PROGRESS ──► COMPLETED
///    └──────────────────────▲
/// (any non-terminal) ──► CANCELLED | DISPUTED
/// ```
///
/// `PENDING → QUOTED` only happens for bidding jobs and `PENDING → ACCEPTED`
/// only for claimable jobs; those job-type checks live with the operations,
/// this type only knows the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum JobStatus {
    Pending,
    Quoted,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
    Disputed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::Pending,
        JobStatus::Quoted,
        JobStatus::Accepted,
        JobStatus::InProgress,
        JobStatus::Completed,
        JobStatus::Cancelled,
        JobStatus::Disputed,
    ];

    /// States with no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Cancelled | JobStatus::Disputed
        )
    }

    /// Statuses in which a job can still receive quotes or claims.
    pub fn is_open(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Quoted)
    }

    /// Statuses in which a contractor is assigned and work is live.
    pub fn is_engaged(&self) -> bool {
        matches!(self, JobStatus::Accepted | JobStatus::InProgress)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;

        if self.is_terminal() {
            return false;
        }

        match next {
            Cancelled | Disputed => true,
            Quoted => *self == Pending,
            Accepted => matches!(self, Pending | Quoted),
            InProgress => *self == Accepted,
            Completed => *self == InProgress,
            Pending => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Quoted => "QUOTED",
            JobStatus::Accepted => "ACCEPTED",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Disputed => "DISPUTED",
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ModelError::UnknownVariant {
                kind: "job status",
                value: s.to_string(),
            })
    }
}

/// How a job finds its contractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum JobType {
    /// First contractor to claim wins.
    Immediate,
    /// Claimable like `Immediate`, with a start date in the future.
    Scheduled,
    /// Contractors submit quotes; the customer accepts one.
    Bidding,
}

impl JobType {
    pub fn is_claimable(&self) -> bool {
        matches!(self, JobType::Immediate | JobType::Scheduled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Immediate => "IMMEDIATE",
            JobType::Scheduled => "SCHEDULED",
            JobType::Bidding => "BIDDING",
        }
    }
}

impl Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IMMEDIATE" => Ok(JobType::Immediate),
            "SCHEDULED" => Ok(JobType::Scheduled),
            "BIDDING" => Ok(JobType::Bidding),
            other => Err(ModelError::UnknownVariant {
                kind: "job type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Job {
    pub id: JobId,
    pub customer_id: UserId,
    pub title: String,
    pub status: JobStatus,
    pub job_type: JobType,
    pub contractor_id: Option<UserId>,
    pub workers_needed: u32,
    pub assigned_workers: Vec<WorkerId>,
    pub scheduled_start_date: Option<DateTime<Utc>>,
    pub advance_paid: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn is_customer(&self, user: UserId) -> bool {
        self.customer_id == user
    }

    pub fn is_assigned_to(&self, user: UserId) -> bool {
        self.contractor_id == Some(user)
    }

    /// Whether the actor is one of the two parties of this job.
    pub fn is_party(&self, actor: &Actor) -> bool {
        (actor.is_customer() && self.is_customer(actor.id))
            || (actor.is_contractor() && self.is_assigned_to(actor.id))
    }
}

/// Payload for posting a new job.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NewJob {
    pub title: String,
    pub job_type: JobType,
    #[cfg_attr(feature = "serde", serde(default = "default_workers_needed"))]
    pub workers_needed: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub scheduled_start_date: Option<DateTime<Utc>>,
}

#[cfg(feature = "serde")]
fn default_workers_needed() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [JobStatus::Completed, JobStatus::Cancelled, JobStatus::Disputed] {
            for to in JobStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn happy_path_is_allowed() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Quoted));
        assert!(JobStatus::Quoted.can_transition_to(JobStatus::Accepted));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Accepted));
        assert!(JobStatus::Accepted.can_transition_to(JobStatus::InProgress));
        assert!(JobStatus::InProgress.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn graph_never_moves_backwards() {
        assert!(!JobStatus::Quoted.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Accepted.can_transition_to(JobStatus::Quoted));
        assert!(!JobStatus::InProgress.can_transition_to(JobStatus::Accepted));
        assert!(!JobStatus::Accepted.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn cancel_and_dispute_from_any_live_state() {
        for from in [
            JobStatus::Pending,
            JobStatus::Quoted,
            JobStatus::Accepted,
            JobStatus::InProgress,
        ] {
            assert!(from.can_transition_to(JobStatus::Cancelled));
            assert!(from.can_transition_to(JobStatus::Disputed));
        }
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("ARCHIVED".parse::<JobStatus>().is_err());
    }
}
