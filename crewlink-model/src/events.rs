use std::fmt::{self, Display};

use chrono::{DateTime, Utc};

use crate::actor::ActorRole;
use crate::ids::{JobId, UserId};
use crate::location::{EmitterRole, LocationSample};

/// Address of a fan-out room.
///
/// Job rooms carry travel and lifecycle traffic for one job; actor rooms
/// carry everything addressed to one account across all of its jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKey {
    Job(JobId),
    Actor(UserId),
}

impl Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomKey::Job(id) => write!(f, "job:{id}"),
            RoomKey::Actor(id) => write!(f, "actor:{id}"),
        }
    }
}

/// Events delivered to room subscribers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "event"))]
pub enum RoomEvent {
    #[cfg_attr(feature = "serde", serde(rename = "job:accepted"))]
    JobAccepted {
        job_id: JobId,
        contractor_id: UserId,
    },
    #[cfg_attr(feature = "serde", serde(rename = "job:started"))]
    JobStarted { job_id: JobId },
    #[cfg_attr(feature = "serde", serde(rename = "job:completed"))]
    JobCompleted { job_id: JobId },
    #[cfg_attr(feature = "serde", serde(rename = "job:cancelled"))]
    JobCancelled { job_id: JobId, by: ActorRole },
    #[cfg_attr(feature = "serde", serde(rename = "job:disputed"))]
    JobDisputed { job_id: JobId, by: ActorRole },
    #[cfg_attr(feature = "serde", serde(rename = "location:update"))]
    LocationUpdate(LocationSample),
    #[cfg_attr(feature = "serde", serde(rename = "travel:started"))]
    TravelStarted {
        job_id: JobId,
        emitter_role: EmitterRole,
        started_at: DateTime<Utc>,
    },
    #[cfg_attr(feature = "serde", serde(rename = "travel:ended"))]
    TravelEnded { job_id: JobId, reason: TravelEndReason },
    #[cfg_attr(feature = "serde", serde(rename = "notification"))]
    Notification {
        job_id: Option<JobId>,
        title: String,
        message: String,
    },
    /// The user cleared their unread notifications.
    #[cfg_attr(feature = "serde", serde(rename = "notifications:read"))]
    NotificationsRead { user_id: UserId, marked: u64 },
}

impl RoomEvent {
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            RoomEvent::JobAccepted { job_id, .. }
            | RoomEvent::JobStarted { job_id }
            | RoomEvent::JobCompleted { job_id }
            | RoomEvent::JobCancelled { job_id, .. }
            | RoomEvent::JobDisputed { job_id, .. }
            | RoomEvent::TravelStarted { job_id, .. }
            | RoomEvent::TravelEnded { job_id, .. } => Some(*job_id),
            RoomEvent::LocationUpdate(sample) => Some(sample.job_id),
            RoomEvent::Notification { job_id, .. } => *job_id,
            RoomEvent::NotificationsRead { .. } => None,
        }
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::JobAccepted { .. } => "job:accepted",
            RoomEvent::JobStarted { .. } => "job:started",
            RoomEvent::JobCompleted { .. } => "job:completed",
            RoomEvent::JobCancelled { .. } => "job:cancelled",
            RoomEvent::JobDisputed { .. } => "job:disputed",
            RoomEvent::LocationUpdate(_) => "location:update",
            RoomEvent::TravelStarted { .. } => "travel:started",
            RoomEvent::TravelEnded { .. } => "travel:ended",
            RoomEvent::Notification { .. } => "notification",
            RoomEvent::NotificationsRead { .. } => "notifications:read",
        }
    }

    /// Whether the event ends the job's engagement.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RoomEvent::JobCompleted { .. }
                | RoomEvent::JobCancelled { .. }
                | RoomEvent::JobDisputed { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TravelEndReason {
    /// The emitter ended travel explicitly.
    Ended,
    /// No samples arrived within the idle timeout.
    Idle,
    /// The job reached a terminal status.
    JobClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_keys_are_distinct_per_kind() {
        let raw = uuid::Uuid::from_u128(5);
        assert_ne!(RoomKey::Job(JobId(raw)), RoomKey::Actor(UserId(raw)));
        assert!(RoomKey::Job(JobId(raw)).to_string().starts_with("job:"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn events_are_tagged_with_wire_names() {
        let job_id = JobId(uuid::Uuid::from_u128(9));
        let sample = LocationSample {
            job_id,
            latitude: 12.9,
            longitude: 77.6,
            recorded_at: DateTime::<Utc>::from_timestamp(10, 0).unwrap(),
            emitter_role: EmitterRole::Worker,
        };
        let event = RoomEvent::LocationUpdate(sample);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "location:update");
        assert_eq!(value["latitude"], 12.9);
        assert_eq!(value["emitter_role"], "worker");
        assert_eq!(event.name(), "location:update");

        let cancelled = serde_json::to_value(RoomEvent::JobCancelled {
            job_id,
            by: ActorRole::Customer,
        })
        .unwrap();
        assert_eq!(cancelled["event"], "job:cancelled");
        assert_eq!(cancelled["by"], "CUSTOMER");

        let read = RoomEvent::NotificationsRead {
            user_id: UserId(uuid::Uuid::from_u128(3)),
            marked: 2,
        };
        assert_eq!(read.job_id(), None);
        assert_eq!(serde_json::to_value(&read).unwrap()["event"], read.name());
    }
}
