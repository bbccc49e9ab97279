use std::{any::type_name_of_val, fmt, sync::Arc};

use chrono::Utc;
use crewlink_model::{Job, JobId, RoomEvent, RoomKey, UserId};

use crate::database::ports::notifications::{NewNotification, NotificationRepository};
use crate::error::StoreResult;
use crate::realtime::RoomHub;

/// Publishes lifecycle events and stored notifications to rooms.
#[derive(Clone)]
pub struct Announcer {
    hub: RoomHub,
    notifications: Arc<dyn NotificationRepository>,
}

impl fmt::Debug for Announcer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Announcer")
            .field("hub", &self.hub)
            .field("notifications", &type_name_of_val(self.notifications.as_ref()))
            .finish()
    }
}

impl Announcer {
    pub fn new(hub: RoomHub, notifications: Arc<dyn NotificationRepository>) -> Self {
        Self { hub, notifications }
    }

    pub fn hub(&self) -> &RoomHub {
        &self.hub
    }

    /// Rooms that follow a job: the job's own room plus both parties.
    pub fn rooms_for(job: &Job) -> Vec<RoomKey> {
        let mut rooms = vec![RoomKey::Job(job.id), RoomKey::Actor(job.customer_id)];
        if let Some(contractor) = job.contractor_id {
            rooms.push(RoomKey::Actor(contractor));
        }
        rooms
    }

    pub fn job_event(&self, job: &Job, event: RoomEvent) -> usize {
        self.hub.publish_all(&Self::rooms_for(job), &event)
    }

    /// Persist a notification for `user` and push it to their actor room.
    ///
    /// The triggering operation has already committed, so storage failures
    /// are logged rather than returned.
    pub async fn notify(
        &self,
        user_id: UserId,
        job_id: Option<JobId>,
        title: &str,
        message: impl Into<String>,
    ) {
        let message = message.into();
        let stored = self
            .notifications
            .push(
                NewNotification {
                    user_id,
                    job_id,
                    title: title.to_string(),
                    message: message.clone(),
                },
                Utc::now(),
            )
            .await;

        if let Err(err) = stored {
            tracing::error!(%user_id, error = %err, "failed to store notification");
            return;
        }

        self.hub.publish(
            RoomKey::Actor(user_id),
            RoomEvent::Notification {
                job_id,
                title: title.to_string(),
                message,
            },
        );
    }

    /// Mark everything unread for `user_id` as read and tell their live
    /// views. Returns how many notifications changed.
    pub async fn mark_all_read(&self, user_id: UserId) -> StoreResult<u64> {
        let marked = self.notifications.mark_all_read(user_id, Utc::now()).await?;
        if marked > 0 {
            self.hub.publish(
                RoomKey::Actor(user_id),
                RoomEvent::NotificationsRead { user_id, marked },
            );
        }
        Ok(marked)
    }
}
