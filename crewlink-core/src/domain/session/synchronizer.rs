use std::{any::type_name_of_val, fmt, mem::replace, sync::Arc};

use crewlink_model::{Actor, ActorRole, Job, JobId, RoomEvent, RoomKey};
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;

use crate::database::ports::{JobRepository, NotificationRepository};
use crate::error::{DomainError, DomainResult};
use crate::realtime::{RoomHub, RoomSubscription};

/// What a signed-in actor currently sees as "my job".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveJobView {
    pub actor: Option<Actor>,
    pub job: Option<Job>,
    pub unread_notifications: u64,
    /// False until the first query after `init` has landed.
    pub hydrated: bool,
}

struct Shared {
    jobs: Arc<dyn JobRepository>,
    notifications: Arc<dyn NotificationRepository>,
    state: watch::Sender<ActiveJobView>,
}

impl Shared {
    async fn hydrate(&self, actor: Actor) -> DomainResult<ActiveJobView> {
        let job = match actor.role {
            ActorRole::Contractor => self.jobs.find_active_for_contractor(actor.id).await?,
            ActorRole::Customer => self.jobs.find_active_for_customer(actor.id).await?,
        };
        let unread_notifications = self.notifications.unread_count(actor.id).await?;

        let view = ActiveJobView {
            actor: Some(actor),
            job,
            unread_notifications,
            hydrated: true,
        };
        self.state.send_replace(view.clone());
        Ok(view)
    }

    async fn apply(&self, actor: Actor, event: RoomEvent) -> DomainResult<()> {
        match event {
            RoomEvent::JobAccepted { job_id, .. } | RoomEvent::JobStarted { job_id } => {
                let job = self.jobs.get(job_id).await?;
                if let Some(job) = job.filter(|job| is_active_for(job, &actor)) {
                    self.state.send_modify(|view| view.job = Some(job));
                }
            }
            RoomEvent::JobCompleted { job_id }
            | RoomEvent::JobCancelled { job_id, .. }
            | RoomEvent::JobDisputed { job_id, .. } => {
                self.state.send_if_modified(|view| clear_if_current(view, job_id));
            }
            // the stored count is authoritative; an event may describe a
            // notification the last hydrate already counted
            RoomEvent::Notification { .. } | RoomEvent::NotificationsRead { .. } => {
                let unread = self.notifications.unread_count(actor.id).await?;
                self.state
                    .send_if_modified(|view| replace(&mut view.unread_notifications, unread) != unread);
            }
            _ => {}
        }
        Ok(())
    }
}

fn is_active_for(job: &Job, actor: &Actor) -> bool {
    match actor.role {
        ActorRole::Contractor => job.is_assigned_to(actor.id) && job.status.is_engaged(),
        ActorRole::Customer => job.is_customer(actor.id) && !job.status.is_terminal(),
    }
}

fn clear_if_current(view: &mut ActiveJobView, job_id: JobId) -> bool {
    if view.job.as_ref().is_some_and(|job| job.id == job_id) {
        view.job = None;
        true
    } else {
        false
    }
}

/// Keeps an [`ActiveJobView`] current for one actor.
///
/// `init` subscribes to the actor's room before querying, so no event
/// between the query and the subscription is lost. Lifecycle events are
/// applied incrementally; a lagged receiver or an explicit `reconnect`
/// re-queries instead of trusting the stream.
pub struct ActiveJobSynchronizer {
    shared: Arc<Shared>,
    hub: RoomHub,
    worker: Option<JoinHandle<()>>,
}

impl fmt::Debug for ActiveJobSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveJobSynchronizer")
            .field("jobs", &type_name_of_val(self.shared.jobs.as_ref()))
            .field("view", &*self.shared.state.borrow())
            .field("running", &self.worker.is_some())
            .finish()
    }
}

impl ActiveJobSynchronizer {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        notifications: Arc<dyn NotificationRepository>,
        hub: RoomHub,
    ) -> Self {
        let (state, _) = watch::channel(ActiveJobView::default());
        Self {
            shared: Arc::new(Shared {
                jobs,
                notifications,
                state,
            }),
            hub,
            worker: None,
        }
    }

    /// A receiver that observes every view change.
    pub fn watch(&self) -> watch::Receiver<ActiveJobView> {
        self.shared.state.subscribe()
    }

    pub fn snapshot(&self) -> ActiveJobView {
        self.shared.state.borrow().clone()
    }

    pub async fn init(&mut self, actor: Actor) -> DomainResult<ActiveJobView> {
        self.teardown();

        let subscription = self.hub.subscribe(RoomKey::Actor(actor.id));
        let view = self.shared.hydrate(actor).await?;
        self.worker = Some(tokio::spawn(follow(
            Arc::clone(&self.shared),
            actor,
            subscription,
        )));

        tracing::debug!(actor_id = %actor.id, job_id = ?view.job.as_ref().map(|j| j.id), "active job synchronizer started");
        Ok(view)
    }

    /// Re-query and replace the view. Requires a prior `init`.
    pub async fn reconnect(&self) -> DomainResult<ActiveJobView> {
        let actor = self
            .shared
            .state
            .borrow()
            .actor
            .ok_or_else(|| DomainError::validation("synchronizer has not been initialised"))?;
        self.shared.hydrate(actor).await
    }

    /// Stop following events and reset the view.
    pub fn teardown(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        self.shared.state.send_replace(ActiveJobView::default());
    }
}

impl Drop for ActiveJobSynchronizer {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

async fn follow(shared: Arc<Shared>, actor: Actor, mut subscription: RoomSubscription) {
    loop {
        let outcome = match subscription.recv().await {
            Ok(event) => shared.apply(actor, event).await,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(actor_id = %actor.id, skipped, "actor room lagged; re-querying");
                shared.hydrate(actor).await.map(|_| ())
            }
            Err(RecvError::Closed) => break,
        };
        if let Err(err) = outcome {
            tracing::error!(actor_id = %actor.id, error = %err, "failed to refresh active job");
        }
    }
}
