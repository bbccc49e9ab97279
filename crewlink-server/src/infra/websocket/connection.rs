use anyhow::Result;
use chrono::Utc;
use crewlink_core::{
    domain::{ActiveJobSynchronizer, ActiveJobView, LocationSubscription},
    realtime::RoomSubscription,
};
use crewlink_model::{Actor, JobId, RoomEvent, RoomKey};
use dashmap::DashMap;
use std::fmt;
use tokio::{
    sync::{RwLock, broadcast::error::RecvError, mpsc, watch},
    task::JoinHandle,
};
use uuid::Uuid;

use super::messages::{ClientFrame, ControlFrame, ServerFrame};
use crate::infra::{app_state::AppState, errors::AppError};

pub struct Connection {
    /// Unique connection ID
    pub id: Uuid,
    pub actor: Actor,
    /// Channel to the socket writer
    sender: mpsc::Sender<ServerFrame>,
    /// Job rooms joined on this connection and their forwarding tasks
    rooms: DashMap<JobId, JoinHandle<()>>,
    /// Last ping timestamp for connection health
    last_ping: RwLock<i64>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("actor", &self.actor)
            .field("rooms", &self.joined_rooms())
            .field("channel_closed", &self.sender.is_closed())
            .finish()
    }
}

impl Connection {
    pub fn new(actor: Actor, sender: mpsc::Sender<ServerFrame>) -> Self {
        Self {
            id: Uuid::now_v7(),
            actor,
            sender,
            rooms: DashMap::new(),
            last_ping: RwLock::new(Utc::now().timestamp()),
        }
    }

    /// Send a frame to this connection
    pub async fn send(&self, frame: ServerFrame) -> Result<()> {
        self.sender
            .send(frame)
            .await
            .map_err(|_| anyhow::anyhow!("Failed to send frame: channel closed"))
    }

    pub fn sender(&self) -> mpsc::Sender<ServerFrame> {
        self.sender.clone()
    }

    pub fn joined_rooms(&self) -> Vec<JobId> {
        self.rooms.iter().map(|entry| *entry.key()).collect()
    }

    pub fn is_in_room(&self, job_id: JobId) -> bool {
        self.rooms.contains_key(&job_id)
    }

    fn attach_room(&self, job_id: JobId, forwarder: JoinHandle<()>) {
        if let Some(previous) = self.rooms.insert(job_id, forwarder) {
            previous.abort();
        }
    }

    fn detach_room(&self, job_id: JobId) -> bool {
        match self.rooms.remove(&job_id) {
            Some((_, forwarder)) => {
                forwarder.abort();
                true
            }
            None => false,
        }
    }

    /// Stop forwarding every joined room.
    pub fn close(&self) {
        self.rooms.retain(|_, forwarder| {
            forwarder.abort();
            false
        });
    }

    pub async fn update_ping(&self) {
        *self.last_ping.write().await = Utc::now().timestamp();
    }

    /// Pinged within the last 60 seconds
    pub async fn is_healthy(&self) -> bool {
        let last_ping = *self.last_ping.read().await;
        Utc::now().timestamp() - last_ping < 60
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Apply one client frame. Failures the client can act on are answered
/// with an `error` frame; only a closed channel is returned as an error.
pub async fn handle_client_frame(
    state: &AppState,
    conn: &Connection,
    frame: ClientFrame,
) -> Result<()> {
    match frame {
        ClientFrame::Ping => {
            conn.update_ping().await;
            conn.send(ServerFrame::Control(ControlFrame::Pong)).await
        }
        ClientFrame::JoinJobRoom { job_id } => {
            match state.location.subscribe(job_id, &conn.actor).await {
                Ok(subscription) => {
                    let forwarder =
                        tokio::spawn(forward_job_room(conn.sender(), subscription));
                    conn.attach_room(job_id, forwarder);
                    tracing::debug!(conn_id = %conn.id, %job_id, "joined job room");
                    conn.send(ServerFrame::Control(ControlFrame::Joined { job_id }))
                        .await
                }
                Err(err) => {
                    let err = AppError::from(err);
                    conn.send(ServerFrame::error(err.message)).await
                }
            }
        }
        ClientFrame::LeaveJobRoom { job_id } => {
            if conn.detach_room(job_id) {
                conn.send(ServerFrame::Control(ControlFrame::Left { job_id }))
                    .await
            } else {
                conn.send(ServerFrame::error(format!("not in room for job {job_id}")))
                    .await
            }
        }
    }
}

/// Lifecycle events already reach both parties through their actor rooms,
/// so a job room only contributes travel traffic.
fn is_travel_traffic(event: &RoomEvent) -> bool {
    matches!(
        event,
        RoomEvent::LocationUpdate(_)
            | RoomEvent::TravelStarted { .. }
            | RoomEvent::TravelEnded { .. }
    )
}

async fn forward_job_room(
    sender: mpsc::Sender<ServerFrame>,
    mut subscription: LocationSubscription,
) {
    loop {
        match subscription.recv().await {
            Ok(event) if is_travel_traffic(&event) => {
                if sender.send(event.into()).await.is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(job_id = ?subscription.job_id(), skipped, "job room forwarder lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn forward_actor_room(
    sender: mpsc::Sender<ServerFrame>,
    mut subscription: RoomSubscription,
) {
    loop {
        match subscription.recv().await {
            Ok(event) => {
                if sender.send(event.into()).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(room = %subscription.key(), skipped, "actor room forwarder lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn active_job_frame(view: &ActiveJobView) -> ServerFrame {
    ServerFrame::Control(ControlFrame::ActiveJob {
        job: view.job.clone(),
        unread_notifications: view.unread_notifications,
    })
}

async fn forward_active_job(
    sender: mpsc::Sender<ServerFrame>,
    mut views: watch::Receiver<ActiveJobView>,
) {
    while views.changed().await.is_ok() {
        let frame = {
            let view = views.borrow_and_update();
            if !view.hydrated {
                continue;
            }
            active_job_frame(&view)
        };
        if sender.send(frame).await.is_err() {
            break;
        }
    }
}

/// Per-connection feeds that follow the actor rather than a job: the
/// actor room and the active-job view. Dropping it stops both.
pub struct ActorFeeds {
    synchronizer: ActiveJobSynchronizer,
    tasks: Vec<JoinHandle<()>>,
}

impl fmt::Debug for ActorFeeds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorFeeds")
            .field("synchronizer", &self.synchronizer)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl ActorFeeds {
    /// Subscribe to the actor room, hydrate the active-job view and push
    /// its first snapshot.
    pub async fn attach(state: &AppState, conn: &Connection) -> Result<Self> {
        let actor_room = state.hub.subscribe(RoomKey::Actor(conn.actor.id));
        let mut synchronizer = state.synchronizer();
        let view = synchronizer.init(conn.actor).await?;

        let tasks = vec![
            tokio::spawn(forward_actor_room(conn.sender(), actor_room)),
            tokio::spawn(forward_active_job(conn.sender(), synchronizer.watch())),
        ];
        conn.send(active_job_frame(&view)).await?;

        Ok(Self {
            synchronizer,
            tasks,
        })
    }

    pub fn snapshot(&self) -> ActiveJobView {
        self.synchronizer.snapshot()
    }
}

impl Drop for ActorFeeds {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.synchronizer.teardown();
    }
}
