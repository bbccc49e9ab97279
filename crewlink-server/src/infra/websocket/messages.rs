use axum::extract::ws::Message;
use crewlink_model::{Job, JobId, RoomEvent};
use serde::{Deserialize, Serialize};

/// Frames a client may send over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientFrame {
    JoinJobRoom { job_id: JobId },
    LeaveJobRoom { job_id: JobId },
    Ping,
}

/// Connection-level replies that are not room traffic.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControlFrame {
    Pong,
    Joined {
        job_id: JobId,
    },
    Left {
        job_id: JobId,
    },
    Error {
        message: String,
    },
    ActiveJob {
        job: Option<Job>,
        unread_notifications: u64,
    },
}

/// Everything the server writes to a socket. Both variants carry an
/// `event` field, so clients dispatch on it alone.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Room(RoomEvent),
    Control(ControlFrame),
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Control(ControlFrame::Error {
            message: message.into(),
        })
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            ServerFrame::Room(event) => event.name(),
            ServerFrame::Control(ControlFrame::Pong) => "pong",
            ServerFrame::Control(ControlFrame::Joined { .. }) => "joined",
            ServerFrame::Control(ControlFrame::Left { .. }) => "left",
            ServerFrame::Control(ControlFrame::Error { .. }) => "error",
            ServerFrame::Control(ControlFrame::ActiveJob { .. }) => "active_job",
        }
    }
}

impl From<RoomEvent> for ServerFrame {
    fn from(event: RoomEvent) -> Self {
        ServerFrame::Room(event)
    }
}

pub fn frame_to_websocket(frame: &ServerFrame) -> Result<Message, serde_json::Error> {
    let json = serde_json::to_string(frame)?;
    Ok(Message::Text(json.into()))
}
