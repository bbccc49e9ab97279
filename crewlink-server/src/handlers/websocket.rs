use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use crewlink_model::Actor;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::infra::{
    app_state::AppState,
    websocket::{
        ActorFeeds, ClientFrame, Connection, ServerFrame, frame_to_websocket,
        handle_client_frame,
    },
};

/// Handle WebSocket upgrade request
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, actor))
}

/// Drive one socket until the client leaves or the writer fails.
async fn handle_socket(socket: WebSocket, state: AppState, actor: Actor) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerFrame>(100);

    let connection = Arc::new(Connection::new(actor, tx));
    let conn_id = connection.id;
    state.websocket_manager.add_connection(connection.clone());
    tracing::debug!(%conn_id, actor_id = %actor.id, "websocket connected");

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame_to_websocket(&frame) {
                Ok(message) => {
                    if ws_sender.send(message).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::error!(event = frame.event_name(), error = %err, "failed to encode frame")
                }
            }
        }
    });

    let feeds = match ActorFeeds::attach(&state, &connection).await {
        Ok(feeds) => Some(feeds),
        Err(err) => {
            tracing::error!(%conn_id, error = %err, "failed to attach actor feeds");
            None
        }
    };

    if feeds.is_some() {
        while let Some(msg) = ws_receiver.next().await {
            let frame = match msg {
                Ok(Message::Text(text)) => serde_json::from_str::<ClientFrame>(text.as_str()),
                Ok(Message::Binary(bin)) => serde_json::from_slice::<ClientFrame>(bin.as_ref()),
                Ok(Message::Ping(_)) => {
                    connection.update_ping().await;
                    continue;
                }
                Ok(Message::Close(_)) => break,
                Ok(Message::Pong(_)) => continue,
                Err(err) => {
                    tracing::debug!(%conn_id, error = %err, "websocket error");
                    break;
                }
            };

            let outcome = match frame {
                Ok(frame) => handle_client_frame(&state, &connection, frame).await,
                Err(err) => {
                    connection
                        .send(ServerFrame::error(format!("unrecognised frame: {err}")))
                        .await
                }
            };
            if outcome.is_err() {
                break;
            }
        }
    }

    drop(feeds);
    state.websocket_manager.remove_connection(conn_id);
    drop(connection);
    writer.abort();
    tracing::debug!(%conn_id, "websocket disconnected");
}
