use crate::infra::websocket::connection::Connection;
use crewlink_model::{JobId, UserId};
use dashmap::DashMap;
use std::{fmt, sync::Arc};
use uuid::Uuid;

/// Registry of live sockets. Room fan-out itself goes through the
/// [`RoomHub`](crewlink_core::realtime::RoomHub); this only tracks who is
/// connected and which job rooms they joined.
#[derive(Clone)]
pub struct ConnectionManager {
    /// Active WebSocket connections mapped by connection ID
    connections: Arc<DashMap<Uuid, Arc<Connection>>>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connection_count", &self.connections.len())
            .finish()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
        }
    }

    /// Register a new connection
    pub fn add_connection(&self, connection: Arc<Connection>) {
        self.connections.insert(connection.id, connection);
    }

    /// Remove a connection and stop its room forwarders
    pub fn remove_connection(&self, conn_id: Uuid) -> Option<Arc<Connection>> {
        let (_, connection) = self.connections.remove(&conn_id)?;
        connection.close();
        Some(connection)
    }

    pub fn get_connection(&self, conn_id: &Uuid) -> Option<Arc<Connection>> {
        self.connections.get(conn_id).map(|c| c.clone())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// All sockets opened by one account
    pub fn connections_for_actor(&self, user_id: UserId) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .filter(|entry| entry.value().actor.id == user_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Connections currently joined to a job's room
    pub fn room_members(&self, job_id: JobId) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .filter(|entry| entry.value().is_in_room(job_id))
            .map(|entry| entry.value().clone())
            .collect()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
