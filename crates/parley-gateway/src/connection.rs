//! Connection handles and the bounded connection pool

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::protocol::ServerFrame;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Connection closed")]
    Closed,
}

/// Sending side of one live connection.
///
/// Frames are queued and written by the connection's own task, in order.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: String,
    pub addr: SocketAddr,
    sender: mpsc::UnboundedSender<ServerFrame>,
}

impl ConnectionHandle {
    pub fn new(id: String, addr: SocketAddr, sender: mpsc::UnboundedSender<ServerFrame>) -> Self {
        Self { id, addr, sender }
    }

    /// Queue a frame for this connection
    pub fn send(&self, frame: ServerFrame) -> Result<(), ConnectionError> {
        self.sender.send(frame).map_err(|_| ConnectionError::Closed)
    }
}

/// Live connections, capped at `max_connections`
#[derive(Debug)]
pub struct ConnectionPool {
    connections: Arc<Mutex<HashMap<String, ConnectionHandle>>>,
    max_connections: usize,
}

impl ConnectionPool {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Arc::new(Mutex::new(HashMap::new())),
            max_connections,
        }
    }

    pub async fn count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Add a connection unless the pool is at capacity
    pub async fn try_add(&self, handle: ConnectionHandle) -> bool {
        let mut connections = self.connections.lock().await;
        if connections.len() >= self.max_connections {
            return false;
        }
        connections.insert(handle.id.clone(), handle);
        true
    }

    pub async fn remove(&self, connection_id: &str) -> Option<ConnectionHandle> {
        self.connections.lock().await.remove(connection_id)
    }
}
