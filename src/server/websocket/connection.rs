//! WebSocket connection manager.
//!
//! Tracks all active WebSocket connections, organized per user. Delivery
//! fan-out is strictly scoped to the owning user's connections; there is no
//! broadcast-to-all path for notification payloads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, RwLock};

use super::messages::ServerMessage;

/// Error type for targeted send operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SendError {
    /// The target connection is not registered.
    NotConnected,
    /// The connection channel is closed (client went away).
    Disconnected,
}

/// Manages all active WebSocket connections.
///
/// Connections are organized by user_id, then by connection id, so a user
/// with several live clients (phone + browser) gets every push on each of
/// them.
pub struct ConnectionManager {
    /// user_id -> (connection_id -> outgoing sender)
    connections: RwLock<HashMap<usize, HashMap<u64, mpsc::Sender<ServerMessage>>>>,
    next_connection_id: AtomicU64,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Register a new connection for `user_id`.
    ///
    /// Returns the connection id and a receiver for outgoing messages; the
    /// caller forwards messages from the receiver to the socket.
    pub async fn register(&self, user_id: usize) -> (u64, mpsc::Receiver<ServerMessage>) {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(32);

        let mut conns = self.connections.write().await;
        conns.entry(user_id).or_default().insert(connection_id, tx);

        (connection_id, rx)
    }

    /// Unregister a connection (called on disconnect). Cleans up the user's
    /// entry when their last connection goes away.
    pub async fn unregister(&self, user_id: usize, connection_id: u64) {
        let mut conns = self.connections.write().await;
        if let Some(user_conns) = conns.get_mut(&user_id) {
            user_conns.remove(&connection_id);
            if user_conns.is_empty() {
                conns.remove(&user_id);
            }
        }
    }

    /// Send a message to one specific connection.
    pub async fn send_to_connection(
        &self,
        user_id: usize,
        connection_id: u64,
        message: ServerMessage,
    ) -> Result<(), SendError> {
        let conns = self.connections.read().await;
        if let Some(user_conns) = conns.get(&user_id) {
            if let Some(sender) = user_conns.get(&connection_id) {
                sender
                    .send(message)
                    .await
                    .map_err(|_| SendError::Disconnected)?;
                return Ok(());
            }
        }
        Err(SendError::NotConnected)
    }

    /// Push a message to ALL connections of a user. Best effort: a user with
    /// no live connection silently receives nothing.
    ///
    /// Returns the connection ids that failed (closed channels).
    pub async fn broadcast_to_user(&self, user_id: usize, message: ServerMessage) -> Vec<u64> {
        let conns = self.connections.read().await;
        let mut failed = Vec::new();

        if let Some(user_conns) = conns.get(&user_id) {
            for (connection_id, sender) in user_conns.iter() {
                if sender.send(message.clone()).await.is_err() {
                    failed.push(*connection_id);
                }
            }
        }

        failed
    }

    /// Whether the user has at least one live connection.
    pub async fn is_user_connected(&self, user_id: usize) -> bool {
        let conns = self.connections.read().await;
        conns.contains_key(&user_id)
    }

    /// Number of live connections for a user.
    pub async fn connection_count(&self, user_id: usize) -> usize {
        let conns = self.connections.read().await;
        conns.get(&user_id).map(|c| c.len()).unwrap_or(0)
    }

    /// Total number of live connections across all users.
    pub async fn total_connections(&self) -> usize {
        let conns = self.connections.read().await;
        conns.values().map(|c| c.len()).sum()
    }
}
