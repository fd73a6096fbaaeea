use axum::extract::FromRef;

use crate::notifications::NotificationEngine;
use crate::user::UserManager;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::websocket::ConnectionManager;
use super::ServerConfig;

pub type GuardedUserManager = Arc<Mutex<UserManager>>;
pub type GuardedConnectionManager = Arc<ConnectionManager>;
pub type GuardedNotificationEngine = Arc<NotificationEngine>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub user_manager: GuardedUserManager,
    pub notification_engine: GuardedNotificationEngine,
    pub ws_connection_manager: GuardedConnectionManager,
    pub hash: String,
}

impl FromRef<ServerState> for GuardedUserManager {
    fn from_ref(input: &ServerState) -> Self {
        input.user_manager.clone()
    }
}

impl FromRef<ServerState> for GuardedNotificationEngine {
    fn from_ref(input: &ServerState) -> Self {
        input.notification_engine.clone()
    }
}

impl FromRef<ServerState> for GuardedConnectionManager {
    fn from_ref(input: &ServerState) -> Self {
        input.ws_connection_manager.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
