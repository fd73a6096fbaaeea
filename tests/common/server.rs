//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own databases on a random
//! port. Dropping the server shuts it down and cleans up temp files.

use super::constants::*;
use super::fixtures::create_test_user_db;
use promemoria_server::notifications::{
    NotificationEngine, ScheduleManager, SqliteNotificationStore,
};
use promemoria_server::server::websocket::ConnectionManager;
use promemoria_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use promemoria_server::user::SqliteUserStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Engine handle for seeding notifications the way in-process
    /// producers would
    pub notification_engine: Arc<NotificationEngine>,

    // Private fields - keep resources alive until drop
    _temp_db_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port and waits for it to be
    /// ready.
    pub async fn spawn() -> Self {
        let (temp_db_dir, user_db_path) =
            create_test_user_db().expect("Failed to create test user db");

        let user_store =
            Box::new(SqliteUserStore::new(&user_db_path).expect("Failed to open user store"));

        let notifications_db_path = temp_db_dir.path().join("notifications.db");
        let notification_store = Arc::new(
            SqliteNotificationStore::new(&notifications_db_path)
                .expect("Failed to open notification store"),
        );

        let connection_manager = Arc::new(ConnectionManager::new());
        let notification_engine = Arc::new(NotificationEngine::new(
            notification_store,
            Arc::new(ScheduleManager::new()),
            connection_manager.clone(),
        ));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
        };

        let app = make_app(
            config,
            user_store,
            notification_engine.clone(),
            connection_manager,
        )
        .expect("Failed to build app");

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            notification_engine,
            _temp_db_dir: temp_db_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the / endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => {
                    return;
                }
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
        // TempDir cleans up the databases automatically
    }
}
