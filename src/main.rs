use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod notifications;
use notifications::{NotificationEngine, ScheduleManager, SqliteNotificationStore};

mod server;
use server::websocket::ConnectionManager;
use server::{run_server, RequestsLoggingLevel};

mod sqlite_persistence;

mod user;
use user::SqliteUserStore;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite database file to use for user storage.
    #[clap(value_parser = parse_path)]
    pub user_db: PathBuf,

    /// Path to the SQLite database file to use for notification storage.
    #[clap(value_parser = parse_path)]
    pub notifications_db: PathBuf,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    info!("Initializing metrics...");
    server::metrics::init_metrics();

    info!("Opening user database at {:?}...", cli_args.user_db);
    let user_store = Box::new(SqliteUserStore::new(&cli_args.user_db)?);

    info!(
        "Opening notifications database at {:?}...",
        cli_args.notifications_db
    );
    let notification_store = Arc::new(SqliteNotificationStore::new(&cli_args.notifications_db)?);

    let connection_manager = Arc::new(ConnectionManager::new());
    let schedule_manager = Arc::new(ScheduleManager::new());
    let notification_engine = Arc::new(NotificationEngine::new(
        notification_store,
        schedule_manager,
        connection_manager.clone(),
    ));

    // Timers do not survive restarts; re-arm or fire whatever the previous
    // process left scheduled before accepting traffic.
    let resynced = notification_engine.resync_pending().await?;
    if resynced > 0 {
        info!("Resynced {} scheduled notifications", resynced);
    }

    info!("Ready to serve at port {}!", cli_args.port);
    info!("Metrics available at port {}!", cli_args.metrics_port);
    run_server(
        user_store,
        notification_engine,
        connection_manager,
        cli_args.logging_level,
        cli_args.port,
        cli_args.metrics_port,
    )
    .await
}
