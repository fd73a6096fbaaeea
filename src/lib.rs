//! Promemoria Notification Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod notifications;
pub mod server;
pub mod sqlite_persistence;
pub mod user;

// Re-export commonly used types for convenience
pub use notifications::{NotificationEngine, ScheduleManager, SqliteNotificationStore};
pub use server::{run_server, RequestsLoggingLevel};
pub use user::{SqliteUserStore, UserManager, UserStore};
