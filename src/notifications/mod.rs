//! User notifications: data model, persistence, scheduling and the engine
//! orchestrating them.

mod engine;
mod models;
mod scheduler;
mod schema;
mod sqlite_store;
mod store;

pub use engine::{NotificationEngine, NotificationError};
pub use models::{
    CreateNotificationRequest, Notification, NotificationPage, NotificationPatch,
    NotificationPriority, NotificationType,
};
pub use scheduler::ScheduleManager;
pub use sqlite_store::SqliteNotificationStore;
pub use store::{NotificationFilter, NotificationStore, StorePatch};

/// Current wall-clock time in epoch milliseconds, the time unit used for all
/// notification timestamps.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
