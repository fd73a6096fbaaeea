//! Notification storage trait

use anyhow::Result;

use super::models::{Notification, NotificationPriority, NotificationType};

/// Row filter for find/count/bulk operations.
///
/// All set fields are ANDed together. `scheduled_only` selects rows with a
/// non-null `scheduled_for`.
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    pub user_id: Option<usize>,
    pub read: Option<bool>,
    pub active: Option<bool>,
    pub scheduled_only: bool,
}

impl NotificationFilter {
    pub fn for_user(user_id: usize) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }
}

/// Field-level patch applied by `update_one`/`update_many`.
///
/// Double options (`scheduled_for`, `action_link`, `expires_at`) can set the
/// column to NULL; single options leave the column alone when `None`.
/// `updated_at` is maintained by the store on every write.
#[derive(Debug, Clone, Default)]
pub struct StorePatch {
    pub title: Option<String>,
    pub message: Option<String>,
    pub notification_type: Option<NotificationType>,
    pub priority: Option<NotificationPriority>,
    pub read: Option<bool>,
    pub active: Option<bool>,
    pub action_link: Option<Option<String>>,
    pub metadata: Option<serde_json::Value>,
    pub scheduled_for: Option<Option<i64>>,
    pub expires_at: Option<Option<i64>>,
}

impl StorePatch {
    pub fn clear_scheduled_for() -> Self {
        Self {
            scheduled_for: Some(None),
            ..Self::default()
        }
    }

    pub fn mark_read() -> Self {
        Self {
            read: Some(true),
            ..Self::default()
        }
    }
}

/// Trait for notification storage operations.
///
/// Implementations are sync; the engine treats every call as a potential
/// suspension point by never holding other locks across them.
pub trait NotificationStore: Send + Sync {
    /// Insert a fully-formed notification row. The caller assigns the id
    /// and the initial `created_at`/`updated_at` timestamps.
    fn insert(&self, notification: &Notification) -> Result<Notification>;

    /// Fetch a single notification by id, regardless of owner.
    fn find_by_id(&self, id: &str) -> Result<Option<Notification>>;

    /// Fetch matching notifications ordered by `created_at` DESC, with
    /// skip/limit paging.
    fn find(
        &self,
        filter: &NotificationFilter,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Notification>>;

    /// Count matching notifications.
    fn count(&self, filter: &NotificationFilter) -> Result<usize>;

    /// Apply a patch to one row. Returns the updated row, or None if the id
    /// does not exist.
    fn update_one(&self, id: &str, patch: &StorePatch) -> Result<Option<Notification>>;

    /// Apply a patch to every matching row. Returns the number of rows
    /// changed.
    fn update_many(&self, filter: &NotificationFilter, patch: &StorePatch) -> Result<usize>;

    /// Delete one row. Returns whether a row existed.
    fn delete_one(&self, id: &str) -> Result<bool>;

    /// Delete every matching row. Returns the number of rows deleted.
    fn delete_many(&self, filter: &NotificationFilter) -> Result<usize>;
}
