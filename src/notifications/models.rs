//! Notification data models

use serde::{Deserialize, Serialize};

/// Notification type enum. Informational only to the engine; producers pick
/// whichever fits and clients use it for grouping/rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    WorkoutReminder,
    SleepReminder,
    GoalAchieved,
    System,
    Custom,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::WorkoutReminder => "workout_reminder",
            NotificationType::SleepReminder => "sleep_reminder",
            NotificationType::GoalAchieved => "goal_achieved",
            NotificationType::System => "system",
            NotificationType::Custom => "custom",
        }
    }

    pub fn from_str_tag(s: &str) -> Option<Self> {
        match s {
            "workout_reminder" => Some(NotificationType::WorkoutReminder),
            "sleep_reminder" => Some(NotificationType::SleepReminder),
            "goal_achieved" => Some(NotificationType::GoalAchieved),
            "system" => Some(NotificationType::System),
            "custom" => Some(NotificationType::Custom),
            _ => None,
        }
    }
}

/// Display priority. Informational only to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Medium => "medium",
            NotificationPriority::High => "high",
        }
    }

    pub fn from_str_tag(s: &str) -> Option<Self> {
        match s {
            "low" => Some(NotificationPriority::Low),
            "medium" => Some(NotificationPriority::Medium),
            "high" => Some(NotificationPriority::High),
            _ => None,
        }
    }
}

/// A user notification.
///
/// All timestamps are epoch milliseconds. `scheduled_for` is non-null only
/// while the notification is pending future delivery; it is cleared when the
/// timer fires (it records the pending schedule, not history).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: usize,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub priority: NotificationPriority,
    pub read: bool,
    pub active: bool,
    pub action_link: Option<String>,
    pub metadata: serde_json::Value,
    pub scheduled_for: Option<i64>,
    pub expires_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for [`crate::notifications::NotificationEngine::create`].
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNotificationRequest {
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    #[serde(default)]
    pub priority: NotificationPriority,
    #[serde(default)]
    pub action_link: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub scheduled_for: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// Deserializes a present-but-possibly-null field into `Some(None)` for null
/// and `Some(Some(v))` for a value; an absent field stays `None` via
/// `#[serde(default)]`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial update for [`crate::notifications::NotificationEngine::update`].
///
/// `scheduled_for` distinguishes "absent" (leave scheduling alone) from
/// "null" (cancel any pending schedule) from "value" (reschedule).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub notification_type: Option<NotificationType>,
    #[serde(default)]
    pub priority: Option<NotificationPriority>,
    #[serde(default)]
    pub read: Option<bool>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub action_link: Option<Option<String>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "double_option")]
    pub scheduled_for: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub expires_at: Option<Option<i64>>,
}

impl NotificationPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.message.is_none()
            && self.notification_type.is_none()
            && self.priority.is_none()
            && self.read.is_none()
            && self.active.is_none()
            && self.action_link.is_none()
            && self.metadata.is_none()
            && self.scheduled_for.is_none()
            && self.expires_at.is_none()
    }
}

/// One page of a user's notifications plus the total row count for paging.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub total: usize,
}
