//! SQLite schema definitions for the notification database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

pub const NOTIFICATION_TABLE: Table = Table {
    name: "notification",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true, non_null = true),
        sqlite_column!("user_id", &SqlType::Integer, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("message", &SqlType::Text, non_null = true),
        sqlite_column!("notification_type", &SqlType::Text, non_null = true),
        sqlite_column!("priority", &SqlType::Text, non_null = true),
        sqlite_column!("read", &SqlType::Integer, non_null = true),
        sqlite_column!("active", &SqlType::Integer, non_null = true),
        sqlite_column!("action_link", &SqlType::Text),
        sqlite_column!("metadata", &SqlType::Text, non_null = true), // JSON object
        sqlite_column!("scheduled_for", &SqlType::Integer),
        sqlite_column!("expires_at", &SqlType::Integer),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_notification_user_id", "user_id"),
        ("idx_notification_scheduled_for", "scheduled_for"),
    ],
};

pub const NOTIFICATION_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[NOTIFICATION_TABLE],
    migration: None,
}];
