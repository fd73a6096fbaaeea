use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, Row, ToSql};
use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use crate::sqlite_persistence::BASE_DB_VERSION;

use super::models::{Notification, NotificationPriority, NotificationType};
use super::now_millis;
use super::schema::NOTIFICATION_VERSIONED_SCHEMAS;
use super::store::{NotificationFilter, NotificationStore, StorePatch};

#[derive(Clone)]
pub struct SqliteNotificationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteNotificationStore {
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let conn = if db_path.as_ref().exists() {
            Connection::open_with_flags(
                db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            let conn = Connection::open(db_path)?;
            NOTIFICATION_VERSIONED_SCHEMAS
                .last()
                .context("No schema versions defined")?
                .create(&conn)?;
            conn
        };

        let db_version = conn
            .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
            .context("Failed to read database version")?
            - BASE_DB_VERSION as i64;

        if db_version < 0 {
            bail!(
                "Notification database version {} predates base db version {}",
                db_version,
                BASE_DB_VERSION
            );
        }
        let version = db_version as usize;

        if version >= NOTIFICATION_VERSIONED_SCHEMAS.len() {
            bail!("Notification database version {} is too new", version);
        }
        NOTIFICATION_VERSIONED_SCHEMAS
            .get(version)
            .context("Failed to get schema")?
            .validate(&conn)?;

        Ok(SqliteNotificationStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn notification_from_row(row: &Row) -> rusqlite::Result<Notification> {
    let type_tag: String = row.get("notification_type")?;
    let priority_tag: String = row.get("priority")?;
    let metadata_json: String = row.get("metadata")?;
    Ok(Notification {
        id: row.get("id")?,
        user_id: row.get::<_, i64>("user_id")? as usize,
        title: row.get("title")?,
        message: row.get("message")?,
        notification_type: NotificationType::from_str_tag(&type_tag)
            .unwrap_or(NotificationType::Custom),
        priority: NotificationPriority::from_str_tag(&priority_tag)
            .unwrap_or(NotificationPriority::Medium),
        read: row.get("read")?,
        active: row.get("active")?,
        action_link: row.get("action_link")?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null),
        scheduled_for: row.get("scheduled_for")?,
        expires_at: row.get("expires_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Builds the WHERE clause and its parameters for a filter. Returns an empty
/// clause when the filter matches everything.
fn filter_clause(filter: &NotificationFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut conditions: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(user_id) = filter.user_id {
        values.push(Box::new(user_id as i64));
        conditions.push(format!("user_id = ?{}", values.len()));
    }
    if let Some(read) = filter.read {
        values.push(Box::new(read));
        conditions.push(format!("read = ?{}", values.len()));
    }
    if let Some(active) = filter.active {
        values.push(Box::new(active));
        conditions.push(format!("active = ?{}", values.len()));
    }
    if filter.scheduled_only {
        conditions.push("scheduled_for IS NOT NULL".to_string());
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

/// Builds the SET clause of a patch, starting parameter numbering after the
/// already-collected `values`. Always bumps `updated_at`.
fn patch_clause(patch: &StorePatch, values: &mut Vec<Box<dyn ToSql>>) -> String {
    let mut assignments: Vec<String> = Vec::new();

    if let Some(title) = &patch.title {
        values.push(Box::new(title.clone()));
        assignments.push(format!("title = ?{}", values.len()));
    }
    if let Some(message) = &patch.message {
        values.push(Box::new(message.clone()));
        assignments.push(format!("message = ?{}", values.len()));
    }
    if let Some(notification_type) = patch.notification_type {
        values.push(Box::new(notification_type.as_str()));
        assignments.push(format!("notification_type = ?{}", values.len()));
    }
    if let Some(priority) = patch.priority {
        values.push(Box::new(priority.as_str()));
        assignments.push(format!("priority = ?{}", values.len()));
    }
    if let Some(read) = patch.read {
        values.push(Box::new(read));
        assignments.push(format!("read = ?{}", values.len()));
    }
    if let Some(active) = patch.active {
        values.push(Box::new(active));
        assignments.push(format!("active = ?{}", values.len()));
    }
    if let Some(action_link) = &patch.action_link {
        values.push(Box::new(action_link.clone()));
        assignments.push(format!("action_link = ?{}", values.len()));
    }
    if let Some(metadata) = &patch.metadata {
        values.push(Box::new(metadata.to_string()));
        assignments.push(format!("metadata = ?{}", values.len()));
    }
    if let Some(scheduled_for) = patch.scheduled_for {
        values.push(Box::new(scheduled_for));
        assignments.push(format!("scheduled_for = ?{}", values.len()));
    }
    if let Some(expires_at) = patch.expires_at {
        values.push(Box::new(expires_at));
        assignments.push(format!("expires_at = ?{}", values.len()));
    }

    values.push(Box::new(now_millis()));
    assignments.push(format!("updated_at = ?{}", values.len()));

    assignments.join(", ")
}

impl NotificationStore for SqliteNotificationStore {
    fn insert(&self, notification: &Notification) -> Result<Notification> {
        let conn = self.conn.lock().unwrap();
        let now = now_millis();
        conn.execute(
            "INSERT INTO notification \
             (id, user_id, title, message, notification_type, priority, read, active, \
              action_link, metadata, scheduled_for, expires_at, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                notification.id,
                notification.user_id as i64,
                notification.title,
                notification.message,
                notification.notification_type.as_str(),
                notification.priority.as_str(),
                notification.read,
                notification.active,
                notification.action_link,
                notification.metadata.to_string(),
                notification.scheduled_for,
                notification.expires_at,
                now,
                now,
            ],
        )
        .with_context(|| format!("Failed to insert notification {}", notification.id))?;

        Ok(Notification {
            created_at: now,
            updated_at: now,
            ..notification.clone()
        })
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Notification>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM notification WHERE id = ?1")?;
        match stmt.query_row(params![id], notification_from_row) {
            Ok(notification) => Ok(Some(notification)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(err).with_context(|| format!("Failed to load notification {}", id)),
        }
    }

    fn find(
        &self,
        filter: &NotificationFilter,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, mut values) = filter_clause(filter);
        values.push(Box::new(limit as i64));
        let limit_param = values.len();
        values.push(Box::new(skip as i64));
        let skip_param = values.len();

        let sql = format!(
            "SELECT * FROM notification{} ORDER BY created_at DESC, id DESC LIMIT ?{} OFFSET ?{}",
            where_clause, limit_param, skip_param
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
            notification_from_row,
        )?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    fn count(&self, filter: &NotificationFilter) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, values) = filter_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM notification{}", where_clause);
        let count: i64 = conn.query_row(
            &sql,
            rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn update_one(&self, id: &str, patch: &StorePatch) -> Result<Option<Notification>> {
        {
            let conn = self.conn.lock().unwrap();
            let mut values: Vec<Box<dyn ToSql>> = Vec::new();
            let set_clause = patch_clause(patch, &mut values);
            values.push(Box::new(id.to_string()));
            let sql = format!(
                "UPDATE notification SET {} WHERE id = ?{}",
                set_clause,
                values.len()
            );
            let changed = conn.execute(
                &sql,
                rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
            )?;
            if changed == 0 {
                return Ok(None);
            }
        }
        self.find_by_id(id)
    }

    fn update_many(&self, filter: &NotificationFilter, patch: &StorePatch) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, mut values) = filter_clause(filter);
        let set_clause = patch_clause(patch, &mut values);
        let sql = format!("UPDATE notification SET {}{}", set_clause, where_clause);
        let changed = conn.execute(
            &sql,
            rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
        )?;
        Ok(changed)
    }

    fn delete_one(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM notification WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn delete_many(&self, filter: &NotificationFilter) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, values) = filter_clause(filter);
        let sql = format!("DELETE FROM notification{}", where_clause);
        let deleted = conn.execute(
            &sql,
            rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
        )?;
        Ok(deleted)
    }
}
