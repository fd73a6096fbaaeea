//! Notification engine: orchestrates persistence, delivery timers and
//! WebSocket fan-out.
//!
//! Every by-id operation takes the requester's user id and collapses
//! ownership mismatches into [`NotificationError::NotFound`], so callers
//! cannot probe other users' notification ids. Delivery is best effort: a
//! user with no live connection receives nothing over the socket and catches
//! up through the read API.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::server::metrics;
use crate::server::websocket::messages::{msg_types, ServerMessage};
use crate::server::websocket::ConnectionManager;

use super::models::{
    CreateNotificationRequest, Notification, NotificationPage, NotificationPatch,
};
use super::store::{NotificationFilter, NotificationStore, StorePatch};
use super::{now_millis, ScheduleManager};

/// Hard cap on page size for listing queries.
const MAX_PAGE_LIMIT: usize = 100;

/// Limit value meaning "every matching row". `i64::MAX` rather than
/// `usize::MAX` because the store binds limits as SQL integers.
const NO_LIMIT: usize = i64::MAX as usize;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Notification not found")]
    NotFound,
    #[error("Storage error: {0}")]
    Persistence(#[from] anyhow::Error),
}

/// Orchestrator for the notification lifecycle
/// (pending -> scheduled -> delivered, or cancelled).
pub struct NotificationEngine {
    store: Arc<dyn NotificationStore>,
    schedule_manager: Arc<ScheduleManager>,
    connection_manager: Arc<ConnectionManager>,
}

impl NotificationEngine {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        schedule_manager: Arc<ScheduleManager>,
        connection_manager: Arc<ConnectionManager>,
    ) -> Self {
        Self {
            store,
            schedule_manager,
            connection_manager,
        }
    }

    /// Create a notification for `user_id`.
    ///
    /// A `scheduled_for` in the future arms a delivery timer; absent or
    /// already-due timestamps deliver synchronously with `scheduled_for`
    /// left unset.
    pub async fn create(
        self: &Arc<Self>,
        user_id: usize,
        request: CreateNotificationRequest,
    ) -> Result<Notification, NotificationError> {
        if request.title.trim().is_empty() {
            return Err(NotificationError::Validation(
                "title must not be empty".to_string(),
            ));
        }

        let now = now_millis();
        let scheduled_for = request.scheduled_for.filter(|ts| *ts > now);

        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            user_id,
            title: request.title,
            message: request.message,
            notification_type: request.notification_type,
            priority: request.priority,
            read: false,
            active: true,
            action_link: request.action_link,
            metadata: request.metadata.unwrap_or_else(|| serde_json::json!({})),
            scheduled_for,
            expires_at: request.expires_at,
            created_at: now,
            updated_at: now,
        };

        let persisted = self.store.insert(&notification)?;
        metrics::record_notification_created(persisted.notification_type.as_str());

        match scheduled_for {
            Some(fire_at) => {
                debug!(
                    "Notification {} for user {} scheduled at {}",
                    persisted.id, user_id, fire_at
                );
                self.arm_timer(&persisted.id, fire_at);
            }
            None => self.deliver(&persisted, "immediate").await,
        }

        Ok(persisted)
    }

    /// Timer-fire path. Reloads the row and re-checks its state before
    /// delivering: a cancellation or delete that raced the timer wins.
    pub async fn on_fire(&self, id: &str) {
        metrics::set_scheduled_timers(self.schedule_manager.pending_count());

        let notification = match self.store.find_by_id(id) {
            Ok(Some(n)) => n,
            Ok(None) => {
                debug!("Timer fired for deleted notification {}", id);
                return;
            }
            Err(err) => {
                warn!("Failed to reload notification {} on fire: {}", id, err);
                return;
            }
        };

        if !notification.active || notification.scheduled_for.is_none() {
            debug!(
                "Timer fired for notification {} that no longer wants delivery",
                id
            );
            return;
        }

        let updated = match self.store.update_one(id, &StorePatch::clear_scheduled_for()) {
            Ok(Some(n)) => n,
            Ok(None) => return,
            Err(err) => {
                warn!("Failed to mark notification {} delivered: {}", id, err);
                return;
            }
        };

        self.deliver(&updated, "scheduled").await;
    }

    pub fn find_one(&self, id: &str, requester: usize) -> Result<Notification, NotificationError> {
        self.store
            .find_by_id(id)?
            .filter(|n| n.user_id == requester)
            .ok_or(NotificationError::NotFound)
    }

    /// Newest-first page of the requester's notifications plus total count.
    pub fn find_all_for_user(
        &self,
        requester: usize,
        page: usize,
        limit: usize,
    ) -> Result<NotificationPage, NotificationError> {
        if limit == 0 {
            return Err(NotificationError::Validation(
                "limit must be positive".to_string(),
            ));
        }
        let limit = limit.min(MAX_PAGE_LIMIT);

        // The store binds the offset as an SQL integer, so the product must
        // fit in an i64 as well as a usize.
        let skip = page
            .checked_mul(limit)
            .filter(|skip| i64::try_from(*skip).is_ok())
            .ok_or_else(|| {
                NotificationError::Validation("page is out of range".to_string())
            })?;

        let filter = NotificationFilter::for_user(requester);
        let notifications = self.store.find(&filter, skip, limit)?;
        let total = self.store.count(&filter)?;

        Ok(NotificationPage {
            notifications,
            total,
        })
    }

    /// Apply a partial update. A patch carrying `scheduled_for` goes through
    /// cancel-then-reschedule, re-running the create-time scheduling
    /// decision; there is never a second live timer for the same id.
    pub async fn update(
        self: &Arc<Self>,
        id: &str,
        requester: usize,
        patch: NotificationPatch,
    ) -> Result<Notification, NotificationError> {
        if patch.is_empty() {
            return Err(NotificationError::Validation(
                "patch must change at least one field".to_string(),
            ));
        }
        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(NotificationError::Validation(
                    "title must not be empty".to_string(),
                ));
            }
        }

        // Ownership check before any side effect.
        self.find_one(id, requester)?;

        let mut store_patch = StorePatch {
            title: patch.title,
            message: patch.message,
            notification_type: patch.notification_type,
            priority: patch.priority,
            // read is monotone: a read=false patch is ignored, not applied.
            read: patch.read.filter(|r| *r),
            active: patch.active,
            action_link: patch.action_link,
            metadata: patch.metadata,
            scheduled_for: None,
            expires_at: patch.expires_at,
        };

        let reschedule = match patch.scheduled_for {
            None => None,
            Some(target) => {
                if self.schedule_manager.exists(id) {
                    self.schedule_manager.cancel(id);
                    metrics::record_notification_cancelled();
                }
                let now = now_millis();
                match target {
                    Some(ts) if ts > now => {
                        store_patch.scheduled_for = Some(Some(ts));
                        Some(Some(ts))
                    }
                    Some(_) => {
                        // Already due: deliver right after persisting.
                        store_patch.scheduled_for = Some(None);
                        Some(None)
                    }
                    None => {
                        store_patch.scheduled_for = Some(None);
                        None
                    }
                }
            }
        };

        let updated = self
            .store
            .update_one(id, &store_patch)?
            .ok_or(NotificationError::NotFound)?;

        match reschedule {
            Some(Some(fire_at)) => self.arm_timer(&updated.id, fire_at),
            Some(None) => {
                if updated.active {
                    self.deliver(&updated, "immediate").await;
                }
            }
            None => {}
        }

        Ok(updated)
    }

    /// Idempotent read-flag flip.
    pub fn mark_as_read(
        &self,
        id: &str,
        requester: usize,
    ) -> Result<Notification, NotificationError> {
        self.find_one(id, requester)?;
        self.store
            .update_one(id, &StorePatch::mark_read())?
            .ok_or(NotificationError::NotFound)
    }

    /// Mark every unread notification of the requester read. Returns the
    /// number of rows changed. Scheduling state is untouched.
    pub fn mark_all_as_read(&self, requester: usize) -> Result<usize, NotificationError> {
        let filter = NotificationFilter {
            user_id: Some(requester),
            read: Some(false),
            ..NotificationFilter::default()
        };
        Ok(self.store.update_many(&filter, &StorePatch::mark_read())?)
    }

    /// Delete one notification, cancelling its timer if armed.
    pub fn remove(&self, id: &str, requester: usize) -> Result<(), NotificationError> {
        self.find_one(id, requester)?;

        if self.schedule_manager.exists(id) {
            self.schedule_manager.cancel(id);
            metrics::record_notification_cancelled();
        }
        metrics::set_scheduled_timers(self.schedule_manager.pending_count());

        self.store.delete_one(id)?;
        Ok(())
    }

    /// Delete every notification of the requester, cancelling any armed
    /// timers first. Returns the number of rows deleted.
    pub fn remove_all_for_user(&self, requester: usize) -> Result<usize, NotificationError> {
        let scheduled_filter = NotificationFilter {
            user_id: Some(requester),
            scheduled_only: true,
            ..NotificationFilter::default()
        };
        for notification in self.store.find(&scheduled_filter, 0, NO_LIMIT)? {
            if self.schedule_manager.exists(&notification.id) {
                self.schedule_manager.cancel(&notification.id);
                metrics::record_notification_cancelled();
            }
        }
        metrics::set_scheduled_timers(self.schedule_manager.pending_count());

        let deleted = self
            .store
            .delete_many(&NotificationFilter::for_user(requester))?;
        Ok(deleted)
    }

    /// Count of unread, active notifications for the requester.
    pub fn get_unread_count(&self, requester: usize) -> Result<usize, NotificationError> {
        let filter = NotificationFilter {
            user_id: Some(requester),
            read: Some(false),
            active: Some(true),
            ..NotificationFilter::default()
        };
        Ok(self.store.count(&filter)?)
    }

    /// Startup sweep: timers do not survive a restart, so every stored row
    /// still carrying a `scheduled_for` is either fired (due) or re-armed
    /// (future). Run once before the server starts accepting traffic.
    pub async fn resync_pending(self: &Arc<Self>) -> Result<usize, NotificationError> {
        let filter = NotificationFilter {
            scheduled_only: true,
            ..NotificationFilter::default()
        };
        let pending = self.store.find(&filter, 0, NO_LIMIT)?;
        let total = pending.len();

        let now = now_millis();
        let mut fired = 0;
        for notification in pending {
            match notification.scheduled_for {
                Some(fire_at) if fire_at > now => self.arm_timer(&notification.id, fire_at),
                _ => {
                    self.on_fire(&notification.id).await;
                    fired += 1;
                }
            }
        }

        if total > 0 {
            info!(
                "Resynced {} pending notifications ({} fired as overdue, {} re-armed)",
                total,
                fired,
                total - fired
            );
        }
        Ok(total)
    }

    /// Number of armed delivery timers.
    pub fn pending_timer_count(&self) -> usize {
        self.schedule_manager.pending_count()
    }

    fn arm_timer(self: &Arc<Self>, id: &str, fire_at: i64) {
        let engine = Arc::clone(self);
        let timer_id = id.to_string();
        self.schedule_manager.schedule(
            id,
            fire_at,
            Box::new(move || {
                Box::pin(async move {
                    engine.on_fire(&timer_id).await;
                })
            }),
        );
        metrics::set_scheduled_timers(self.schedule_manager.pending_count());
    }

    /// Push the record to every live connection of the owner. Best effort:
    /// failures are logged, never surfaced.
    async fn deliver(&self, notification: &Notification, mode: &str) {
        let message = ServerMessage::new(msg_types::NOTIFICATION, notification);
        let failed = self
            .connection_manager
            .broadcast_to_user(notification.user_id, message)
            .await;
        if !failed.is_empty() {
            debug!(
                "Failed to push notification {} to {} connections of user {}",
                notification.id,
                failed.len(),
                notification.user_id
            );
        }
        metrics::record_notification_delivered(mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::models::{NotificationPriority, NotificationType};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// In-memory store for engine tests.
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<Notification>>,
    }

    impl MemoryStore {
        fn matches(filter: &NotificationFilter, n: &Notification) -> bool {
            if let Some(user_id) = filter.user_id {
                if n.user_id != user_id {
                    return false;
                }
            }
            if let Some(read) = filter.read {
                if n.read != read {
                    return false;
                }
            }
            if let Some(active) = filter.active {
                if n.active != active {
                    return false;
                }
            }
            if filter.scheduled_only && n.scheduled_for.is_none() {
                return false;
            }
            true
        }

        fn apply(patch: &StorePatch, n: &mut Notification) {
            if let Some(title) = &patch.title {
                n.title = title.clone();
            }
            if let Some(message) = &patch.message {
                n.message = message.clone();
            }
            if let Some(t) = patch.notification_type {
                n.notification_type = t;
            }
            if let Some(p) = patch.priority {
                n.priority = p;
            }
            if let Some(read) = patch.read {
                n.read = read;
            }
            if let Some(active) = patch.active {
                n.active = active;
            }
            if let Some(link) = &patch.action_link {
                n.action_link = link.clone();
            }
            if let Some(metadata) = &patch.metadata {
                n.metadata = metadata.clone();
            }
            if let Some(scheduled_for) = patch.scheduled_for {
                n.scheduled_for = scheduled_for;
            }
            if let Some(expires_at) = patch.expires_at {
                n.expires_at = expires_at;
            }
            n.updated_at = now_millis();
        }
    }

    impl NotificationStore for MemoryStore {
        fn insert(&self, notification: &Notification) -> anyhow::Result<Notification> {
            let mut rows = self.rows.lock().unwrap();
            rows.push(notification.clone());
            Ok(notification.clone())
        }

        fn find_by_id(&self, id: &str) -> anyhow::Result<Option<Notification>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().find(|n| n.id == id).cloned())
        }

        fn find(
            &self,
            filter: &NotificationFilter,
            skip: usize,
            limit: usize,
        ) -> anyhow::Result<Vec<Notification>> {
            let rows = self.rows.lock().unwrap();
            let mut matching: Vec<Notification> = rows
                .iter()
                .filter(|n| Self::matches(filter, n))
                .cloned()
                .collect();
            matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(matching.into_iter().skip(skip).take(limit).collect())
        }

        fn count(&self, filter: &NotificationFilter) -> anyhow::Result<usize> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().filter(|n| Self::matches(filter, n)).count())
        }

        fn update_one(
            &self,
            id: &str,
            patch: &StorePatch,
        ) -> anyhow::Result<Option<Notification>> {
            let mut rows = self.rows.lock().unwrap();
            for n in rows.iter_mut() {
                if n.id == id {
                    Self::apply(patch, n);
                    return Ok(Some(n.clone()));
                }
            }
            Ok(None)
        }

        fn update_many(
            &self,
            filter: &NotificationFilter,
            patch: &StorePatch,
        ) -> anyhow::Result<usize> {
            let mut rows = self.rows.lock().unwrap();
            let mut changed = 0;
            for n in rows.iter_mut() {
                if Self::matches(filter, n) {
                    Self::apply(patch, n);
                    changed += 1;
                }
            }
            Ok(changed)
        }

        fn delete_one(&self, id: &str) -> anyhow::Result<bool> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|n| n.id != id);
            Ok(rows.len() < before)
        }

        fn delete_many(&self, filter: &NotificationFilter) -> anyhow::Result<usize> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|n| !Self::matches(filter, n));
            Ok(before - rows.len())
        }
    }

    fn engine() -> (Arc<NotificationEngine>, Arc<ConnectionManager>) {
        let connection_manager = Arc::new(ConnectionManager::new());
        let engine = Arc::new(NotificationEngine::new(
            Arc::new(MemoryStore::default()),
            Arc::new(ScheduleManager::new()),
            connection_manager.clone(),
        ));
        (engine, connection_manager)
    }

    fn request(title: &str) -> CreateNotificationRequest {
        CreateNotificationRequest {
            title: title.to_string(),
            message: "body".to_string(),
            notification_type: NotificationType::System,
            priority: NotificationPriority::Medium,
            action_link: None,
            metadata: None,
            scheduled_for: None,
            expires_at: None,
        }
    }

    async fn recv_notification(rx: &mut mpsc::Receiver<ServerMessage>) -> Notification {
        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for push")
            .expect("connection channel closed");
        assert_eq!(msg.msg_type, msg_types::NOTIFICATION);
        serde_json::from_value(msg.payload).unwrap()
    }

    #[tokio::test]
    async fn immediate_create_persists_and_pushes() {
        let (engine, connections) = engine();
        let (_, mut rx) = connections.register(1).await;

        let created = engine.create(1, request("hello")).await.unwrap();
        assert!(!created.read);
        assert!(created.active);
        assert!(created.scheduled_for.is_none());

        let pushed = recv_notification(&mut rx).await;
        assert_eq!(pushed.id, created.id);
        assert_eq!(engine.find_one(&created.id, 1).unwrap().id, created.id);
    }

    #[tokio::test]
    async fn create_without_connection_still_persists() {
        let (engine, _) = engine();
        let created = engine.create(1, request("offline")).await.unwrap();
        assert_eq!(engine.get_unread_count(1).unwrap(), 1);
        assert_eq!(engine.find_one(&created.id, 1).unwrap().title, "offline");
    }

    #[tokio::test]
    async fn empty_title_is_rejected() {
        let (engine, _) = engine();
        let err = engine.create(1, request("   ")).await.unwrap_err();
        assert!(matches!(err, NotificationError::Validation(_)));
        assert_eq!(engine.get_unread_count(1).unwrap(), 0);
    }

    #[tokio::test]
    async fn scheduled_create_delivers_after_delay_and_clears_schedule() {
        let (engine, connections) = engine();
        let (_, mut rx) = connections.register(1).await;

        let mut req = request("later");
        req.scheduled_for = Some(now_millis() + 100);
        let created = engine.create(1, req).await.unwrap();
        assert!(created.scheduled_for.is_some());
        assert_eq!(engine.pending_timer_count(), 1);

        // Nothing pushed before the timer fires.
        assert!(rx.try_recv().is_err());

        let pushed = recv_notification(&mut rx).await;
        assert_eq!(pushed.id, created.id);
        assert!(pushed.scheduled_for.is_none());

        let stored = engine.find_one(&created.id, 1).unwrap();
        assert!(stored.scheduled_for.is_none());
        assert_eq!(engine.pending_timer_count(), 0);
    }

    #[tokio::test]
    async fn past_scheduled_for_is_treated_as_immediate() {
        let (engine, connections) = engine();
        let (_, mut rx) = connections.register(1).await;

        let mut req = request("due");
        req.scheduled_for = Some(now_millis() - 5000);
        let created = engine.create(1, req).await.unwrap();

        assert!(created.scheduled_for.is_none());
        assert_eq!(engine.pending_timer_count(), 0);
        let pushed = recv_notification(&mut rx).await;
        assert_eq!(pushed.id, created.id);
    }

    #[tokio::test]
    async fn remove_cancels_pending_delivery() {
        let (engine, connections) = engine();
        let (_, mut rx) = connections.register(1).await;

        let mut req = request("doomed");
        req.scheduled_for = Some(now_millis() + 100);
        let created = engine.create(1, req).await.unwrap();

        engine.remove(&created.id, 1).unwrap();
        assert_eq!(engine.pending_timer_count(), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err());
        assert!(matches!(
            engine.find_one(&created.id, 1),
            Err(NotificationError::NotFound)
        ));
    }

    #[tokio::test]
    async fn reschedule_moves_delivery_without_duplicating() {
        let (engine, connections) = engine();
        let (_, mut rx) = connections.register(1).await;

        let mut req = request("moving");
        req.scheduled_for = Some(now_millis() + 80);
        let created = engine.create(1, req).await.unwrap();

        let patch: NotificationPatch =
            serde_json::from_value(serde_json::json!({"scheduled_for": now_millis() + 250}))
                .unwrap();
        let updated = engine.update(&created.id, 1, patch).await.unwrap();
        assert!(updated.scheduled_for.is_some());
        assert_eq!(engine.pending_timer_count(), 1);

        // Old fire time passes silently.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(rx.try_recv().is_err());

        // Exactly one delivery at the new time.
        let pushed = recv_notification(&mut rx).await;
        assert_eq!(pushed.id, created.id);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn patch_with_null_scheduled_for_cancels_timer() {
        let (engine, connections) = engine();
        let (_, mut rx) = connections.register(1).await;

        let mut req = request("parked");
        req.scheduled_for = Some(now_millis() + 100);
        let created = engine.create(1, req).await.unwrap();

        let patch: NotificationPatch =
            serde_json::from_value(serde_json::json!({"scheduled_for": null})).unwrap();
        let updated = engine.update(&created.id, 1, patch).await.unwrap();
        assert!(updated.scheduled_for.is_none());
        assert_eq!(engine.pending_timer_count(), 0);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn ownership_mismatch_collapses_to_not_found() {
        let (engine, _) = engine();
        let created = engine.create(1, request("mine")).await.unwrap();

        assert!(matches!(
            engine.find_one(&created.id, 2),
            Err(NotificationError::NotFound)
        ));
        assert!(matches!(
            engine.mark_as_read(&created.id, 2),
            Err(NotificationError::NotFound)
        ));
        assert!(matches!(
            engine.remove(&created.id, 2),
            Err(NotificationError::NotFound)
        ));
        let patch: NotificationPatch =
            serde_json::from_value(serde_json::json!({"read": true})).unwrap();
        assert!(matches!(
            engine.update(&created.id, 2, patch).await,
            Err(NotificationError::NotFound)
        ));

        // The owner still sees it untouched.
        let mine = engine.find_one(&created.id, 1).unwrap();
        assert!(!mine.read);
    }

    #[tokio::test]
    async fn delivery_is_scoped_to_the_owner() {
        let (engine, connections) = engine();
        let (_, mut rx_owner) = connections.register(1).await;
        let (_, mut rx_other) = connections.register(2).await;

        engine.create(1, request("private")).await.unwrap();

        recv_notification(&mut rx_owner).await;
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn unread_count_tracks_read_transitions() {
        let (engine, _) = engine();
        let first = engine.create(1, request("one")).await.unwrap();
        engine.create(1, request("two")).await.unwrap();
        engine.create(2, request("other user")).await.unwrap();

        assert_eq!(engine.get_unread_count(1).unwrap(), 2);

        let read = engine.mark_as_read(&first.id, 1).unwrap();
        assert!(read.read);
        assert_eq!(engine.get_unread_count(1).unwrap(), 1);

        // Idempotent.
        engine.mark_as_read(&first.id, 1).unwrap();
        assert_eq!(engine.get_unread_count(1).unwrap(), 1);
    }

    #[tokio::test]
    async fn read_flag_is_monotone() {
        let (engine, _) = engine();
        let created = engine.create(1, request("sticky")).await.unwrap();
        engine.mark_as_read(&created.id, 1).unwrap();

        let patch: NotificationPatch =
            serde_json::from_value(serde_json::json!({"read": false})).unwrap();
        let updated = engine.update(&created.id, 1, patch).await.unwrap();
        assert!(updated.read);
    }

    #[tokio::test]
    async fn mark_all_as_read_counts_only_unread() {
        let (engine, _) = engine();
        let first = engine.create(1, request("a")).await.unwrap();
        engine.create(1, request("b")).await.unwrap();
        engine.create(1, request("c")).await.unwrap();
        engine.mark_as_read(&first.id, 1).unwrap();

        assert_eq!(engine.mark_all_as_read(1).unwrap(), 2);
        assert_eq!(engine.get_unread_count(1).unwrap(), 0);
        assert_eq!(engine.mark_all_as_read(1).unwrap(), 0);
    }

    #[tokio::test]
    async fn bulk_cleanup_cancels_timers_and_spares_other_users() {
        let (engine, connections) = engine();
        let (_, mut rx1) = connections.register(1).await;

        engine.create(1, request("plain")).await.unwrap();
        recv_notification(&mut rx1).await;
        let mut scheduled = request("armed");
        scheduled.scheduled_for = Some(now_millis() + 100);
        engine.create(1, scheduled).await.unwrap();
        engine.create(2, request("keep")).await.unwrap();

        assert_eq!(engine.remove_all_for_user(1).unwrap(), 2);
        assert_eq!(engine.pending_timer_count(), 0);
        assert_eq!(engine.find_all_for_user(1, 0, 10).unwrap().total, 0);
        assert_eq!(engine.find_all_for_user(2, 0, 10).unwrap().total, 1);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn pagination_is_newest_first() {
        let (engine, _) = engine();
        // Force distinct created_at values.
        for i in 0..5 {
            engine.create(1, request(&format!("n{}", i))).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let page = engine.find_all_for_user(1, 0, 2).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.notifications.len(), 2);
        assert_eq!(page.notifications[0].title, "n4");
        assert_eq!(page.notifications[1].title, "n3");

        let last = engine.find_all_for_user(1, 2, 2).unwrap();
        assert_eq!(last.notifications.len(), 1);
        assert_eq!(last.notifications[0].title, "n0");

        assert!(matches!(
            engine.find_all_for_user(1, 0, 0),
            Err(NotificationError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn absurd_page_numbers_are_rejected() {
        let (engine, _) = engine();
        engine.create(1, request("only")).await.unwrap();

        // Would overflow page * limit.
        assert!(matches!(
            engine.find_all_for_user(1, usize::MAX / 2, 100),
            Err(NotificationError::Validation(_))
        ));
        // Fits in a usize but not in an SQL integer offset.
        assert!(matches!(
            engine.find_all_for_user(1, usize::MAX / 100, 100),
            Err(NotificationError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn empty_patch_is_rejected() {
        let (engine, _) = engine();
        let created = engine.create(1, request("x")).await.unwrap();
        let patch: NotificationPatch = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            engine.update(&created.id, 1, patch).await,
            Err(NotificationError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn inactive_notifications_do_not_deliver_on_fire() {
        let (engine, connections) = engine();
        let (_, mut rx) = connections.register(1).await;

        let mut req = request("muted");
        req.scheduled_for = Some(now_millis() + 80);
        let created = engine.create(1, req).await.unwrap();

        let patch: NotificationPatch =
            serde_json::from_value(serde_json::json!({"active": false})).unwrap();
        engine.update(&created.id, 1, patch).await.unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(rx.try_recv().is_err());
        // Inactive rows are excluded from the unread count.
        assert_eq!(engine.get_unread_count(1).unwrap(), 0);
    }

    #[tokio::test]
    async fn resync_rearms_future_and_fires_overdue() {
        let (engine, connections) = engine();
        let (_, mut rx) = connections.register(1).await;

        // Seed the store directly to simulate rows left over from a
        // previous process: one overdue, one still in the future.
        let overdue = Notification {
            id: "overdue".to_string(),
            user_id: 1,
            title: "overdue".to_string(),
            message: String::new(),
            notification_type: NotificationType::System,
            priority: NotificationPriority::Medium,
            read: false,
            active: true,
            action_link: None,
            metadata: serde_json::json!({}),
            scheduled_for: Some(now_millis() - 60_000),
            expires_at: None,
            created_at: now_millis(),
            updated_at: now_millis(),
        };
        let future = Notification {
            id: "future".to_string(),
            scheduled_for: Some(now_millis() + 120),
            title: "future".to_string(),
            ..overdue.clone()
        };
        engine.store.insert(&overdue).unwrap();
        engine.store.insert(&future).unwrap();

        assert_eq!(engine.resync_pending().await.unwrap(), 2);

        let first = recv_notification(&mut rx).await;
        assert_eq!(first.id, "overdue");
        assert_eq!(engine.pending_timer_count(), 1);

        let second = recv_notification(&mut rx).await;
        assert_eq!(second.id, "future");
        assert!(engine.find_one("future", 1).unwrap().scheduled_for.is_none());
    }
}
