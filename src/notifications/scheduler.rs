//! In-process timer registry for deferred notification delivery.
//!
//! One live timer per notification id. Timers are tokio tasks parked on a
//! sleep; cancellation goes through a per-entry `CancellationToken` so that
//! API-driven cancellation and the timer firing can race safely on the same
//! id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::now_millis;

/// Callback invoked when a timer fires. Produced fresh for every schedule
/// call so it can own whatever context delivery needs.
pub type FireCallback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// A registered timer. The generation distinguishes an entry from any
/// replacement registered later under the same id, so a firing task can
/// tell whether the mapped entry is still its own.
struct TimerEntry {
    generation: u64,
    token: CancellationToken,
}

/// Registry of pending one-shot delivery timers, keyed by notification id.
///
/// Replace semantics: scheduling an id that already has a live timer first
/// cancels the old one; there is never more than one timer per id.
pub struct ScheduleManager {
    timers: Arc<Mutex<HashMap<String, TimerEntry>>>,
    next_generation: AtomicU64,
}

impl Default for ScheduleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleManager {
    pub fn new() -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Register a one-shot timer invoking `callback` at `fire_at` (epoch
    /// millis). An existing timer for the same id is cancelled first.
    ///
    /// Registration problems are logged and swallowed: a missed schedule
    /// leaves the notification pending in the store, it is never a caller
    /// error.
    pub fn schedule(&self, id: &str, fire_at: i64, callback: FireCallback) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let previous = {
            let mut timers = self.timers.lock().unwrap();
            timers.insert(
                id.to_string(),
                TimerEntry {
                    generation,
                    token: token.clone(),
                },
            )
        };
        if let Some(previous) = previous {
            debug!("Replacing live timer for notification {}", id);
            previous.token.cancel();
        }

        let delay_millis = (fire_at - now_millis()).max(0) as u64;
        let timers = self.timers.clone();
        let timer_id = id.to_string();

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                warn!(
                    "Failed to register delivery timer for notification {}, it stays pending: {}",
                    id, err
                );
                Self::remove_generation(&self.timers, id, generation);
                return;
            }
        };

        runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Timer for notification {} cancelled", timer_id);
                }
                _ = tokio::time::sleep(Duration::from_millis(delay_millis)) => {
                    // Deregister before running the callback so that
                    // exists() is false while delivery is in flight. A
                    // replacement may have raced this fire, so only this
                    // task's own entry is removed.
                    Self::remove_generation(&timers, &timer_id, generation);
                    callback().await;
                }
            }
        });
    }

    /// Remove the entry for `id` only if it still belongs to `generation`.
    fn remove_generation(
        timers: &Mutex<HashMap<String, TimerEntry>>,
        id: &str,
        generation: u64,
    ) {
        let mut timers = timers.lock().unwrap();
        if timers.get(id).map(|entry| entry.generation) == Some(generation) {
            timers.remove(id);
        }
    }

    /// Cancel the timer for `id`. Idempotent: a missing or already-fired id
    /// is a no-op.
    pub fn cancel(&self, id: &str) {
        let entry = self.timers.lock().unwrap().remove(id);
        if let Some(entry) = entry {
            debug!("Cancelled timer for notification {}", id);
            entry.token.cancel();
        }
    }

    /// Whether a live timer is currently registered for `id`.
    pub fn exists(&self, id: &str) -> bool {
        self.timers.lock().unwrap().contains_key(id)
    }

    /// Number of live timers.
    pub fn pending_count(&self) -> usize {
        self.timers.lock().unwrap().len()
    }

    /// Cancel every live timer. Used on shutdown.
    pub fn cancel_all(&self) {
        let entries: Vec<TimerEntry> = {
            let mut timers = self.timers.lock().unwrap();
            timers.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            entry.token.cancel();
        }
    }
}
