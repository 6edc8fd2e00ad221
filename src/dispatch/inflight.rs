//! Per-user in-flight marker for duplicate suppression.
//!
//! A marker is set when a dispatch starts and cleared a grace period after
//! it finishes, so redeliveries that land right after the reply are dropped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub struct InFlightTracker {
    active: Arc<Mutex<HashSet<String>>>,
    grace: Duration,
}

impl InFlightTracker {
    pub fn new(grace: Duration) -> Self {
        Self {
            active: Arc::new(Mutex::new(HashSet::new())),
            grace,
        }
    }

    /// Mark the user as in flight. Returns `None` if already marked.
    pub fn try_acquire(&self, user_id: &str) -> Option<InFlightGuard> {
        let inserted = self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id.to_string());
        inserted.then(|| InFlightGuard {
            tracker: self.clone(),
            user_id: user_id.to_string(),
        })
    }

    pub fn is_active(&self, user_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(user_id)
    }

    fn clear(&self, user_id: &str) {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(user_id);
    }
}

/// Held for the duration of a dispatch. Dropping it schedules the marker
/// to clear after the grace period.
pub struct InFlightGuard {
    tracker: InFlightTracker,
    user_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let tracker = self.tracker.clone();
        let user_id = std::mem::take(&mut self.user_id);
        let grace = tracker.grace;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) if !grace.is_zero() => {
                handle.spawn(async move {
                    tokio::time::sleep(grace).await;
                    tracker.clear(&user_id);
                });
            }
            _ => tracker.clear(&user_id),
        }
    }
}
