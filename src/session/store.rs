//! In-memory session store with per-user locking.
//!
//! The map lock is held only to look up, insert, or remove a handle. All
//! session mutation happens under the per-user `Mutex`, so unrelated users
//! never serialize on each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::session::model::Session;

/// Shared handle to one user's session.
pub type SessionHandle = Arc<Mutex<Session>>;

pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    clock: Arc<dyn Clock>,
    history_limit: usize,
}

impl SessionStore {
    pub fn new(clock: Arc<dyn Clock>, history_limit: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock,
            history_limit,
        }
    }

    /// Fetch the user's session, creating one at `Start` if absent.
    pub async fn get_or_create(&self, user_id: &str, display_name: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(user_id) {
            return Arc::clone(handle);
        }

        let mut sessions = self.sessions.write().await;
        let handle = sessions.entry(user_id.to_string()).or_insert_with(|| {
            debug!(user_id, "Creating session");
            Arc::new(Mutex::new(Session::new(
                user_id,
                display_name,
                self.clock.now(),
                self.history_limit,
            )))
        });
        Arc::clone(handle)
    }

    pub async fn get(&self, user_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(user_id).cloned()
    }

    /// Remove the user's entry if it is still `handle`.
    pub async fn remove_if_same(&self, user_id: &str, handle: &SessionHandle) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(user_id) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                sessions.remove(user_id);
                true
            }
            _ => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop sessions started more than `ttl` ago. Sessions currently locked
    /// by a dispatch are skipped and picked up on a later sweep.
    pub async fn evict_stale(&self, ttl: Duration) -> usize {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let now = self.clock.now();

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|user_id, handle| match handle.try_lock() {
            Ok(mut session) => {
                let stale = now.signed_duration_since(session.started_at) > ttl;
                if stale {
                    session.closed = true;
                    info!(user_id = %user_id, "Evicting stale session");
                }
                !stale
            }
            Err(_) => true,
        });
        before - sessions.len()
    }
}
