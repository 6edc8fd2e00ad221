//! Background sweeps: expired pauses and stale sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::session::{PauseStore, SessionStore};

/// Handles for the two sweep loops. Dropping this does not stop them;
/// call [`CleanupTasks::abort`] on shutdown.
pub struct CleanupTasks {
    pub pauses: JoinHandle<()>,
    pub sessions: JoinHandle<()>,
}

impl CleanupTasks {
    pub fn abort(&self) {
        self.pauses.abort();
        self.sessions.abort();
    }
}

/// Periodically delete expired pause records.
pub fn spawn_pause_sweep(pauses: Arc<PauseStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match pauses.sweep_expired().await {
                Ok(0) => debug!("Pause sweep found nothing to remove"),
                Ok(removed) => info!(removed, "Expired pauses removed"),
                Err(e) => error!(error = %e, "Pause sweep failed"),
            }
        }
    })
}

/// Periodically evict sessions idle longer than `ttl`.
pub fn spawn_session_sweep(
    sessions: Arc<SessionStore>,
    every: Duration,
    ttl: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let evicted = sessions.evict_stale(ttl).await;
            if evicted > 0 {
                let remaining = sessions.len().await;
                info!(evicted, remaining, "Stale sessions evicted");
            }
        }
    })
}

pub fn spawn_cleanup_tasks(
    pauses: Arc<PauseStore>,
    sessions: Arc<SessionStore>,
    pause_every: Duration,
    session_every: Duration,
    session_ttl: Duration,
) -> CleanupTasks {
    CleanupTasks {
        pauses: spawn_pause_sweep(pauses, pause_every),
        sessions: spawn_session_sweep(sessions, session_every, session_ttl),
    }
}
