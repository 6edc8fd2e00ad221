//! Human-takeover pause store.
//!
//! While a user is paused the bot stays silent for them. Expiry is enforced
//! lazily on every lookup against the injected clock, so correctness never
//! depends on the periodic sweep having run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::info;

use crate::clock::Clock;
use crate::error::DatabaseError;
use crate::store::{PauseRecord, PauseRepository};

/// Answer to "is this user paused right now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseStatus {
    pub paused: bool,
    pub minutes_remaining: i64,
}

impl PauseStatus {
    pub const NOT_PAUSED: Self = Self {
        paused: false,
        minutes_remaining: 0,
    };
}

/// An active pause annotated with the time left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedUser {
    pub user_id: String,
    pub user_name: String,
    pub paused_at: DateTime<Utc>,
    pub resume_at: DateTime<Utc>,
    pub minutes_remaining: i64,
}

/// Whole minutes until `resume_at`, rounded up. Zero once it has passed.
pub fn minutes_remaining(resume_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let ms = resume_at.signed_duration_since(now).num_milliseconds();
    if ms <= 0 { 0 } else { (ms + 59_999) / 60_000 }
}

pub struct PauseStore {
    repo: Arc<dyn PauseRepository>,
    clock: Arc<dyn Clock>,
}

impl PauseStore {
    pub fn new(repo: Arc<dyn PauseRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// Pause automation for `user_id` until `now + duration`, replacing any
    /// existing pause.
    pub async fn pause(
        &self,
        user_id: &str,
        user_name: &str,
        duration: Duration,
    ) -> Result<PauseRecord, DatabaseError> {
        let now = self.clock.now();
        let delta = TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX);
        let record = PauseRecord {
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            paused_at: now,
            resume_at: now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        self.repo.upsert_pause(&record).await?;
        info!(user_id, user_name, resume_at = %record.resume_at, "Bot paused for user");
        Ok(record)
    }

    /// Check the user's pause. An expired record is deleted before
    /// reporting `paused: false`.
    pub async fn is_paused(&self, user_id: &str) -> Result<PauseStatus, DatabaseError> {
        let Some(record) = self.repo.get_pause(user_id).await? else {
            return Ok(PauseStatus::NOT_PAUSED);
        };

        let now = self.clock.now();
        if record.resume_at <= now {
            if self.repo.delete_expired_pause(user_id, now).await? {
                info!(user_id, user_name = %record.user_name, "Pause expired");
            }
            return Ok(PauseStatus::NOT_PAUSED);
        }

        Ok(PauseStatus {
            paused: true,
            minutes_remaining: minutes_remaining(record.resume_at, now),
        })
    }

    /// Clear an active pause. Returns whether one was cleared.
    pub async fn resume(&self, user_id: &str) -> Result<bool, DatabaseError> {
        let cleared = self.repo.delete_active_pause(user_id, self.clock.now()).await?;
        if cleared {
            info!(user_id, "Bot manually resumed for user");
        }
        Ok(cleared)
    }

    /// All active pauses, latest resume first.
    pub async fn list_active(&self) -> Result<Vec<PausedUser>, DatabaseError> {
        let now = self.clock.now();
        let records = self.repo.list_active_pauses(now).await?;
        Ok(records
            .into_iter()
            .map(|r| PausedUser {
                minutes_remaining: minutes_remaining(r.resume_at, now),
                user_id: r.user_id,
                user_name: r.user_name,
                paused_at: r.paused_at,
                resume_at: r.resume_at,
            })
            .collect())
    }

    pub async fn count_active(&self) -> Result<usize, DatabaseError> {
        self.repo.count_active_pauses(self.clock.now()).await
    }

    /// Delete every expired record. Returns how many were removed.
    pub async fn sweep_expired(&self) -> Result<usize, DatabaseError> {
        self.repo.delete_expired_pauses(self.clock.now()).await
    }
}
