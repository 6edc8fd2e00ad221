//! Backend-agnostic persistence traits for pause records and intake records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DatabaseError;
use crate::flow::intake::{IntakeRecord, IntakeStatus};

/// A persisted human-takeover pause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseRecord {
    pub user_id: String,
    pub user_name: String,
    pub paused_at: DateTime<Utc>,
    pub resume_at: DateTime<Utc>,
}

/// An intake record after it has been saved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredIntake {
    pub id: i64,
    #[serde(flatten)]
    pub record: IntakeRecord,
    pub created_at: DateTime<Utc>,
}

/// Filter for listing intake records.
#[derive(Debug, Clone, Default)]
pub struct IntakeFilter {
    pub status: Option<IntakeStatus>,
    /// Only records for this customer phone.
    pub phone: Option<String>,
    pub limit: Option<usize>,
}

/// Aggregate counts over saved intakes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeStats {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub cancelled: usize,
    /// Saved since midnight UTC.
    pub today: usize,
    pub last_7_days: usize,
    pub last_30_days: usize,
    /// Most requested services, busiest first.
    pub top_services: Vec<ServiceCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceCount {
    pub service: String,
    pub total: usize,
}

/// Storage for pause records. At most one row per user.
#[async_trait]
pub trait PauseRepository: Send + Sync {
    /// Insert or replace the user's pause record.
    async fn upsert_pause(&self, record: &PauseRecord) -> Result<(), DatabaseError>;

    /// Get the user's pause record, expired or not.
    async fn get_pause(&self, user_id: &str) -> Result<Option<PauseRecord>, DatabaseError>;

    /// Delete the user's record if `resume_at > now`. Returns whether a row was deleted.
    async fn delete_active_pause(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Delete the user's record if `resume_at <= now`. Returns whether a row was deleted.
    async fn delete_expired_pause(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// All records with `resume_at > now`, latest resume first.
    async fn list_active_pauses(&self, now: DateTime<Utc>)
    -> Result<Vec<PauseRecord>, DatabaseError>;

    /// Count records with `resume_at > now`.
    async fn count_active_pauses(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError>;

    /// Delete every record with `resume_at <= now`. Returns the number removed.
    async fn delete_expired_pauses(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError>;
}

/// Storage for finalized intake records.
#[async_trait]
pub trait IntakeRepository: Send + Sync {
    /// Persist a record stamped with `now` and return its id.
    async fn save_intake(
        &self,
        record: &IntakeRecord,
        now: DateTime<Utc>,
    ) -> Result<i64, DatabaseError>;

    /// List records, newest first.
    async fn list_intakes(&self, filter: &IntakeFilter) -> Result<Vec<StoredIntake>, DatabaseError>;

    /// Change a record's status. Returns whether the record exists.
    async fn update_intake_status(
        &self,
        id: i64,
        status: IntakeStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Status breakdown, recent volume relative to `now`, and the
    /// `top_services` most requested services.
    async fn intake_stats(
        &self,
        now: DateTime<Utc>,
        top_services: usize,
    ) -> Result<IntakeStats, DatabaseError>;
}

/// Full database: both repositories plus schema management.
#[async_trait]
pub trait Database: PauseRepository + IntakeRepository {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;
}
