//! Async libSQL implementation of the pause and intake repositories.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::flow::intake::{IntakeRecord, IntakeStatus};
use crate::store::migrations;
use crate::store::traits::{
    Database, IntakeFilter, IntakeRepository, IntakeStats, PauseRecord, PauseRepository,
    ServiceCount, StoredIntake,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests and the CLI channel).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format. Fixed width, so text comparison in SQL orders
/// the same as the instants.
fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(ndt.and_utc());
    }
    Err(DatabaseError::Query(format!("unreadable timestamp {s:?}")))
}

fn column_error(e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(format!("row parse: {e}"))
}

const PAUSE_COLUMNS: &str = "user_id, user_name, paused_at, resume_at";

const INTAKE_COLUMNS: &str =
    "id, customer_name, phone, service, details, scheduled_for, status, requested_at, created_at";

/// Column order matches PAUSE_COLUMNS. A pause whose window cannot be read
/// is an error rather than a silently expired record.
fn row_to_pause(row: &libsql::Row) -> Result<PauseRecord, DatabaseError> {
    let paused_str: String = row.get(2).map_err(column_error)?;
    let resume_str: String = row.get(3).map_err(column_error)?;
    Ok(PauseRecord {
        user_id: row.get(0).map_err(column_error)?,
        user_name: row.get::<String>(1).unwrap_or_default(),
        paused_at: parse_datetime(&paused_str)?,
        resume_at: parse_datetime(&resume_str)?,
    })
}

/// Column order matches INTAKE_COLUMNS.
fn row_to_intake(row: &libsql::Row) -> Result<StoredIntake, DatabaseError> {
    let status_str: String = row.get(6).map_err(column_error)?;
    let requested_str: String = row.get(7).map_err(column_error)?;
    let created_str: String = row.get(8).map_err(column_error)?;
    Ok(StoredIntake {
        id: row.get(0).map_err(column_error)?,
        record: IntakeRecord {
            customer_name: row.get(1).map_err(column_error)?,
            phone: row.get(2).map_err(column_error)?,
            service: row.get(3).map_err(column_error)?,
            details: row.get::<String>(4).unwrap_or_default(),
            scheduled_for: row.get(5).map_err(column_error)?,
            status: status_str.parse().unwrap_or(IntakeStatus::Pending),
            requested_at: parse_datetime(&requested_str)?,
        },
        created_at: parse_datetime(&created_str)?,
    })
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }
}

#[async_trait]
impl PauseRepository for LibSqlBackend {
    async fn upsert_pause(&self, record: &PauseRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO paused_users (user_id, user_name, paused_at, resume_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id) DO UPDATE SET
                    user_name = excluded.user_name,
                    paused_at = excluded.paused_at,
                    resume_at = excluded.resume_at",
                params![
                    record.user_id.as_str(),
                    record.user_name.as_str(),
                    fmt_ts(record.paused_at),
                    fmt_ts(record.resume_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_pause: {e}")))?;

        debug!(user_id = %record.user_id, resume_at = %record.resume_at, "Pause stored");
        Ok(())
    }

    async fn get_pause(&self, user_id: &str) -> Result<Option<PauseRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PAUSE_COLUMNS} FROM paused_users WHERE user_id = ?1"),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_pause: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let record = row_to_pause(&row).map_err(|e| {
                    warn!(user_id, error = %e, "Unreadable pause row");
                    e
                })?;
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_pause: {e}"))),
        }
    }

    async fn delete_active_pause(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM paused_users WHERE user_id = ?1 AND resume_at > ?2",
                params![user_id, fmt_ts(now)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_active_pause: {e}")))?;
        Ok(count > 0)
    }

    async fn delete_expired_pause(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM paused_users WHERE user_id = ?1 AND resume_at <= ?2",
                params![user_id, fmt_ts(now)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_expired_pause: {e}")))?;
        Ok(count > 0)
    }

    async fn list_active_pauses(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PauseRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PAUSE_COLUMNS} FROM paused_users WHERE resume_at > ?1 ORDER BY resume_at DESC"
                ),
                params![fmt_ts(now)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_active_pauses: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_pause(&row) {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "Skipping unreadable pause row"),
            }
        }
        Ok(records)
    }

    async fn count_active_pauses(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM paused_users WHERE resume_at > ?1",
                params![fmt_ts(now)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("count_active_pauses: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).unwrap_or(0);
                Ok(count as usize)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count_active_pauses: {e}"))),
        }
    }

    async fn delete_expired_pauses(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM paused_users WHERE resume_at <= ?1",
                params![fmt_ts(now)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_expired_pauses: {e}")))?;

        if count > 0 {
            info!(count, "Removed expired pauses from DB");
        }
        Ok(count as usize)
    }
}

#[async_trait]
impl IntakeRepository for LibSqlBackend {
    async fn save_intake(
        &self,
        record: &IntakeRecord,
        now: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        let now = fmt_ts(now);
        let mut rows = self
            .conn()
            .query(
                "INSERT INTO intakes (customer_name, phone, service, details, scheduled_for, status, requested_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 RETURNING id",
                params![
                    record.customer_name.as_str(),
                    record.phone.as_str(),
                    record.service.as_str(),
                    record.details.as_str(),
                    record.scheduled_for.as_str(),
                    record.status.as_str(),
                    fmt_ts(record.requested_at),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_intake: {e}")))?;

        let id = match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map_err(|e| DatabaseError::Query(format!("save_intake id: {e}")))?,
            Ok(None) => {
                return Err(DatabaseError::Query(
                    "save_intake: insert returned no id".into(),
                ));
            }
            Err(e) => return Err(DatabaseError::Query(format!("save_intake: {e}"))),
        };

        info!(id, phone = %record.phone, service = %record.service, "Intake saved");
        Ok(id)
    }

    async fn list_intakes(
        &self,
        filter: &IntakeFilter,
    ) -> Result<Vec<StoredIntake>, DatabaseError> {
        let status = filter.status.map(|s| s.as_str()).unwrap_or("");
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let phone = filter.phone.as_deref().unwrap_or("");

        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {INTAKE_COLUMNS} FROM intakes
                     WHERE (?1 = '' OR status = ?1) AND (?3 = '' OR phone = ?3)
                     ORDER BY id DESC LIMIT ?2"
                ),
                params![status, limit, phone],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_intakes: {e}")))?;

        let mut intakes = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_intake(&row) {
                Ok(intake) => intakes.push(intake),
                Err(e) => warn!(error = %e, "Skipping unreadable intake row"),
            }
        }
        Ok(intakes)
    }

    async fn update_intake_status(
        &self,
        id: i64,
        status: IntakeStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE intakes SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), fmt_ts(now), id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_intake_status: {e}")))?;

        debug!(id, status = %status, "Intake status updated");
        Ok(count > 0)
    }

    async fn intake_stats(
        &self,
        now: DateTime<Utc>,
        top_services: usize,
    ) -> Result<IntakeStats, DatabaseError> {
        let today = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .unwrap_or(now);

        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*),
                    COUNT(CASE WHEN status = ?1 THEN 1 END),
                    COUNT(CASE WHEN status = ?2 THEN 1 END),
                    COUNT(CASE WHEN status = ?3 THEN 1 END),
                    COUNT(CASE WHEN status = ?4 THEN 1 END),
                    COUNT(CASE WHEN created_at >= ?5 THEN 1 END),
                    COUNT(CASE WHEN created_at >= ?6 THEN 1 END),
                    COUNT(CASE WHEN created_at >= ?7 THEN 1 END)
                 FROM intakes",
                params![
                    IntakeStatus::Pending.as_str(),
                    IntakeStatus::InProgress.as_str(),
                    IntakeStatus::Completed.as_str(),
                    IntakeStatus::Cancelled.as_str(),
                    fmt_ts(today),
                    fmt_ts(today - TimeDelta::days(7)),
                    fmt_ts(today - TimeDelta::days(30)),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("intake_stats: {e}")))?;

        let mut stats = match rows.next().await {
            Ok(Some(row)) => {
                let count = |idx: i32| -> Result<usize, DatabaseError> {
                    row.get::<i64>(idx)
                        .map(|n| n as usize)
                        .map_err(column_error)
                };
                IntakeStats {
                    total: count(0)?,
                    pending: count(1)?,
                    in_progress: count(2)?,
                    completed: count(3)?,
                    cancelled: count(4)?,
                    today: count(5)?,
                    last_7_days: count(6)?,
                    last_30_days: count(7)?,
                    top_services: Vec::new(),
                }
            }
            Ok(None) => IntakeStats::default(),
            Err(e) => return Err(DatabaseError::Query(format!("intake_stats: {e}"))),
        };

        let mut rows = self
            .conn()
            .query(
                "SELECT service, COUNT(*) AS total FROM intakes
                 GROUP BY service ORDER BY total DESC, service ASC LIMIT ?1",
                params![top_services as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("intake_stats services: {e}")))?;

        while let Ok(Some(row)) = rows.next().await {
            let service: String = row.get(0).map_err(column_error)?;
            let total: i64 = row.get(1).map_err(column_error)?;
            stats.top_services.push(ServiceCount {
                service,
                total: total as usize,
            });
        }
        Ok(stats)
    }
}
