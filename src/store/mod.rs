//! Persistence layer: libSQL-backed storage for pauses and intake records.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    Database, IntakeFilter, IntakeRepository, IntakeStats, PauseRecord, PauseRepository,
    ServiceCount, StoredIntake,
};
