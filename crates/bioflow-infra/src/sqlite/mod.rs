//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod data_model;
pub mod event;
pub mod pool;
pub mod run;
pub mod submission;
pub mod task;
pub mod workflow;

use bioflow_types::error::RepositoryError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

pub use data_model::SqliteDataModelService;
pub use event::SqliteEventStore;
pub use pool::DatabasePool;
pub use run::SqliteRunRepository;
pub use submission::SqliteSubmissionRepository;
pub use task::SqliteTaskRepository;
pub use workflow::SqliteWorkflowRepository;

// ---------------------------------------------------------------------------
// Column codecs shared by the repositories
// ---------------------------------------------------------------------------

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width UTC timestamps, so that string comparison in SQL orders them.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(format!("serialize column: {e}")))
}

fn from_json<T: DeserializeOwned>(column: &str, raw: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(raw).map_err(|e| RepositoryError::Query(format!("invalid {column} JSON: {e}")))
}

/// Parse a text column through the type's `FromStr`.
fn parse_enum<T>(column: &str, raw: &str) -> Result<T, RepositoryError>
where
    T: std::str::FromStr,
{
    raw.parse::<T>()
        .map_err(|_| RepositoryError::Query(format!("invalid {column}: {raw}")))
}

#[cfg(test)]
pub(crate) async fn test_pool() -> DatabasePool {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    std::mem::forget(dir);
    DatabasePool::new(&url).await.unwrap()
}
