//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod chat;
pub mod pool;
pub mod token;
pub mod user;
pub mod vector_index;

use chrono::{DateTime, Utc};
use recall_types::error::MemoryError;
use recall_types::timestamp::{format_timestamp, parse_timestamp};
use uuid::Uuid;

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Primary result code of a SQLite error (extended codes keep it in the low byte).
fn primary_code(db_err: &dyn sqlx::error::DatabaseError) -> Option<i32> {
    db_err
        .code()
        .and_then(|code| code.parse::<i32>().ok())
        .map(|code| code & 0xff)
}

/// Translate a sqlx error into the memory error taxonomy.
///
/// Connectivity and lock contention are `Transient`; constraint violations
/// map onto the caller-facing classes; everything else is `Storage`.
pub(crate) fn map_sqlx_error(e: sqlx::Error) -> MemoryError {
    match e {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            if matches!(primary_code(db_err.as_ref()), Some(SQLITE_BUSY | SQLITE_LOCKED)) {
                MemoryError::Transient(message.to_string())
            } else if message.contains("UNIQUE") || message.starts_with("CONFLICT:") {
                MemoryError::Conflict(message.to_string())
            } else if message.starts_with("INCONSISTENT:") {
                MemoryError::Inconsistent(message.to_string())
            } else if message.contains("FOREIGN KEY") {
                MemoryError::NotFound(format!("referenced entity does not exist ({message})"))
            } else if message.contains("CHECK") || message.contains("NOT NULL") {
                MemoryError::InvalidArgument(message.to_string())
            } else {
                MemoryError::Storage(message.to_string())
            }
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_) => MemoryError::Transient(e.to_string()),
        other => MemoryError::Storage(other.to_string()),
    }
}

/// Row-decoding failures are storage faults.
pub(crate) fn decode_error(e: sqlx::Error) -> MemoryError {
    MemoryError::Storage(format!("failed to decode row: {e}"))
}

pub(crate) fn parse_uuid(s: &str, field: &str) -> Result<Uuid, MemoryError> {
    Uuid::parse_str(s).map_err(|e| MemoryError::Storage(format!("invalid {field}: {e}")))
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, MemoryError> {
    parse_timestamp(s).map_err(|e| MemoryError::Storage(format!("invalid datetime: {e}")))
}

pub(crate) fn parse_optional_datetime(
    s: Option<&str>,
) -> Result<Option<DateTime<Utc>>, MemoryError> {
    s.map(parse_datetime).transpose()
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    format_timestamp(dt)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_transient() {
        assert!(map_sqlx_error(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(map_sqlx_error(sqlx::Error::PoolClosed).is_retryable());
    }

    #[tokio::test]
    async fn test_lock_contention_is_transient() {
        use sqlx::Connection;
        use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};

        let dir = tempfile::tempdir().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("contended.db"))
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::ZERO);

        let mut holder = SqliteConnection::connect_with(&options).await.unwrap();
        sqlx::query("CREATE TABLE t (x INTEGER)")
            .execute(&mut holder)
            .await
            .unwrap();
        sqlx::query("BEGIN IMMEDIATE").execute(&mut holder).await.unwrap();

        let mut other = SqliteConnection::connect_with(&options).await.unwrap();
        let err = sqlx::query("INSERT INTO t VALUES (1)")
            .execute(&mut other)
            .await
            .unwrap_err();
        assert!(matches!(map_sqlx_error(err), MemoryError::Transient(_)));
    }

    #[tokio::test]
    async fn test_busy_in_message_text_is_not_transient() {
        let pool = test_support::test_pool().await;
        let err = sqlx::query("SELECT * FROM busy_signals")
            .fetch_all(&pool.reader)
            .await
            .unwrap_err();
        assert!(matches!(map_sqlx_error(err), MemoryError::Storage(_)));
    }

    #[test]
    fn test_row_not_found_is_storage() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            MemoryError::Storage(_)
        ));
    }

    #[test]
    fn test_datetime_helpers_roundtrip() {
        let now = recall_types::timestamp::truncate_to_micros(Utc::now());
        assert_eq!(parse_datetime(&format_datetime(&now)).unwrap(), now);
        assert!(parse_datetime("yesterday").is_err());
        assert_eq!(parse_optional_datetime(None).unwrap(), None);
    }
}
