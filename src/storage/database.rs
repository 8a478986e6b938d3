//! SQLite connection and row decoding helpers
//!
//! A single connection is shared behind a `std::sync::Mutex`
//! (`rusqlite::Connection` is not `Sync`). Queries are short, so handlers
//! take the lock directly instead of moving work to a blocking pool.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OpenFlags, Row};
use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use super::error::{StorageError, StorageResult};
use super::schema::SCHEMA;

/// Handle to the Project RED database
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (or create) a database file and apply the schema
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if path.as_os_str() == ":memory:" {
            return Self::open_in_memory();
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        let db = Self::init(conn, Some(path.to_path_buf()))?;
        tracing::info!(path = %path.display(), "Database opened");
        Ok(db)
    }

    /// Open a private in-memory database (tests, dry runs)
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StorageResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Path of the database file, `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Lock the connection
    pub(crate) fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }

    /// Cheap query used by readiness probes
    pub fn ping(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

/// Encode a timestamp so that lexical order matches time order
pub(crate) fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time at the precision timestamps are stored with
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: StdError + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

/// Read a TEXT column and parse it with `FromStr`
pub(crate) fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: StdError + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion_error(idx, e))
}

/// Read a nullable TEXT column and parse it with `FromStr`
pub(crate) fn parse_opt_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: StdError + Send + Sync + 'static,
{
    let text: Option<String> = row.get(idx)?;
    text.map(|t| t.parse().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

/// Map "no rows" to a typed not-found error
pub(crate) fn required<T>(
    result: rusqlite::Result<T>,
    entity: &'static str,
    id: impl ToString,
) -> StorageResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(StorageError::not_found(entity, id)),
        Err(e) => Err(e.into()),
    }
}

/// Map "no rows" to `None`
pub(crate) fn optional<T>(result: rusqlite::Result<T>) -> StorageResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_in_memory_and_ping() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.path().is_none());
        db.ping().unwrap();
    }

    #[test]
    fn test_open_file_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("red.db");
        let db = Database::open(&path).unwrap();
        db.ping().unwrap();
        assert!(path.exists());
        assert_eq!(db.path(), Some(path.as_path()));
    }

    #[test]
    fn test_schema_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("red.db");
        drop(Database::open(&path).unwrap());
        Database::open(&path).unwrap().ping().unwrap();
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let earlier = now();
        let later = earlier + chrono::Duration::milliseconds(5);
        assert!(ts(&earlier) < ts(&later));
        let parsed: DateTime<Utc> = ts(&earlier).parse().unwrap();
        assert_eq!(parsed, earlier);
    }
}
