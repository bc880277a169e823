//! `SQLite` plumbing shared by feedlog's databases.
//!
//! The preference store and the household cloud store both open their
//! connections through [`open_database`], which creates parent directories,
//! configures the connection and brings the schema up to date.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub use schema::{Schema, CLOUD_SCHEMA, PREFERENCES_SCHEMA};

/// Path reported for in-memory databases.
pub const IN_MEMORY_PATH: &str = ":memory:";

/// How long a statement waits for another connection's write lock.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open or create a database at the given path with the given schema.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created, the database
/// cannot be opened, or schema initialization fails.
pub fn open_database(path: impl AsRef<Path>, schema: &Schema) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    debug!("Opening {} database at {}", schema.name, path.display());
    let conn = Connection::open(path).map_err(|source| Error::DatabaseOpen {
        path: path.to_path_buf(),
        source,
    })?;

    // Several device processes may share the cloud file; WAL keeps readers
    // from blocking the writer and busy_timeout absorbs short write locks.
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
    )?;

    migrations::initialize_schema(&conn, schema)?;

    info!("Opened {} database at {}", schema.name, path.display());
    Ok(conn)
}

/// Create an in-memory database with the given schema, for tests.
///
/// # Errors
///
/// Returns an error if the in-memory database cannot be created.
pub fn open_in_memory(schema: &Schema) -> Result<Connection> {
    let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
        path: PathBuf::from(IN_MEMORY_PATH),
        source,
    })?;

    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    migrations::initialize_schema(&conn, schema)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let conn = open_in_memory(&CLOUD_SCHEMA).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let temp_dir = std::env::temp_dir();
        let root = temp_dir.join(format!("feedlog_storage_test_{}", std::process::id()));
        let nested_path = root.join("nested/prefs.db");
        let _ = std::fs::remove_dir_all(&root);

        let conn = open_database(&nested_path, &PREFERENCES_SCHEMA).unwrap();
        assert!(nested_path.exists());

        drop(conn);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let temp_dir = std::env::temp_dir();
        let db_path = temp_dir.join(format!("feedlog_reopen_test_{}.db", std::process::id()));

        {
            let conn = open_database(&db_path, &CLOUD_SCHEMA).unwrap();
            conn.execute("INSERT INTO zones (name) VALUES ('Z')", [])
                .unwrap();
        }

        let conn = open_database(&db_path, &CLOUD_SCHEMA).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM zones", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);

        drop(conn);
        let _ = std::fs::remove_file(&db_path);
        let _ = std::fs::remove_file(db_path.with_extension("db-wal"));
        let _ = std::fs::remove_file(db_path.with_extension("db-shm"));
    }
}
