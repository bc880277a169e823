//! Household cloud store backed by a shared `SQLite` file.
//!
//! Every device process in the household opens the same database file. The
//! file holds zones, one share object per zone, and records whose fields are
//! stored as JSON. Account status comes from configuration: a configured
//! account id means the device is signed in.
//!
//! Statements run on tokio's blocking pool. Faults of the file itself reach
//! callers as [`Error::Backend`]: a write lock held by another device becomes
//! `ServiceUnavailable` with a retry hint, anything else becomes `Internal`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    AccountStatus, BackendErrorCode, CloudBackend, InvitationHandle, RecordQuery,
    SharePermission, ZoneHandle,
};
use crate::error::{Error, Result};
use crate::record::{FieldValue, RemoteRecord, TIMESTAMP_FIELD};
use crate::storage::{self, BUSY_TIMEOUT, CLOUD_SCHEMA, IN_MEMORY_PATH};

/// A [`CloudBackend`] stored in a `SQLite` database.
#[derive(Debug)]
pub struct SqliteCloud {
    path: PathBuf,
    container_id: String,
    account_id: Option<String>,
    busy_timeout: Duration,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCloud {
    /// Open or create the household database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(
        path: impl AsRef<Path>,
        container_id: impl Into<String>,
        account_id: Option<String>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = storage::open_database(&path, &CLOUD_SCHEMA)?;
        Ok(Self::with_connection(path, conn, container_id, account_id))
    }

    /// Create an in-memory household database, for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory(
        container_id: impl Into<String>,
        account_id: Option<String>,
    ) -> Result<Self> {
        let conn = storage::open_in_memory(&CLOUD_SCHEMA)?;
        Ok(Self::with_connection(
            PathBuf::from(IN_MEMORY_PATH),
            conn,
            container_id,
            account_id,
        ))
    }

    fn with_connection(
        path: PathBuf,
        conn: Connection,
        container_id: impl Into<String>,
        account_id: Option<String>,
    ) -> Self {
        Self {
            path,
            container_id: container_id.into(),
            account_id: account_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
            busy_timeout: BUSY_TIMEOUT,
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn require_account(&self) -> Result<&str> {
        self.account_id.as_deref().ok_or_else(|| {
            Error::backend(
                BackendErrorCode::NotAuthenticated,
                "no household account is signed in on this device",
            )
        })
    }

    /// Run `op` against the connection on the blocking pool.
    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| Error::internal("cloud database lock poisoned"))?;
            op(&conn)
        })
        .await
        .unwrap_or_else(|e| Err(Error::internal(format!("cloud database task failed: {e}"))))
        .map_err(|err| remote_fault(err, self.busy_timeout))
    }

    /// Change how long statements wait on another connection's write lock.
    #[cfg(test)]
    pub(crate) fn with_busy_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("cloud database lock poisoned"))?
            .busy_timeout(timeout)?;
        self.busy_timeout = timeout;
        Ok(self)
    }

    /// Insert a record row without any encoding, for exercising bad data.
    #[cfg(test)]
    pub(crate) fn insert_raw_record(
        &self,
        zone: &ZoneHandle,
        record_name: &str,
        record_type: &str,
        fields_json: &str,
        sort_key: Option<i64>,
    ) -> Result<()> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("cloud database lock poisoned"))?
            .execute(
                r"
                INSERT INTO records (record_name, zone, record_type, fields, sort_key)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
                params![record_name, zone.name, record_type, fields_json, sort_key],
            )?;
        Ok(())
    }
}

/// Report a fault of the shared file the way a remote store reports one.
fn remote_fault(err: Error, busy_timeout: Duration) -> Error {
    match err {
        Error::Backend { .. } | Error::InvalidRecord { .. } => err,
        Error::DatabaseQuery(source)
            if matches!(
                source.sqlite_error_code(),
                Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            ) =>
        {
            Error::Backend {
                code: BackendErrorCode::ServiceUnavailable,
                message: format!("household database is busy: {source}"),
                retry_after: Some(busy_timeout),
            }
        }
        other => Error::backend(BackendErrorCode::Internal, other.to_string()),
    }
}

fn require_zone(conn: &Connection, zone: &ZoneHandle) -> Result<()> {
    let exists: Option<String> = conn
        .query_row(
            "SELECT name FROM zones WHERE name = ?1",
            [&zone.name],
            |row| row.get(0),
        )
        .optional()?;

    if exists.is_none() {
        return Err(Error::backend(
            BackendErrorCode::ZoneNotFound,
            format!("zone '{}' does not exist", zone.name),
        ));
    }
    Ok(())
}

fn share_url(container_id: &str, share_id: &str) -> String {
    format!("feedlog://{container_id}/share/{share_id}")
}

fn load_record(conn: &Connection, zone: &ZoneHandle, record_name: &str) -> Result<RemoteRecord> {
    let row: Option<(String, String, String)> = conn
        .query_row(
            r"
            SELECT record_name, record_type, fields
            FROM records WHERE zone = ?1 AND record_name = ?2
            ",
            params![zone.name, record_name],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let (name, record_type, fields) = row.ok_or_else(|| {
        Error::backend(
            BackendErrorCode::UnknownItem,
            format!("record '{record_name}' does not exist"),
        )
    })?;
    decode_record(name, record_type, &fields)
}

fn decode_record(record_name: String, record_type: String, fields: &str) -> Result<RemoteRecord> {
    let fields: BTreeMap<String, FieldValue> = serde_json::from_str(fields).map_err(|e| {
        Error::invalid_record(&record_name, format!("undecodable fields: {e}"))
    })?;
    Ok(RemoteRecord {
        record_name,
        record_type,
        fields,
    })
}

#[async_trait::async_trait]
impl CloudBackend for SqliteCloud {
    fn container_id(&self) -> &str {
        &self.container_id
    }

    async fn account_status(&self) -> Result<AccountStatus> {
        Ok(if self.account_id.is_some() {
            AccountStatus::Available
        } else {
            AccountStatus::NoAccount
        })
    }

    async fn user_record_id(&self) -> Result<String> {
        self.require_account().map(str::to_string)
    }

    async fn all_zones(&self) -> Result<Vec<ZoneHandle>> {
        self.require_account()?;
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM zones ORDER BY name")?;
            let zones = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .map(|name| name.map(ZoneHandle::new))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(zones)
        })
        .await
    }

    async fn save_zone(&self, zone: &ZoneHandle) -> Result<ZoneHandle> {
        self.require_account()?;
        let zone = zone.clone();
        self.run(move |conn| {
            let inserted =
                conn.execute("INSERT OR IGNORE INTO zones (name) VALUES (?1)", [&zone.name])?;

            if inserted == 0 {
                return Err(Error::backend(
                    BackendErrorCode::ZoneAlreadyExists,
                    format!("zone '{}' already exists", zone.name),
                ));
            }

            info!("Created zone '{}'", zone.name);
            Ok(zone)
        })
        .await
    }

    async fn fetch_share(&self, zone: &ZoneHandle) -> Result<Option<InvitationHandle>> {
        self.require_account()?;
        let zone = zone.clone();
        let container_id = self.container_id.clone();
        self.run(move |conn| {
            require_zone(conn, &zone)?;

            let row: Option<(String, String, String)> = conn
                .query_row(
                    "SELECT share_id, title, permission FROM shares WHERE zone = ?1",
                    [&zone.name],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            row.map(|(share_id, title, permission)| -> Result<InvitationHandle> {
                Ok(InvitationHandle {
                    url: share_url(&container_id, &share_id),
                    share_id,
                    zone: zone.clone(),
                    title,
                    permission: permission.parse()?,
                })
            })
            .transpose()
        })
        .await
    }

    async fn save_share(
        &self,
        zone: &ZoneHandle,
        title: &str,
        permission: SharePermission,
    ) -> Result<InvitationHandle> {
        self.require_account()?;
        let zone = zone.clone();
        let title = title.to_string();
        let container_id = self.container_id.clone();
        self.run(move |conn| {
            require_zone(conn, &zone)?;

            let share_id = Uuid::new_v4().to_string();
            let inserted = conn.execute(
                r"
                INSERT OR IGNORE INTO shares (zone, share_id, title, permission)
                VALUES (?1, ?2, ?3, ?4)
                ",
                params![zone.name, share_id, title, permission.to_string()],
            )?;

            if inserted == 0 {
                return Err(Error::backend(
                    BackendErrorCode::ServerRecordChanged,
                    format!("zone '{}' is already shared", zone.name),
                ));
            }

            info!("Created share '{}' for zone '{}'", title, zone.name);
            Ok(InvitationHandle {
                url: share_url(&container_id, &share_id),
                share_id,
                zone,
                title,
                permission,
            })
        })
        .await
    }

    async fn save_record(&self, zone: &ZoneHandle, record: RemoteRecord) -> Result<RemoteRecord> {
        self.require_account()?;
        let zone = zone.clone();
        self.run(move |conn| {
            require_zone(conn, &zone)?;

            let fields = serde_json::to_string(&record.fields)?;
            let sort_key = record
                .timestamp(TIMESTAMP_FIELD)
                .map(|timestamp| timestamp.timestamp_micros());

            let inserted = conn.execute(
                r"
                INSERT OR IGNORE INTO records (record_name, zone, record_type, fields, sort_key)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
                params![
                    record.record_name,
                    zone.name,
                    record.record_type,
                    fields,
                    sort_key
                ],
            )?;

            if inserted == 0 {
                return Err(Error::backend(
                    BackendErrorCode::ServerRecordChanged,
                    format!("record '{}' already exists", record.record_name),
                ));
            }

            debug!("Saved record {} in zone '{}'", record.record_name, zone.name);
            load_record(conn, &zone, &record.record_name)
        })
        .await
    }

    async fn query_records(
        &self,
        zone: &ZoneHandle,
        query: &RecordQuery,
    ) -> Result<Vec<Result<RemoteRecord>>> {
        self.require_account()?;
        let zone = zone.clone();
        let query = query.clone();
        let busy_timeout = self.busy_timeout;
        self.run(move |conn| {
            require_zone(conn, &zone)?;

            let order = if query.newest_first {
                "ORDER BY sort_key DESC, created_at DESC, record_name"
            } else {
                "ORDER BY rowid"
            };
            let sql = format!(
                r"
                SELECT record_name, record_type, fields
                FROM records WHERE zone = ?1 AND record_type = ?2
                {order} LIMIT ?3
                "
            );

            // SQLite treats a negative LIMIT as no limit.
            let limit_i64 = query
                .limit
                .map_or(-1, |limit| i64::try_from(limit).unwrap_or(i64::MAX));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![zone.name, query.record_type, limit_i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .map(|row| {
                    row.map_err(|e| remote_fault(e.into(), busy_timeout))
                        .and_then(|(name, record_type, fields)| {
                            decode_record(name, record_type, &fields)
                        })
                })
                .collect::<Vec<_>>();

            debug!(
                "Query for {} in zone '{}' returned {} rows",
                query.record_type,
                zone.name,
                rows.len()
            );
            Ok(rows)
        })
        .await
    }

    async fn delete_record(&self, zone: &ZoneHandle, record_name: &str) -> Result<()> {
        self.require_account()?;
        let zone = zone.clone();
        let record_name = record_name.to_string();
        self.run(move |conn| {
            let affected = conn.execute(
                "DELETE FROM records WHERE zone = ?1 AND record_name = ?2",
                params![zone.name, record_name],
            )?;

            if affected == 0 {
                return Err(Error::backend(
                    BackendErrorCode::UnknownItem,
                    format!("record '{record_name}' does not exist"),
                ));
            }

            debug!("Deleted record {} from zone '{}'", record_name, zone.name);
            Ok(())
        })
        .await
    }
}
