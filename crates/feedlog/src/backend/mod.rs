//! The remote backend seam.
//!
//! [`CloudBackend`] is everything the sync gateway needs from the outside
//! world: the account provider (is anyone signed in?) and the shared store
//! (zones, share objects and records). [`SqliteCloud`] implements it on top
//! of a household `SQLite` file.

mod sqlite;
#[cfg(test)]
pub(crate) mod testing;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::record::RemoteRecord;

pub use sqlite::SqliteCloud;

/// State of the household account on this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Signed in; remote operations may proceed.
    Available,
    /// Nobody is signed in.
    NoAccount,
    /// Access is blocked by a policy on this device.
    Restricted,
    /// The account provider could not be reached or gave no answer.
    CouldNotDetermine,
    /// Signed in, but the account cannot be used right now.
    TemporarilyUnavailable,
}

impl AccountStatus {
    /// Whether remote operations may proceed.
    #[must_use]
    pub fn is_available(self) -> bool {
        self == Self::Available
    }

    /// A short instruction for the user.
    #[must_use]
    pub fn guidance(self) -> &'static str {
        match self {
            Self::Available => "account is ready",
            Self::NoAccount => "sign in to the household account to sync feedings",
            Self::Restricted => "account access is restricted on this device",
            Self::CouldNotDetermine => "account status could not be determined; try again later",
            Self::TemporarilyUnavailable => "account is temporarily unavailable; try again later",
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::NoAccount => write!(f, "no_account"),
            Self::Restricted => write!(f, "restricted"),
            Self::CouldNotDetermine => write!(f, "could_not_determine"),
            Self::TemporarilyUnavailable => write!(f, "temporarily_unavailable"),
        }
    }
}

/// Classification of a backend fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorCode {
    /// Tried to create a zone that already exists.
    ZoneAlreadyExists,
    /// The server holds a different version of the object being saved.
    ServerRecordChanged,
    /// The referenced record does not exist.
    UnknownItem,
    /// The referenced zone does not exist.
    ZoneNotFound,
    /// The backend could not be reached.
    NetworkFailure,
    /// The request was made without a usable account.
    NotAuthenticated,
    /// The account may not perform this operation.
    PermissionFailure,
    /// The container is invalid or not accessible.
    BadContainer,
    /// The service is down.
    ServiceUnavailable,
    /// Too many requests; see the retry hint.
    RequestRateLimited,
    /// Anything else.
    Internal,
}

impl std::fmt::Display for BackendErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ZoneAlreadyExists => "zone_already_exists",
            Self::ServerRecordChanged => "server_record_changed",
            Self::UnknownItem => "unknown_item",
            Self::ZoneNotFound => "zone_not_found",
            Self::NetworkFailure => "network_failure",
            Self::NotAuthenticated => "not_authenticated",
            Self::PermissionFailure => "permission_failure",
            Self::BadContainer => "bad_container",
            Self::ServiceUnavailable => "service_unavailable",
            Self::RequestRateLimited => "request_rate_limited",
            Self::Internal => "internal",
        };
        write!(f, "{name}")
    }
}

/// A record zone in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZoneHandle {
    /// Zone name, unique within the container.
    pub name: String,
}

impl ZoneHandle {
    /// Create a handle for the named zone.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// What invitees may do in a shared zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharePermission {
    /// Invitees may only read records.
    ReadOnly,
    /// Invitees may create and delete records.
    ReadWrite,
}

impl std::fmt::Display for SharePermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read_only"),
            Self::ReadWrite => write!(f, "read_write"),
        }
    }
}

impl std::str::FromStr for SharePermission {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "read_only" => Ok(Self::ReadOnly),
            "read_write" => Ok(Self::ReadWrite),
            other => Err(crate::error::Error::internal(format!(
                "unknown share permission: {other}"
            ))),
        }
    }
}

/// A share object granting other household members access to a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationHandle {
    /// Backend identifier of the share.
    pub share_id: String,
    /// The zone being shared.
    pub zone: ZoneHandle,
    /// Title shown to invitees.
    pub title: String,
    /// Link that invitees open to accept the share.
    pub url: String,
    /// What invitees may do.
    pub permission: SharePermission,
}

/// A record query within one zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    /// Only records of this type are returned.
    pub record_type: String,
    /// Order by the record's `timestamp` field, newest first.
    pub newest_first: bool,
    /// Maximum number of records; `None` for all of them.
    pub limit: Option<usize>,
}

impl RecordQuery {
    /// Newest-first query for a record type.
    #[must_use]
    pub fn newest_first(record_type: impl Into<String>, limit: Option<usize>) -> Self {
        Self {
            record_type: record_type.into(),
            newest_first: true,
            limit,
        }
    }

    /// Unordered query returning every record of a type.
    #[must_use]
    pub fn all(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            newest_first: false,
            limit: None,
        }
    }
}

/// The account provider and shared record store.
///
/// Implementations report faults as [`crate::Error::Backend`] and never
/// retry on their own.
#[async_trait::async_trait]
pub trait CloudBackend: Send + Sync + std::fmt::Debug {
    /// Identifier of the container holding the household's data.
    fn container_id(&self) -> &str;

    /// Current account status on this device.
    async fn account_status(&self) -> Result<AccountStatus>;

    /// Identifier of the signed-in user.
    async fn user_record_id(&self) -> Result<String>;

    /// All zones in the container.
    async fn all_zones(&self) -> Result<Vec<ZoneHandle>>;

    /// Create a zone. Fails with `ZoneAlreadyExists` if it is already there.
    async fn save_zone(&self, zone: &ZoneHandle) -> Result<ZoneHandle>;

    /// The share object for a zone, if one exists.
    async fn fetch_share(&self, zone: &ZoneHandle) -> Result<Option<InvitationHandle>>;

    /// Create the share object for a zone. Fails with `ServerRecordChanged`
    /// if the zone is already shared.
    async fn save_share(
        &self,
        zone: &ZoneHandle,
        title: &str,
        permission: SharePermission,
    ) -> Result<InvitationHandle>;

    /// Save a new record and return it as stored.
    async fn save_record(&self, zone: &ZoneHandle, record: RemoteRecord) -> Result<RemoteRecord>;

    /// Run a query. The outer error fails the whole query; inner errors are
    /// per-record faults.
    async fn query_records(
        &self,
        zone: &ZoneHandle,
        query: &RecordQuery,
    ) -> Result<Vec<Result<RemoteRecord>>>;

    /// Delete one record by name.
    async fn delete_record(&self, zone: &ZoneHandle, record_name: &str) -> Result<()>;
}
