//! The sync gateway: sole owner of remote I/O.
//!
//! [`SyncGateway`] wraps a [`CloudBackend`] with the household's session
//! state (account status, the shared zone, the share invitation) and turns
//! raw backend records into [`FeedingRecord`]s. It never retries; the only
//! resilience is skipping individual bad items inside batch operations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::backend::{
    AccountStatus, BackendErrorCode, CloudBackend, InvitationHandle, RecordQuery,
    SharePermission, ZoneHandle,
};
use crate::error::{Error, Result};
use crate::record::{FeedingRecord, RECORD_TYPE};

/// Name of the zone every household member writes to.
pub const SHARED_ZONE_NAME: &str = "SharedFeedingZone";

/// Title of the share object offered to invitees.
pub const SHARE_TITLE: &str = "Dog Feeding Records";

#[derive(Debug, Default)]
struct Session {
    account: Option<AccountStatus>,
    zone: Option<ZoneHandle>,
    invitation: Option<InvitationHandle>,
}

/// Authenticated channel to the household's shared zone.
#[derive(Debug)]
pub struct SyncGateway {
    backend: Arc<dyn CloudBackend>,
    session: RwLock<Session>,
}

/// Outcome of [`SyncGateway::delete_all_records`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeleteSummary {
    /// Records found in the zone.
    pub attempted: usize,
    /// Records deleted.
    pub deleted: usize,
    /// Records that could not be loaded or deleted.
    pub failed: usize,
}

/// Result of the one-record probe query in [`Diagnostics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ZoneProbe {
    /// No zone was available to probe.
    NotRun,
    /// The zone answered a query.
    Reachable {
        /// Rows returned by the probe (0 or 1).
        records_found: usize,
    },
    /// The probe query failed.
    Failed {
        /// Why it failed.
        reason: String,
    },
}

/// Connectivity report produced by [`SyncGateway::diagnose`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Container holding the household's data.
    pub container_id: String,
    /// Account status as reported right now.
    pub account_status: AccountStatus,
    /// The signed-in user, when the account is available.
    pub user_record_id: Option<String>,
    /// Name of the shared zone provisioned in this session.
    pub zone: Option<String>,
    /// Whether the shared zone answers queries.
    pub zone_probe: ZoneProbe,
    /// Whether a share invitation is known.
    pub has_invitation: bool,
}

impl SyncGateway {
    /// Create a gateway over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn CloudBackend>) -> Self {
        Self {
            backend,
            session: RwLock::new(Session::default()),
        }
    }

    /// Ask the account provider whether remote operations may proceed.
    ///
    /// The answer is remembered; every later operation fails with
    /// [`Error::NotAuthenticated`] unless it was [`AccountStatus::Available`].
    pub async fn check_account_status(&self) -> AccountStatus {
        let status = match self.backend.account_status().await {
            Ok(status) => status,
            Err(e) => {
                warn!("Could not check account status: {e}");
                AccountStatus::CouldNotDetermine
            }
        };

        if status.is_available() {
            info!("Household account available");
        } else {
            warn!("Household account {status}: {}", status.guidance());
        }

        self.session.write().await.account = Some(status);
        status
    }

    async fn require_authenticated(&self) -> Result<()> {
        match self.session.read().await.account {
            Some(AccountStatus::Available) => Ok(()),
            status => Err(Error::NotAuthenticated {
                status: status.unwrap_or(AccountStatus::CouldNotDetermine),
            }),
        }
    }

    /// Record operations only touch the zone this session provisioned.
    async fn require_zone(&self, zone: &ZoneHandle) -> Result<()> {
        self.require_authenticated().await?;
        if self.session.read().await.zone.as_ref() == Some(zone) {
            Ok(())
        } else {
            Err(Error::ZoneUnavailable)
        }
    }

    /// Find or create the shared zone.
    ///
    /// Safe to call from several devices at once: losing the create race to
    /// another device counts as success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`] without a usable account, or the
    /// backend fault that prevented listing or creating the zone.
    pub async fn ensure_shared_zone(&self) -> Result<ZoneHandle> {
        self.require_authenticated().await?;

        if let Some(zone) = self.session.read().await.zone.clone() {
            return Ok(zone);
        }

        let zones = self.backend.all_zones().await?;
        let zone = if let Some(existing) = zones.into_iter().find(|z| z.name == SHARED_ZONE_NAME) {
            info!("Found existing shared zone '{}'", existing.name);
            existing
        } else {
            let wanted = ZoneHandle::new(SHARED_ZONE_NAME);
            match self.backend.save_zone(&wanted).await {
                Ok(created) => {
                    info!("Created shared zone '{}'", created.name);
                    created
                }
                Err(e)
                    if e.is_backend_code(BackendErrorCode::ZoneAlreadyExists)
                        || e.is_backend_code(BackendErrorCode::ServerRecordChanged) =>
                {
                    info!("Shared zone '{}' was created concurrently; reusing it", wanted.name);
                    wanted
                }
                Err(e) => {
                    error!("Failed to create shared zone: {e}");
                    return Err(e);
                }
            }
        };

        self.session.write().await.zone = Some(zone.clone());
        Ok(zone)
    }

    /// Find or create the share invitation for a zone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`] without a usable account, or the
    /// backend fault that prevented fetching or creating the share.
    pub async fn ensure_share_invitation(&self, zone: &ZoneHandle) -> Result<InvitationHandle> {
        self.require_authenticated().await?;

        if let Some(invitation) = self.session.read().await.invitation.as_ref() {
            if invitation.zone == *zone {
                return Ok(invitation.clone());
            }
        }

        let invitation = if let Some(existing) = self.backend.fetch_share(zone).await? {
            info!("Found existing share '{}'", existing.title);
            existing
        } else {
            match self
                .backend
                .save_share(zone, SHARE_TITLE, SharePermission::ReadWrite)
                .await
            {
                Ok(created) => {
                    info!("Created share '{}'", created.title);
                    created
                }
                Err(e) if e.is_backend_code(BackendErrorCode::ServerRecordChanged) => {
                    info!("Share for zone '{}' already exists; fetching it", zone.name);
                    self.backend.fetch_share(zone).await?.ok_or_else(|| {
                        Error::backend(
                            BackendErrorCode::ServerRecordChanged,
                            format!("share for zone '{}' changed but could not be fetched", zone.name),
                        )
                    })?
                }
                Err(e) => return Err(e),
            }
        };

        self.session.write().await.invitation = Some(invitation.clone());
        Ok(invitation)
    }

    /// The zone provisioned by [`Self::ensure_shared_zone`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`] without a usable account and
    /// [`Error::ZoneUnavailable`] if no zone has been provisioned.
    pub async fn current_zone(&self) -> Result<ZoneHandle> {
        self.require_authenticated().await?;
        self.session
            .read()
            .await
            .zone
            .clone()
            .ok_or(Error::ZoneUnavailable)
    }

    /// The invitation provisioned by [`Self::ensure_share_invitation`].
    pub async fn share_invitation(&self) -> Option<InvitationHandle> {
        self.session.read().await.invitation.clone()
    }

    /// Write one feeding record and return it as the backend confirmed it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`] without a usable account,
    /// [`Error::ZoneUnavailable`] unless `zone` is the zone this session
    /// provisioned, or the backend fault that prevented the save.
    pub async fn create_record(
        &self,
        zone: &ZoneHandle,
        actor_name: &str,
        subject_name: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<FeedingRecord> {
        self.require_zone(zone).await?;

        let proposed = FeedingRecord::at(actor_name, subject_name, timestamp);
        debug!(
            "Saving feeding record {} ({} fed {} at {})",
            proposed.id, proposed.actor_name, proposed.subject_name, proposed.timestamp
        );

        let saved = self
            .backend
            .save_record(zone, proposed.to_remote())
            .await
            .inspect_err(|e| error!("Failed to save feeding record: {e}"))?;

        let confirmed = FeedingRecord::confirmed(&saved, &proposed);
        info!("Saved feeding record {}", confirmed.id);
        Ok(confirmed)
    }

    /// Fetch up to `limit` records, newest first.
    ///
    /// Records that fail to load or parse are skipped individually.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`] without a usable account,
    /// [`Error::ZoneUnavailable`] unless `zone` was provisioned by this
    /// session, or the backend fault that failed the whole query.
    pub async fn query_records(&self, zone: &ZoneHandle, limit: usize) -> Result<Vec<FeedingRecord>> {
        self.require_zone(zone).await?;

        let results = self
            .backend
            .query_records(zone, &RecordQuery::newest_first(RECORD_TYPE, Some(limit)))
            .await
            .inspect_err(|e| error!("Failed to fetch feeding records: {e}"))?;

        let found = results.len();
        let records: Vec<FeedingRecord> = results
            .into_iter()
            .filter_map(|item| match item.and_then(|remote| FeedingRecord::try_from(&remote)) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping record: {e}");
                    None
                }
            })
            .collect();

        debug!("Fetched {} of {} feeding records", records.len(), found);
        Ok(records)
    }

    /// Delete every feeding record in the zone.
    ///
    /// Individual failures are logged and counted, never propagated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`] without a usable account,
    /// [`Error::ZoneUnavailable`] unless `zone` was provisioned by this
    /// session, or the backend fault that failed the initial listing.
    pub async fn delete_all_records(&self, zone: &ZoneHandle) -> Result<DeleteSummary> {
        self.require_zone(zone).await?;

        let results = self
            .backend
            .query_records(zone, &RecordQuery::all(RECORD_TYPE))
            .await
            .inspect_err(|e| error!("Failed to list records for deletion: {e}"))?;

        let mut summary = DeleteSummary {
            attempted: results.len(),
            ..DeleteSummary::default()
        };
        info!("Deleting {} feeding records", summary.attempted);

        for item in results {
            let remote = match item {
                Ok(remote) => remote,
                Err(e) => {
                    warn!("Could not load record for deletion: {e}");
                    summary.failed += 1;
                    continue;
                }
            };

            match self.backend.delete_record(zone, &remote.record_name).await {
                Ok(()) => summary.deleted += 1,
                Err(e) => {
                    warn!("Failed to delete record {}: {e}", remote.record_name);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Deleted {} of {} feeding records ({} failed)",
            summary.deleted, summary.attempted, summary.failed
        );
        Ok(summary)
    }

    /// Check the account and the shared zone without changing anything.
    pub async fn diagnose(&self) -> Diagnostics {
        let account_status = match self.backend.account_status().await {
            Ok(status) => status,
            Err(e) => {
                warn!("Account status check failed: {e}");
                AccountStatus::CouldNotDetermine
            }
        };

        let user_record_id = if account_status.is_available() {
            match self.backend.user_record_id().await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("Could not fetch user record id: {e}");
                    None
                }
            }
        } else {
            None
        };

        let (zone, has_invitation) = {
            let session = self.session.read().await;
            (session.zone.clone(), session.invitation.is_some())
        };

        let zone_probe = match (&zone, account_status.is_available()) {
            (Some(zone), true) => match self
                .backend
                .query_records(zone, &RecordQuery::newest_first(RECORD_TYPE, Some(1)))
                .await
            {
                Ok(rows) => ZoneProbe::Reachable {
                    records_found: rows.len(),
                },
                Err(e) => ZoneProbe::Failed {
                    reason: e.to_string(),
                },
            },
            _ => ZoneProbe::NotRun,
        };

        Diagnostics {
            container_id: self.backend.container_id().to_string(),
            account_status,
            user_record_id,
            zone: zone.map(|z| z.name),
            zone_probe,
            has_invitation,
        }
    }
}
