//! The feeding history manager.
//!
//! [`HistoryManager`] is the only thing presentation code talks to. It runs
//! the one-time initialization sequence, owns the capped most-recent-first
//! view of feeding records, and publishes every change of that view through a
//! `watch` channel.
//!
//! The view is always replaced wholesale, so subscribers only ever see the
//! result of a complete round-trip. Concurrent refreshes are last-write-wins.

mod refresh;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{watch, OnceCell};
use tracing::{error, info, warn};

use crate::backend::{AccountStatus, InvitationHandle};
use crate::error::{Error, Result};
use crate::gateway::{DeleteSummary, SyncGateway};
use crate::record::FeedingRecord;

pub use refresh::RefreshHandle;

/// Number of records kept in the view.
pub const HISTORY_LIMIT: usize = 5;

/// Default interval between periodic refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// The published view: newest first, at most [`HISTORY_LIMIT`] records.
pub type HistoryView = Vec<FeedingRecord>;

/// Lifecycle of a [`HistoryManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// [`HistoryManager::initialize`] has not been called.
    Uninitialized,
    /// Initialization is running.
    Initializing,
    /// Initialization finished. `degraded` means account or zone setup
    /// failed and record operations will fail.
    Ready {
        /// Whether setup failed.
        degraded: bool,
    },
}

impl Phase {
    /// Whether initialization has finished.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// Outcome of one initialization step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StepStatus {
    /// The step succeeded.
    Ok,
    /// The step was not attempted because an earlier essential step failed.
    Skipped,
    /// The step failed.
    Failed(String),
}

impl StepStatus {
    fn from_result<T>(step: &str, result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(e) => {
                warn!("Initialization step '{step}' failed: {e}");
                Self::Failed(e.to_string())
            }
        }
    }

    /// Whether the step succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// What happened during [`HistoryManager::initialize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitReport {
    /// Account status observed at startup.
    pub account: AccountStatus,
    /// Shared zone provisioning.
    pub zone: StepStatus,
    /// Share invitation provisioning (best effort).
    pub invitation: StepStatus,
    /// First fetch of the history.
    pub initial_fetch: StepStatus,
}

impl InitReport {
    /// Whether account or zone setup failed.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.account.is_available() || !self.zone.is_ok()
    }
}

/// Owner of the capped feeding history view.
#[derive(Debug)]
pub struct HistoryManager {
    gateway: Arc<SyncGateway>,
    view: watch::Sender<HistoryView>,
    phase: watch::Sender<Phase>,
    init: OnceCell<InitReport>,
}

impl HistoryManager {
    /// Create a manager over the given gateway.
    #[must_use]
    pub fn new(gateway: Arc<SyncGateway>) -> Self {
        let (view, _) = watch::channel(HistoryView::new());
        let (phase, _) = watch::channel(Phase::Uninitialized);
        Self {
            gateway,
            view,
            phase,
            init: OnceCell::new(),
        }
    }

    /// The gateway this manager drives.
    #[must_use]
    pub fn gateway(&self) -> &Arc<SyncGateway> {
        &self.gateway
    }

    /// Run the initialization sequence once.
    ///
    /// Steps run in order: account check, zone, invitation, first fetch. An
    /// unusable account or a failed zone skips the remaining steps and
    /// leaves the manager degraded; invitation and fetch failures are only
    /// recorded. The manager reaches [`Phase::Ready`] either way. Later calls
    /// return the first report without doing anything.
    pub async fn initialize(&self) -> InitReport {
        self.init
            .get_or_init(|| self.run_initialization())
            .await
            .clone()
    }

    async fn run_initialization(&self) -> InitReport {
        self.phase.send_replace(Phase::Initializing);
        info!("Initializing feeding history");

        let account = self.gateway.check_account_status().await;
        let mut report = InitReport {
            account,
            zone: StepStatus::Skipped,
            invitation: StepStatus::Skipped,
            initial_fetch: StepStatus::Skipped,
        };

        if account.is_available() {
            match self.gateway.ensure_shared_zone().await {
                Ok(zone) => {
                    report.zone = StepStatus::Ok;
                    let invitation = self.gateway.ensure_share_invitation(&zone).await;
                    report.invitation = StepStatus::from_result("invitation", &invitation);
                    let fetch = self.refresh().await;
                    report.initial_fetch = StepStatus::from_result("initial fetch", &fetch);
                }
                Err(e) => {
                    error!("Shared zone setup failed: {e}");
                    report.zone = StepStatus::Failed(e.to_string());
                }
            }
        }

        let degraded = report.is_degraded();
        if degraded {
            warn!("Feeding history ready in degraded mode");
        } else {
            info!("Feeding history ready");
        }
        self.phase.send_replace(Phase::Ready { degraded });
        report
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Wait until initialization has finished.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the phase channel closed, which cannot
    /// happen while the manager is alive.
    pub async fn wait_until_ready(&self) -> Result<Phase> {
        let mut phase = self.phase.subscribe();
        let ready = phase
            .wait_for(Phase::is_ready)
            .await
            .map_err(|_| Error::internal("history phase channel closed"))?;
        Ok(*ready)
    }

    /// Record a feeding happening now.
    ///
    /// On success the confirmed record is prepended to the view and the view
    /// is cut back to [`HISTORY_LIMIT`]. On failure the view is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for empty names,
    /// [`Error::NotAuthenticated`], [`Error::ZoneUnavailable`], or the
    /// backend fault that failed the save.
    pub async fn record_feeding(&self, actor_name: &str, subject_name: &str) -> Result<FeedingRecord> {
        let actor_name = actor_name.trim();
        let subject_name = subject_name.trim();
        if actor_name.is_empty() {
            return Err(Error::invalid_input("who fed the pet must not be empty"));
        }
        if subject_name.is_empty() {
            return Err(Error::invalid_input("pet name must not be empty"));
        }

        let zone = self.gateway.current_zone().await?;
        let record = self
            .gateway
            .create_record(&zone, actor_name, subject_name, Utc::now())
            .await?;

        self.view.send_modify(|view| {
            let mut next = HistoryView::with_capacity(HISTORY_LIMIT);
            next.push(record.clone());
            next.extend(view.iter().take(HISTORY_LIMIT - 1).cloned());
            *view = next;
        });
        Ok(record)
    }

    /// Replace the view with the newest records from the backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`], [`Error::ZoneUnavailable`], or
    /// the backend fault that failed the query. The view is unchanged on
    /// failure.
    pub async fn refresh(&self) -> Result<()> {
        let zone = self.gateway.current_zone().await?;
        let mut records = self.gateway.query_records(&zone, HISTORY_LIMIT).await?;
        records.truncate(HISTORY_LIMIT);
        self.view.send_replace(records);
        Ok(())
    }

    /// Delete every record in the shared zone and empty the view.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`], [`Error::ZoneUnavailable`], or
    /// the backend fault that failed the listing. Per-record delete failures
    /// are reported in the summary instead.
    pub async fn clear_all(&self) -> Result<DeleteSummary> {
        let zone = self.gateway.current_zone().await?;
        let summary = self.gateway.delete_all_records(&zone).await?;
        self.view.send_replace(HistoryView::new());
        Ok(summary)
    }

    /// The share invitation to hand to a share UI, if one was provisioned.
    pub async fn share_invitation(&self) -> Option<InvitationHandle> {
        self.gateway.share_invitation().await
    }

    /// A snapshot of the current view.
    #[must_use]
    pub fn records(&self) -> HistoryView {
        self.view.borrow().clone()
    }

    /// Subscribe to view changes. Drop the receiver to unsubscribe.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<HistoryView> {
        self.view.subscribe()
    }

    /// Start refreshing the view every `interval` once initialization is done.
    #[must_use]
    pub fn spawn_auto_refresh(self: &Arc<Self>, interval: Duration) -> RefreshHandle {
        RefreshHandle::spawn(Arc::clone(self), interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{FaultyBackend, Operation};
    use crate::backend::{BackendErrorCode, CloudBackend};
    use chrono::{DateTime, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_736_000_000 + secs, 0).unwrap()
    }

    fn manager_over(backend: &Arc<FaultyBackend>) -> Arc<HistoryManager> {
        let gateway = SyncGateway::new(Arc::clone(backend) as Arc<dyn CloudBackend>);
        Arc::new(HistoryManager::new(Arc::new(gateway)))
    }

    async fn ready_manager() -> (Arc<FaultyBackend>, Arc<HistoryManager>) {
        crate::logging::init_test_logging();
        let backend = Arc::new(FaultyBackend::signed_in());
        let manager = manager_over(&backend);
        let report = manager.initialize().await;
        assert!(!report.is_degraded());
        (backend, manager)
    }

    /// Write a record as another device would, bypassing this manager.
    async fn remote_write(manager: &HistoryManager, actor: &str, secs: i64) -> FeedingRecord {
        let gateway = manager.gateway();
        let zone = gateway.current_zone().await.unwrap();
        gateway
            .create_record(&zone, actor, "Rex", at(secs))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_initialize_happy_path() {
        let backend = Arc::new(FaultyBackend::signed_in());
        let manager = manager_over(&backend);
        assert_eq!(manager.phase(), Phase::Uninitialized);

        let report = manager.initialize().await;
        assert_eq!(report.account, AccountStatus::Available);
        assert_eq!(report.zone, StepStatus::Ok);
        assert_eq!(report.invitation, StepStatus::Ok);
        assert_eq!(report.initial_fetch, StepStatus::Ok);
        assert_eq!(manager.phase(), Phase::Ready { degraded: false });
        assert!(manager.share_invitation().await.is_some());
    }

    #[tokio::test]
    async fn test_initialize_runs_once() {
        let (backend, manager) = ready_manager().await;
        let zones_listed = backend.calls(Operation::AllZones);

        let (a, b) = tokio::join!(manager.initialize(), manager.initialize());
        assert_eq!(a, b);
        assert_eq!(backend.calls(Operation::AllZones), zones_listed);
        assert_eq!(backend.calls(Operation::AccountStatus), 1);
    }

    #[tokio::test]
    async fn test_initialize_concurrent_callers_share_one_run() {
        let backend = Arc::new(FaultyBackend::signed_in());
        let manager = manager_over(&backend);

        let (a, b) = tokio::join!(manager.initialize(), manager.initialize());
        assert_eq!(a, b);
        assert_eq!(backend.calls(Operation::AccountStatus), 1);
        assert_eq!(backend.calls(Operation::SaveZone), 1);
    }

    #[tokio::test]
    async fn test_initialize_without_account_is_degraded() {
        let backend = Arc::new(FaultyBackend::signed_out());
        let manager = manager_over(&backend);

        let report = manager.initialize().await;
        assert_eq!(report.account, AccountStatus::NoAccount);
        assert_eq!(report.zone, StepStatus::Skipped);
        assert_eq!(report.invitation, StepStatus::Skipped);
        assert_eq!(report.initial_fetch, StepStatus::Skipped);
        assert_eq!(manager.phase(), Phase::Ready { degraded: true });
        assert_eq!(backend.calls(Operation::AllZones), 0);
    }

    #[tokio::test]
    async fn test_zone_failure_skips_remaining_steps() {
        let backend = Arc::new(FaultyBackend::signed_in());
        backend.fail(Operation::AllZones, BackendErrorCode::NetworkFailure);
        let manager = manager_over(&backend);

        let report = manager.initialize().await;
        assert!(matches!(report.zone, StepStatus::Failed(_)));
        assert_eq!(report.invitation, StepStatus::Skipped);
        assert_eq!(report.initial_fetch, StepStatus::Skipped);
        assert_eq!(manager.phase(), Phase::Ready { degraded: true });

        let err = manager.refresh().await.unwrap_err();
        assert!(matches!(err, Error::ZoneUnavailable));
        let err = manager.record_feeding("Alice", "Rex").await.unwrap_err();
        assert!(matches!(err, Error::ZoneUnavailable));
    }

    #[tokio::test]
    async fn test_invitation_failure_is_not_fatal() {
        let backend = Arc::new(FaultyBackend::signed_in());
        backend.fail(Operation::SaveShare, BackendErrorCode::PermissionFailure);
        let manager = manager_over(&backend);

        let report = manager.initialize().await;
        assert!(matches!(report.invitation, StepStatus::Failed(_)));
        assert_eq!(report.initial_fetch, StepStatus::Ok);
        assert!(!report.is_degraded());
        assert_eq!(manager.phase(), Phase::Ready { degraded: false });
        assert!(manager.share_invitation().await.is_none());

        manager.record_feeding("Alice", "Rex").await.unwrap();
    }

    #[tokio::test]
    async fn test_initial_fetch_failure_is_recorded() {
        let backend = Arc::new(FaultyBackend::signed_in());
        backend.fail(Operation::QueryRecords, BackendErrorCode::ServiceUnavailable);
        let manager = manager_over(&backend);

        let report = manager.initialize().await;
        assert!(matches!(report.initial_fetch, StepStatus::Failed(_)));
        assert!(!report.is_degraded());
        assert!(manager.records().is_empty());
    }

    #[tokio::test]
    async fn test_initial_fetch_loads_existing_history() {
        let backend = Arc::new(FaultyBackend::signed_in());
        let earlier = manager_over(&backend);
        earlier.initialize().await;
        remote_write(&earlier, "Alice", 0).await;

        let manager = manager_over(&backend);
        manager.initialize().await;
        assert_eq!(manager.records().len(), 1);
        assert_eq!(manager.records()[0].actor_name, "Alice");
    }

    #[tokio::test]
    async fn test_wait_until_ready() {
        let backend = Arc::new(FaultyBackend::signed_in());
        let manager = manager_over(&backend);

        let waiter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.wait_until_ready().await.unwrap() })
        };
        manager.initialize().await;

        assert_eq!(waiter.await.unwrap(), Phase::Ready { degraded: false });
    }

    #[tokio::test]
    async fn test_record_feeding_scenario() {
        let (_backend, manager) = ready_manager().await;

        let alice = manager.record_feeding("Alice", "Rex").await.unwrap();
        let view = manager.records();
        assert_eq!(view, vec![alice.clone()]);
        assert_eq!(view[0].actor_name, "Alice");
        assert_eq!(view[0].subject_name, "Rex");

        tokio::time::sleep(Duration::from_millis(5)).await;
        let bob = manager.record_feeding("Bob", "Rex").await.unwrap();
        assert!(bob.timestamp > alice.timestamp);
        let view = manager.records();
        assert_eq!(view[0].id, bob.id);
        assert_eq!(view, vec![bob, alice]);
    }

    #[tokio::test]
    async fn test_later_feeding_is_listed_first() {
        let (_backend, manager) = ready_manager().await;
        let earlier = remote_write(&manager, "Alice", 0).await;
        let later = remote_write(&manager, "Bob", 1).await;

        manager.refresh().await.unwrap();
        let view = manager.records();
        assert_eq!(view.len(), 2);
        assert_eq!((view[0].timestamp, view[1].timestamp), (at(1), at(0)));
        assert_eq!(view, vec![later.clone(), earlier.clone()]);

        // A new feeding from this device goes in front of both.
        let newest = manager.record_feeding("Carol", "Rex").await.unwrap();
        assert!(newest.timestamp > at(1));
        assert_eq!(manager.records(), vec![newest, later, earlier]);
    }

    #[tokio::test]
    async fn test_record_feeding_trims_names() {
        let (_backend, manager) = ready_manager().await;
        let record = manager.record_feeding("  Alice ", " Rex").await.unwrap();
        assert_eq!(record.actor_name, "Alice");
        assert_eq!(record.subject_name, "Rex");
    }

    #[tokio::test]
    async fn test_record_feeding_rejects_empty_names() {
        let (backend, manager) = ready_manager().await;

        let err = manager.record_feeding("", "Rex").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        let err = manager.record_feeding("Alice", "   ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(backend.calls(Operation::SaveRecord), 0);
    }

    #[tokio::test]
    async fn test_view_never_exceeds_cap() {
        let (_backend, manager) = ready_manager().await;

        let mut last = None;
        for i in 0..(HISTORY_LIMIT + 4) {
            last = Some(manager.record_feeding(&format!("P{i}"), "Rex").await.unwrap());
            assert!(manager.records().len() <= HISTORY_LIMIT);
        }

        let view = manager.records();
        assert_eq!(view.len(), HISTORY_LIMIT);
        assert_eq!(Some(view[0].clone()), last);
    }

    #[tokio::test]
    async fn test_failed_record_feeding_leaves_view() {
        let (backend, manager) = ready_manager().await;
        manager.record_feeding("Alice", "Rex").await.unwrap();
        let before = manager.records();

        backend.fail(Operation::SaveRecord, BackendErrorCode::NetworkFailure);
        let err = manager.record_feeding("Bob", "Rex").await.unwrap_err();
        assert!(err.is_backend_code(BackendErrorCode::NetworkFailure));
        assert_eq!(manager.records(), before);
    }

    #[tokio::test]
    async fn test_no_account_operations_fail() {
        let backend = Arc::new(FaultyBackend::signed_out());
        let manager = manager_over(&backend);
        manager.initialize().await;

        let err = manager.record_feeding("Alice", "Rex").await.unwrap_err();
        assert!(matches!(
            err,
            Error::NotAuthenticated {
                status: AccountStatus::NoAccount
            }
        ));
        let err = manager.refresh().await.unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated { .. }));
        assert!(manager.clear_all().await.unwrap_err().is_not_authenticated());
        assert!(manager.records().is_empty());
    }

    #[tokio::test]
    async fn test_operations_before_initialize_fail() {
        let backend = Arc::new(FaultyBackend::signed_in());
        let manager = manager_over(&backend);

        assert!(manager.refresh().await.unwrap_err().is_not_authenticated());
        assert!(manager.records().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_matches_backend_top_records() {
        let (_backend, manager) = ready_manager().await;
        let mut written = Vec::new();
        for secs in [3, 9, 1, 7, 5, 2, 8] {
            written.push(remote_write(&manager, &format!("P{secs}"), secs).await);
        }

        manager.refresh().await.unwrap();

        written.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        written.truncate(HISTORY_LIMIT);
        assert_eq!(manager.records(), written);
    }

    #[tokio::test]
    async fn test_refresh_with_seven_records_keeps_five_newest() {
        let (_backend, manager) = ready_manager().await;
        for secs in 0..7 {
            remote_write(&manager, "Alice", secs).await;
        }

        manager.refresh().await.unwrap();
        let stamps: Vec<_> = manager.records().iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![at(6), at(5), at(4), at(3), at(2)]);
    }

    #[tokio::test]
    async fn test_refresh_replaces_view_even_when_empty() {
        let (backend, manager) = ready_manager().await;
        manager.record_feeding("Alice", "Rex").await.unwrap();

        // Another device cleared everything.
        let zone = manager.gateway().current_zone().await.unwrap();
        let other = SyncGateway::new(Arc::clone(&backend) as Arc<dyn CloudBackend>);
        other.check_account_status().await;
        assert_eq!(other.ensure_shared_zone().await.unwrap(), zone);
        other.delete_all_records(&zone).await.unwrap();

        manager.refresh().await.unwrap();
        assert!(manager.records().is_empty());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_last_known_view() {
        let (backend, manager) = ready_manager().await;
        manager.record_feeding("Alice", "Rex").await.unwrap();
        let before = manager.records();

        backend.fail(Operation::QueryRecords, BackendErrorCode::NetworkFailure);
        assert!(manager.refresh().await.is_err());
        assert_eq!(manager.records(), before);

        backend.heal(Operation::QueryRecords);
        remote_write(&manager, "Bob", 0).await;
        manager.refresh().await.unwrap();
        assert_eq!(manager.records().len(), 2);
    }

    #[tokio::test]
    async fn test_clear_all_then_refresh_is_empty() {
        let (_backend, manager) = ready_manager().await;
        for _ in 0..3 {
            manager.record_feeding("Alice", "Rex").await.unwrap();
        }

        let summary = manager.clear_all().await.unwrap();
        assert_eq!(summary.deleted, 3);
        assert!(manager.records().is_empty());

        manager.refresh().await.unwrap();
        assert!(manager.records().is_empty());
    }

    #[tokio::test]
    async fn test_clear_all_empties_view_despite_item_failures() {
        let (backend, manager) = ready_manager().await;
        let stuck = manager.record_feeding("Alice", "Rex").await.unwrap();
        manager.record_feeding("Bob", "Rex").await.unwrap();
        backend.fail_delete_of(&stuck.id);

        let summary = manager.clear_all().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert!(manager.records().is_empty());

        manager.refresh().await.unwrap();
        assert_eq!(manager.records(), vec![stuck]);
    }

    #[tokio::test]
    async fn test_subscribe_sees_wholesale_updates() {
        let (_backend, manager) = ready_manager().await;
        let mut rx = manager.subscribe();
        assert!(!rx.has_changed().unwrap());

        let record = manager.record_feeding("Alice", "Rex").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), vec![record]);

        manager.clear_all().await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_picks_up_remote_writes() {
        let (_backend, manager) = ready_manager().await;
        let handle = manager.spawn_auto_refresh(DEFAULT_REFRESH_INTERVAL);
        assert_eq!(handle.interval(), Duration::from_secs(30));

        remote_write(&manager, "Bob", 0).await;
        assert!(manager.records().is_empty());

        let mut rx = manager.subscribe();
        tokio::time::timeout(Duration::from_secs(60), rx.wait_for(|view| view.len() == 1))
            .await
            .expect("periodic refresh did not run")
            .unwrap();
        assert_eq!(manager.records()[0].actor_name, "Bob");

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_waits_for_ready() {
        let backend = Arc::new(FaultyBackend::signed_in());
        let manager = manager_over(&backend);
        let handle = manager.spawn_auto_refresh(Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(backend.calls(Operation::QueryRecords), 0);

        manager.initialize().await;
        let after_init = backend.calls(Operation::QueryRecords);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(backend.calls(Operation::QueryRecords) > after_init);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_survives_failures_and_stops() {
        let (backend, manager) = ready_manager().await;
        backend.fail(Operation::QueryRecords, BackendErrorCode::NetworkFailure);
        let handle = manager.spawn_auto_refresh(Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(65)).await;
        let failed_attempts = backend.calls(Operation::QueryRecords);
        assert!(failed_attempts >= 3);

        handle.stop();
        assert!(handle.is_stopped());
        handle.shutdown().await;

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(backend.calls(Operation::QueryRecords), failed_attempts);
    }
}
