//! Fault injection around [`SqliteCloud`] for gateway and history tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{
    AccountStatus, BackendErrorCode, CloudBackend, InvitationHandle, RecordQuery,
    SharePermission, SqliteCloud, ZoneHandle,
};
use crate::error::{Error, Result};
use crate::record::RemoteRecord;

/// Backend operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Operation {
    AccountStatus,
    AllZones,
    SaveZone,
    FetchShare,
    SaveShare,
    SaveRecord,
    QueryRecords,
    DeleteRecord,
}

#[derive(Debug)]
pub(crate) struct FaultyBackend {
    inner: SqliteCloud,
    faults: Mutex<HashMap<Operation, BackendErrorCode>>,
    failing_deletes: Mutex<HashSet<String>>,
    hide_zones_once: AtomicBool,
    status_override: Mutex<Option<AccountStatus>>,
    calls: Mutex<HashMap<Operation, usize>>,
}

impl FaultyBackend {
    pub(crate) fn wrap(inner: SqliteCloud) -> Self {
        Self {
            inner,
            faults: Mutex::new(HashMap::new()),
            failing_deletes: Mutex::new(HashSet::new()),
            hide_zones_once: AtomicBool::new(false),
            status_override: Mutex::new(None),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn signed_in() -> Self {
        Self::wrap(SqliteCloud::open_in_memory("test.container", Some("tester".to_string())).unwrap())
    }

    pub(crate) fn signed_out() -> Self {
        Self::wrap(SqliteCloud::open_in_memory("test.container", None).unwrap())
    }

    pub(crate) fn inner(&self) -> &SqliteCloud {
        &self.inner
    }

    pub(crate) fn fail(&self, op: Operation, code: BackendErrorCode) {
        self.faults.lock().unwrap().insert(op, code);
    }

    pub(crate) fn heal(&self, op: Operation) {
        self.faults.lock().unwrap().remove(&op);
    }

    pub(crate) fn fail_delete_of(&self, record_name: &str) {
        self.failing_deletes
            .lock()
            .unwrap()
            .insert(record_name.to_string());
    }

    /// Make the next zone listing come back empty, as if another device
    /// created the zone between our list and our create.
    pub(crate) fn hide_zones_once(&self) {
        self.hide_zones_once.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_account_status(&self, status: AccountStatus) {
        *self.status_override.lock().unwrap() = Some(status);
    }

    pub(crate) fn calls(&self, op: Operation) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    fn check(&self, op: Operation) -> Result<()> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
        match self.faults.lock().unwrap().get(&op) {
            Some(code) => Err(Error::backend(*code, format!("injected {op:?} failure"))),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl CloudBackend for FaultyBackend {
    fn container_id(&self) -> &str {
        self.inner.container_id()
    }

    async fn account_status(&self) -> Result<AccountStatus> {
        self.check(Operation::AccountStatus)?;
        let status_override = *self.status_override.lock().unwrap();
        match status_override {
            Some(status) => Ok(status),
            None => self.inner.account_status().await,
        }
    }

    async fn user_record_id(&self) -> Result<String> {
        self.inner.user_record_id().await
    }

    async fn all_zones(&self) -> Result<Vec<ZoneHandle>> {
        self.check(Operation::AllZones)?;
        if self.hide_zones_once.swap(false, Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        self.inner.all_zones().await
    }

    async fn save_zone(&self, zone: &ZoneHandle) -> Result<ZoneHandle> {
        self.check(Operation::SaveZone)?;
        self.inner.save_zone(zone).await
    }

    async fn fetch_share(&self, zone: &ZoneHandle) -> Result<Option<InvitationHandle>> {
        self.check(Operation::FetchShare)?;
        self.inner.fetch_share(zone).await
    }

    async fn save_share(
        &self,
        zone: &ZoneHandle,
        title: &str,
        permission: SharePermission,
    ) -> Result<InvitationHandle> {
        self.check(Operation::SaveShare)?;
        self.inner.save_share(zone, title, permission).await
    }

    async fn save_record(&self, zone: &ZoneHandle, record: RemoteRecord) -> Result<RemoteRecord> {
        self.check(Operation::SaveRecord)?;
        self.inner.save_record(zone, record).await
    }

    async fn query_records(
        &self,
        zone: &ZoneHandle,
        query: &RecordQuery,
    ) -> Result<Vec<Result<RemoteRecord>>> {
        self.check(Operation::QueryRecords)?;
        self.inner.query_records(zone, query).await
    }

    async fn delete_record(&self, zone: &ZoneHandle, record_name: &str) -> Result<()> {
        self.check(Operation::DeleteRecord)?;
        if self.failing_deletes.lock().unwrap().contains(record_name) {
            return Err(Error::backend(
                BackendErrorCode::NetworkFailure,
                format!("injected delete failure for {record_name}"),
            ));
        }
        self.inner.delete_record(zone, record_name).await
    }
}
