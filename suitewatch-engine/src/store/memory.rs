// Copyright (c) The suitewatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An in-process [`DashboardStore`] used by unit and scenario tests.

use crate::{
    errors::StoreError,
    store::{DashboardStore, RunFilter, StatusTransaction},
};
use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Mutex, PoisonError},
};
use suitewatch_metadata::{
    CaseExecution, CaseExecutionKey, DeviceRecord, RunKey, RunKind, RunRecord, TestKey, TestStatus,
};
use tracing::debug;

/// An in-memory dashboard store.
///
/// Supports scripted fault injection on commit so the optimistic update
/// loop's retry behavior can be exercised deterministically.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    statuses: BTreeMap<TestKey, StoredStatus>,
    runs: BTreeMap<TestKey, Vec<StoredRun>>,
    executions: HashMap<CaseExecutionKey, CaseExecution>,
    devices: Vec<DeviceRecord>,
    commit_faults: VecDeque<StoreError>,
}

#[derive(Clone, Debug)]
enum StoredStatus {
    Valid(TestStatus),
    Corrupt,
}

#[derive(Clone, Debug)]
enum StoredRun {
    Valid(RunRecord),
    Malformed { start_micros: i64, kind: RunKind },
}

impl StoredRun {
    fn start_micros(&self) -> i64 {
        match self {
            StoredRun::Valid(run) => run.start_micros,
            StoredRun::Malformed { start_micros, .. } => *start_micros,
        }
    }

    fn kind(&self) -> RunKind {
        match self {
            StoredRun::Valid(run) => run.kind,
            StoredRun::Malformed { kind, .. } => *kind,
        }
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a test's status aggregate.
    pub fn insert_status(&self, status: TestStatus) {
        let mut inner = self.lock();
        inner
            .statuses
            .insert(status.test.clone(), StoredStatus::Valid(status));
    }

    /// Inserts an undecodable status aggregate for `test`. Reads of it
    /// surface [`StoreError::Malformed`].
    pub fn insert_corrupt_status(&self, test: TestKey) {
        let mut inner = self.lock();
        inner.statuses.insert(test, StoredStatus::Corrupt);
    }

    /// Removes a test's status aggregate, simulating concurrent deletion.
    pub fn remove_status(&self, test: &TestKey) {
        let mut inner = self.lock();
        inner.statuses.remove(test);
    }

    /// Returns a test's current status aggregate, if present and valid.
    pub fn status(&self, test: &TestKey) -> Option<TestStatus> {
        let inner = self.lock();
        match inner.statuses.get(test) {
            Some(StoredStatus::Valid(status)) => Some(status.clone()),
            _ => None,
        }
    }

    /// Records an execution run.
    pub fn add_run(&self, run: RunRecord) {
        let mut inner = self.lock();
        inner
            .runs
            .entry(run.test.clone())
            .or_default()
            .push(StoredRun::Valid(run));
    }

    /// Records a run whose body cannot be decoded. The start time and kind
    /// remain queryable so the run still participates in filtering.
    pub fn add_malformed_run(&self, test: TestKey, start_micros: i64, kind: RunKind) {
        let mut inner = self.lock();
        inner
            .runs
            .entry(test)
            .or_default()
            .push(StoredRun::Malformed { start_micros, kind });
    }

    /// Records a case-execution batch.
    pub fn add_case_execution(&self, execution: CaseExecution) {
        let mut inner = self.lock();
        inner.executions.insert(execution.key, execution);
    }

    /// Records a device participant.
    pub fn add_device(&self, device: DeviceRecord) {
        let mut inner = self.lock();
        inner.devices.push(device);
    }

    /// Queues a fault to be returned by the next transaction commit.
    /// Queued faults are consumed in order.
    pub fn inject_commit_fault(&self, fault: StoreError) {
        let mut inner = self.lock();
        inner.commit_faults.push_back(fault);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DashboardStore for MemoryStore {
    type Txn<'a> = MemoryTransaction<'a>;

    fn all_tests(&self) -> Box<dyn Iterator<Item = Result<TestStatus, StoreError>> + '_> {
        let inner = self.lock();
        let statuses: Vec<_> = inner
            .statuses
            .iter()
            .map(|(test, stored)| match stored {
                StoredStatus::Valid(status) => Ok(status.clone()),
                StoredStatus::Corrupt => Err(StoreError::Malformed {
                    reason: format!("undecodable status aggregate for `{test}`"),
                }),
            })
            .collect();
        Box::new(statuses.into_iter())
    }

    fn runs_since(
        &self,
        test: &TestKey,
        since_exclusive: i64,
        filter: RunFilter,
    ) -> Box<dyn Iterator<Item = Result<RunRecord, StoreError>> + '_> {
        let inner = self.lock();
        let mut matching: Vec<_> = inner
            .runs
            .get(test)
            .into_iter()
            .flatten()
            .filter(|run| run.start_micros() > since_exclusive && filter.matches(run.kind()))
            .cloned()
            .collect();
        matching.sort_by_key(|run| std::cmp::Reverse(run.start_micros()));
        Box::new(matching.into_iter().map(|run| match run {
            StoredRun::Valid(run) => Ok(run),
            StoredRun::Malformed { start_micros, .. } => Err(StoreError::Malformed {
                reason: format!("undecodable run record at {start_micros}"),
            }),
        }))
    }

    fn case_executions(
        &self,
        keys: &[CaseExecutionKey],
    ) -> Result<HashMap<CaseExecutionKey, CaseExecution>, StoreError> {
        let inner = self.lock();
        Ok(keys
            .iter()
            .filter_map(|key| inner.executions.get(key).map(|exec| (*key, exec.clone())))
            .collect())
    }

    fn devices_for_run(&self, run: RunKey) -> Result<Vec<DeviceRecord>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .devices
            .iter()
            .filter(|device| device.run_key == run)
            .cloned()
            .collect())
    }

    fn begin(&self, test: &TestKey) -> Result<Self::Txn<'_>, StoreError> {
        Ok(MemoryTransaction {
            store: self,
            test: test.clone(),
            staged: None,
            finished: false,
        })
    }
}

/// Transaction guard over one test's aggregate in a [`MemoryStore`].
///
/// Writes are staged locally and applied only on a successful commit;
/// dropping the guard discards them.
#[derive(Debug)]
pub struct MemoryTransaction<'store> {
    store: &'store MemoryStore,
    test: TestKey,
    staged: Option<TestStatus>,
    finished: bool,
}

impl StatusTransaction for MemoryTransaction<'_> {
    fn get(&mut self) -> Result<Option<TestStatus>, StoreError> {
        let inner = self.store.lock();
        match inner.statuses.get(&self.test) {
            Some(StoredStatus::Valid(status)) => Ok(Some(status.clone())),
            Some(StoredStatus::Corrupt) => Err(StoreError::Malformed {
                reason: format!("undecodable status aggregate for `{}`", self.test),
            }),
            None => Ok(None),
        }
    }

    fn put(&mut self, status: &TestStatus) -> Result<(), StoreError> {
        self.staged = Some(status.clone());
        Ok(())
    }

    fn commit(mut self) -> Result<(), StoreError> {
        self.finished = true;
        let staged = self.staged.take();
        let mut inner = self.store.lock();
        if let Some(fault) = inner.commit_faults.pop_front() {
            return Err(fault);
        }
        if let Some(status) = staged {
            inner
                .statuses
                .insert(self.test.clone(), StoredStatus::Valid(status));
        }
        Ok(())
    }

    fn rollback(mut self) {
        self.finished = true;
        self.staged = None;
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(test = %self.test, "memory transaction dropped without commit; rolling back");
        }
    }
}
