// Copyright (c) The suitewatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seams over the external dashboard store.
//!
//! The engine never talks to a concrete datastore directly. It consumes
//! these traits: run-history queries, batch case-execution gets, device
//! queries, and a small transactional surface over the per-test status
//! aggregate. Adapters for real backends implement them; tests use
//! [`MemoryStore`].

mod memory;

pub use memory::MemoryStore;

use crate::errors::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use suitewatch_metadata::{
    CaseExecution, CaseExecutionKey, DeviceRecord, RunKey, RunKind, RunRecord, TestKey, TestStatus,
};

/// Which run kinds count toward suite status.
///
/// Intermediate and partial run kinds are excluded by default: only final,
/// official runs should advance a suite's aggregate.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunFilter {
    /// Official runs only (the default).
    #[default]
    OfficialOnly,
    /// Official and presubmit runs.
    IncludePresubmit,
    /// All run kinds.
    All,
}

impl RunFilter {
    /// Returns true if a run of the given kind passes this filter.
    pub fn matches(self, kind: RunKind) -> bool {
        match self {
            RunFilter::OfficialOnly => kind == RunKind::Official,
            RunFilter::IncludePresubmit => {
                matches!(kind, RunKind::Official | RunKind::Presubmit)
            }
            RunFilter::All => true,
        }
    }
}

/// Read and transactional access to the dashboard store.
///
/// Run, case-execution, and device records are read-only from the engine's
/// perspective; the per-test [`TestStatus`] aggregate is the only mutable
/// record, and it may only be written through [`DashboardStore::begin`].
pub trait DashboardStore {
    /// The transaction guard type returned by [`begin`](Self::begin).
    type Txn<'a>: StatusTransaction
    where
        Self: 'a;

    /// Streams the status aggregates of every tracked test.
    ///
    /// Individual items may be `Err` if a stored aggregate is malformed;
    /// callers log and skip those.
    fn all_tests(&self) -> Box<dyn Iterator<Item = Result<TestStatus, StoreError>> + '_>;

    /// Streams runs of `test` with `start_micros > since_exclusive` whose
    /// kind passes `filter`, in strictly descending `start_micros` order.
    ///
    /// The descending order is load-bearing: the engine treats the first
    /// yielded run as ground truth for current results.
    fn runs_since(
        &self,
        test: &TestKey,
        since_exclusive: i64,
        filter: RunFilter,
    ) -> Box<dyn Iterator<Item = Result<RunRecord, StoreError>> + '_>;

    /// Batch-fetches case-execution batches. Keys with no stored record are
    /// simply absent from the returned map.
    fn case_executions(
        &self,
        keys: &[CaseExecutionKey],
    ) -> Result<HashMap<CaseExecutionKey, CaseExecution>, StoreError>;

    /// Returns the devices that participated in a run.
    fn devices_for_run(&self, run: RunKey) -> Result<Vec<DeviceRecord>, StoreError>;

    /// Begins a transaction scoped to one test's status aggregate.
    fn begin(&self, test: &TestKey) -> Result<Self::Txn<'_>, StoreError>;
}

/// A transaction over one test's status aggregate.
///
/// Dropping a transaction without committing rolls it back, so no exit path
/// can leave a transaction dangling.
pub trait StatusTransaction {
    /// Re-reads the current aggregate inside the transaction. Returns `None`
    /// if the test has been deleted concurrently.
    fn get(&mut self) -> Result<Option<TestStatus>, StoreError>;

    /// Stages a replacement aggregate. Takes effect only on commit.
    fn put(&mut self, status: &TestStatus) -> Result<(), StoreError>;

    /// Commits the staged write. Conflicting concurrent writers surface as
    /// [`StoreError::Conflict`].
    fn commit(self) -> Result<(), StoreError>;

    /// Rolls the transaction back, discarding any staged write.
    fn rollback(self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(RunFilter::OfficialOnly, RunKind::Official, true)]
    #[test_case(RunFilter::OfficialOnly, RunKind::Presubmit, false)]
    #[test_case(RunFilter::OfficialOnly, RunKind::Experimental, false)]
    #[test_case(RunFilter::IncludePresubmit, RunKind::Presubmit, true)]
    #[test_case(RunFilter::IncludePresubmit, RunKind::Experimental, false)]
    #[test_case(RunFilter::All, RunKind::Experimental, true)]
    fn run_filter_matches(filter: RunFilter, kind: RunKind, expected: bool) {
        assert_eq!(filter.matches(kind), expected);
    }
}
