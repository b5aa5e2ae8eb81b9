// Copyright (c) The suitewatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Optimistic-concurrency commit of the status aggregate.
//!
//! The aggregate's `last_run_micros` doubles as its version: a candidate
//! replaces the stored aggregate only if the stored version is still older.
//! Competing evaluators racing on the same boundary therefore resolve to
//! exactly one successful advance; the losers observe
//! [`CommitOutcome::Superseded`] and must not send their notifications.

use crate::{
    errors::{StatusCommitError, StoreError},
    store::{DashboardStore, StatusTransaction},
};
use suitewatch_metadata::TestStatus;
use tracing::{error, info, warn};

/// How a commit attempt concluded.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommitOutcome {
    /// The candidate was written. Composed notifications may be released.
    Committed,
    /// Another evaluator already advanced the aggregate past the candidate.
    /// Not an error; nothing may be sent.
    Superseded,
    /// The test was deleted concurrently. Benign no-op.
    Vanished,
}

/// Commits `candidate` with bounded retry on transient store failures.
///
/// Each attempt opens a fresh transaction, re-reads the stored aggregate,
/// and writes only if the stored `last_run_micros` is still older than the
/// candidate's. Retryable failures (conflict, timeout) are retried up to
/// `max_attempts` total attempts; exhaustion surfaces as
/// [`StatusCommitError::RetriesExhausted`], fatal for this test only.
pub fn commit_status<S: DashboardStore>(
    store: &S,
    candidate: &TestStatus,
    max_attempts: usize,
) -> Result<CommitOutcome, StatusCommitError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match try_commit(store, candidate) {
            Ok(outcome) => return Ok(outcome),
            Err(err) if err.is_retryable() && attempts < max_attempts => {
                warn!(
                    test = %candidate.test,
                    attempt = attempts,
                    %err,
                    "retrying status commit"
                );
            }
            Err(err) if err.is_retryable() => {
                error!(
                    test = %candidate.test,
                    attempts,
                    "exceeded status commit retries"
                );
                return Err(StatusCommitError::RetriesExhausted {
                    test: candidate.test.clone(),
                    attempts,
                    source: err,
                });
            }
            Err(err) => {
                return Err(StatusCommitError::Store {
                    test: candidate.test.clone(),
                    source: err,
                });
            }
        }
    }
}

/// One transaction-scoped attempt. Every non-commit path rolls back.
fn try_commit<S: DashboardStore>(
    store: &S,
    candidate: &TestStatus,
) -> Result<CommitOutcome, StoreError> {
    let mut txn = store.begin(&candidate.test)?;
    let current = match txn.get() {
        Ok(current) => current,
        Err(err) => {
            txn.rollback();
            return Err(err);
        }
    };

    match current {
        None => {
            txn.rollback();
            info!(test = %candidate.test, "test disappeared during update");
            Ok(CommitOutcome::Vanished)
        }
        Some(stored) if stored.last_run_micros >= candidate.last_run_micros => {
            // Another evaluator already advanced the aggregate.
            txn.rollback();
            Ok(CommitOutcome::Superseded)
        }
        Some(_) => {
            if let Err(err) = txn.put(candidate) {
                txn.rollback();
                return Err(err);
            }
            txn.commit()?;
            Ok(CommitOutcome::Committed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;
    use suitewatch_metadata::TestKey;

    fn status(micros: i64) -> TestStatus {
        TestStatus {
            test: TestKey::new("suite"),
            last_run_micros: micros,
            passing_count: 3,
            failing_refs: Vec::new(),
        }
    }

    #[test]
    fn commits_newer_candidate() {
        let store = MemoryStore::new();
        store.insert_status(status(100));

        let outcome = commit_status(&store, &status(200), 3).unwrap();
        assert_eq!(outcome, CommitOutcome::Committed);
        assert_eq!(store.status(&TestKey::new("suite")).unwrap(), status(200));
    }

    #[test]
    fn stale_candidate_is_superseded_without_error() {
        let store = MemoryStore::new();
        store.insert_status(status(300));

        let outcome = commit_status(&store, &status(200), 3).unwrap();
        assert_eq!(outcome, CommitOutcome::Superseded);
        assert_eq!(store.status(&TestKey::new("suite")).unwrap(), status(300));

        // Equal versions are also stale: at most one advance per boundary.
        let outcome = commit_status(&store, &status(300), 3).unwrap();
        assert_eq!(outcome, CommitOutcome::Superseded);
    }

    #[test]
    fn vanished_test_is_a_benign_noop() {
        let store = MemoryStore::new();
        let outcome = commit_status(&store, &status(200), 3).unwrap();
        assert_eq!(outcome, CommitOutcome::Vanished);
        assert_eq!(store.status(&TestKey::new("suite")), None);
    }

    #[test]
    fn retries_through_transient_conflicts() {
        let store = MemoryStore::new();
        store.insert_status(status(100));
        store.inject_commit_fault(StoreError::Conflict);
        store.inject_commit_fault(StoreError::Timeout);

        let outcome = commit_status(&store, &status(200), 3).unwrap();
        assert_eq!(outcome, CommitOutcome::Committed);
        assert_eq!(store.status(&TestKey::new("suite")).unwrap(), status(200));
    }

    #[test]
    fn retry_exhaustion_surfaces_the_last_failure() {
        let store = MemoryStore::new();
        store.insert_status(status(100));
        for _ in 0..3 {
            store.inject_commit_fault(StoreError::Conflict);
        }

        let err = commit_status(&store, &status(200), 3).expect_err("all attempts conflict");
        match err {
            StatusCommitError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        // The store was never advanced.
        assert_eq!(store.status(&TestKey::new("suite")).unwrap(), status(100));
    }

    #[test]
    fn non_retryable_failure_is_not_retried() {
        let store = MemoryStore::new();
        store.insert_status(status(100));
        store.inject_commit_fault(StoreError::Backend {
            reason: "disk on fire".to_owned(),
        });

        let err = commit_status(&store, &status(200), 3).expect_err("backend failure");
        assert!(matches!(err, StatusCommitError::Store { .. }));
        assert_eq!(store.status(&TestKey::new("suite")).unwrap(), status(100));
    }

    /// Two candidates racing on the same boundary: only the larger
    /// timestamp may ever be committed.
    #[test]
    fn race_resolves_to_single_advance() {
        let store = MemoryStore::new();
        store.insert_status(status(100));

        assert_eq!(
            commit_status(&store, &status(300), 3).unwrap(),
            CommitOutcome::Committed
        );
        assert_eq!(
            commit_status(&store, &status(200), 3).unwrap(),
            CommitOutcome::Superseded
        );
        assert_eq!(store.status(&TestKey::new("suite")).unwrap(), status(300));
    }
}
