// Copyright (c) The suitewatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the suitewatch engine.

use config::ConfigError;
use suitewatch_metadata::TestKey;
use thiserror::Error;

/// An error returned by a [`DashboardStore`](crate::store::DashboardStore)
/// operation.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A conflicting concurrent write was detected inside a transaction.
    #[error("conflicting concurrent write detected")]
    Conflict,

    /// The store did not respond in time.
    #[error("store operation timed out")]
    Timeout,

    /// A stored record could not be decoded.
    #[error("malformed record: {reason}")]
    Malformed {
        /// Human-readable description of what failed to decode.
        reason: String,
    },

    /// Any other backend failure.
    #[error("store backend failure: {reason}")]
    Backend {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl StoreError {
    /// Returns true if the operation may succeed on retry.
    ///
    /// Conflicts and timeouts are retryable; malformed records and backend
    /// failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict | StoreError::Timeout)
    }
}

/// An error that occurred while committing a new status aggregate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StatusCommitError {
    /// Every attempt hit a retryable store failure.
    #[error("status commit for `{test}` abandoned after {attempts} attempts")]
    RetriesExhausted {
        /// The test whose commit was abandoned.
        test: TestKey,
        /// How many attempts were made.
        attempts: usize,
        /// The failure observed on the final attempt.
        #[source]
        source: StoreError,
    },

    /// A non-retryable store failure occurred.
    #[error("status commit for `{test}` failed")]
    Store {
        /// The test whose commit failed.
        test: TestKey,
        /// The underlying store failure.
        #[source]
        source: StoreError,
    },
}

/// An error returned while composing a notification message.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ComposeError {
    /// A recipient address could not be encoded.
    #[error("invalid recipient address `{address}`")]
    InvalidRecipient {
        /// The offending address.
        address: String,
    },

    /// The message had no recipients.
    #[error("no recipients provided")]
    NoRecipients,
}

/// An error that occurred while evaluating a single test.
///
/// Failures are contained at this granularity: one test's error never
/// aborts the cycle for other tests.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EvaluateError {
    /// A store read failed outside of the commit protocol.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The status commit failed.
    #[error(transparent)]
    Commit(#[from] StatusCommitError),
}

/// An error that occurred while parsing the suitewatch config.
#[derive(Debug, Error)]
#[error("failed to parse suitewatch config")]
pub struct ConfigParseError {
    #[source]
    err: ConfigError,
}

impl ConfigParseError {
    pub(crate) fn new(err: ConfigError) -> Self {
        Self { err }
    }
}
