// Copyright (c) The suitewatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Data model shared between the suitewatch engine and store adapters.
//!
//! These types describe what the dashboard store holds: monitored test
//! suites, their execution runs, per-case results, participating devices,
//! and the persisted per-suite status aggregate. The engine crate consumes
//! them; store adapters produce them.

mod errors;

pub use errors::ResultCodeParseError;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// The unique name of a monitored test suite, used as its storage key.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestKey(pub SmolStr);

impl TestKey {
    /// Creates a new `TestKey` from a string.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }

    /// Returns the test name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store identifier for an [`ExecutionRun`].
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunKey(pub u64);

/// Store identifier for a [`CaseExecution`] batch.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseExecutionKey(pub u64);

/// The outcome of a single test case within a run.
///
/// Discriminants match the wire codes used by the upstream ingestion
/// pipeline; use [`CaseResult::from_wire`] to decode stored values.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseResult {
    /// The result was not reported or could not be determined.
    Unknown = 0,
    /// The case passed.
    Pass = 1,
    /// The case failed an assertion.
    Fail = 2,
    /// The case was skipped.
    Skip = 3,
    /// The case aborted with an unexpected error.
    Exception = 4,
    /// The case timed out.
    Timeout = 5,
}

impl CaseResult {
    /// Decodes a raw wire code into a `CaseResult`.
    pub fn from_wire(code: u32) -> Result<Self, ResultCodeParseError> {
        match code {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Pass),
            2 => Ok(Self::Fail),
            3 => Ok(Self::Skip),
            4 => Ok(Self::Exception),
            5 => Ok(Self::Timeout),
            other => Err(ResultCodeParseError::new(other)),
        }
    }

    /// Returns true for any outcome that is neither a pass nor a skip.
    ///
    /// An [`Unknown`](Self::Unknown) result counts as fail-like: the case
    /// ran but did not report a pass.
    pub fn is_fail_like(self) -> bool {
        !matches!(self, Self::Pass | Self::Skip)
    }
}

/// The kind of an execution run, as recorded by the ingestion pipeline.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunKind {
    /// A final, official run. Only these count toward suite status by
    /// default.
    Official,
    /// A presubmit run for a pending change.
    Presubmit,
    /// An experimental or partial run.
    Experimental,
}

/// One timestamped execution of a test suite.
///
/// Immutable once written by the ingestion pipeline.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Store identifier for this run.
    pub run_key: RunKey,
    /// The suite this run belongs to.
    pub test: TestKey,
    /// Start time in microseconds since the Unix epoch. Runs are ordered by
    /// this value.
    pub start_micros: i64,
    /// The kind of run.
    pub kind: RunKind,
    /// Case-execution batches contained in this run, in ingestion order.
    pub case_execution_keys: Vec<CaseExecutionKey>,
}

/// A single `(name, result)` pair within a [`CaseExecution`].
///
/// The result is kept as its raw wire code so that consumers can decide how
/// to handle unrecognized codes (the engine logs and skips them).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CaseEntry {
    /// The case name.
    pub name: SmolStr,
    /// Raw wire code for the case's result; decode with
    /// [`CaseResult::from_wire`].
    pub result_code: u32,
}

impl CaseEntry {
    /// Creates a new entry from a name and decoded result.
    pub fn new(name: impl Into<SmolStr>, result: CaseResult) -> Self {
        Self {
            name: name.into(),
            result_code: result as u32,
        }
    }
}

/// An ordered batch of per-case results belonging to one run.
///
/// Immutable once written.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CaseExecution {
    /// Store identifier for this batch.
    pub key: CaseExecutionKey,
    /// The `(name, result)` pairs, in reported order. [`FailingCaseRef`]
    /// offsets index into this sequence.
    pub entries: Vec<CaseEntry>,
}

/// A device that participated in an execution run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// The run this device participated in.
    pub run_key: RunKey,
    /// The device's build identifier. Multiple devices may share one.
    pub build_id: String,
}

/// A reference to a failing case's last known result.
///
/// Rather than duplicating result detail into the aggregate, the aggregate
/// stores `(batch, offset)` pairs; resolution is a batch get plus a
/// bounds-checked index. References whose target batch has vanished are
/// silently dropped at resolution time.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FailingCaseRef {
    /// The case-execution batch holding the result.
    pub execution: CaseExecutionKey,
    /// Index of the case within the batch's entry sequence.
    pub offset: u32,
}

/// The persisted status aggregate for one monitored test suite.
///
/// Mutated only by a successful optimistic-concurrency commit; read at the
/// start of every evaluation cycle. The failing count is structural:
/// it is always `failing_refs.len()`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TestStatus {
    /// The suite this status describes.
    pub test: TestKey,
    /// Start time of the newest run folded into this aggregate, in
    /// microseconds since the Unix epoch. Doubles as the aggregate's
    /// optimistic-concurrency version.
    pub last_run_micros: i64,
    /// Number of cases passing (or skipped with no prior failure) in the
    /// newest evaluated run.
    pub passing_count: u32,
    /// References to the last known failing result of each failing case.
    pub failing_refs: Vec<FailingCaseRef>,
}

impl TestStatus {
    /// Creates an empty status for a newly tracked suite.
    pub fn new(test: TestKey) -> Self {
        Self {
            test,
            last_run_micros: 0,
            passing_count: 0,
            failing_refs: Vec::new(),
        }
    }

    /// The number of failing cases tracked by this aggregate.
    pub fn failing_count(&self) -> usize {
        self.failing_refs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, CaseResult::Unknown; "unknown")]
    #[test_case(1, CaseResult::Pass; "pass")]
    #[test_case(2, CaseResult::Fail; "fail")]
    #[test_case(3, CaseResult::Skip; "skip")]
    #[test_case(4, CaseResult::Exception; "exception")]
    #[test_case(5, CaseResult::Timeout; "timeout")]
    fn case_result_from_wire(code: u32, expected: CaseResult) {
        assert_eq!(CaseResult::from_wire(code).unwrap(), expected);
    }

    #[test]
    fn case_result_from_wire_unrecognized() {
        let err = CaseResult::from_wire(17).expect_err("code 17 is not assigned");
        assert_eq!(err.code(), 17);
    }

    #[test]
    fn fail_like_partition() {
        for code in 0..=5 {
            let result = CaseResult::from_wire(code).unwrap();
            let expected = !matches!(result, CaseResult::Pass | CaseResult::Skip);
            assert_eq!(result.is_fail_like(), expected, "code {code}");
        }
    }

    #[test]
    fn status_round_trip() {
        let status = TestStatus {
            test: TestKey::new("VtsHalCameraProviderV2_4Target"),
            last_run_micros: 1_500_000_000_000_000,
            passing_count: 12,
            failing_refs: vec![FailingCaseRef {
                execution: CaseExecutionKey(42),
                offset: 3,
            }],
        };
        let json = serde_json::to_string(&status).unwrap();
        let back: TestStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
        assert_eq!(back.failing_count(), 1);
    }
}
