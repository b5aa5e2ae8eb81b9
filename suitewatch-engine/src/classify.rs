// Copyright (c) The suitewatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The failure classification engine.
//!
//! Walks a suite's run history backward in time, newest first, and
//! reconciles per-case results against the previously recorded failing set
//! into five disjoint classifications: new failures, continued failures,
//! fixed cases, transient failures, and cases skipped since failing.
//!
//! The backward walk lets the newest run act as ground truth for "is this
//! case failing right now", while older runs serve two purposes: they
//! back-fill SKIP results with the most recent concrete observation, and
//! they expose transient failures (cases that failed somewhere in the
//! unexamined window but pass in the newest run).

use crate::{
    errors::StoreError,
    store::{DashboardStore, RunFilter},
};
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use smol_str::SmolStr;
use suitewatch_metadata::{CaseResult, FailingCaseRef, RunKey, TestStatus};
use tracing::warn;

/// The outcome of classifying a suite's run history.
///
/// The five case-name sets are disjoint; together with the passing count
/// they partition the case names reported by the most recent run. Ephemeral:
/// this is folded into a new [`TestStatus`] and into composed notifications,
/// never persisted directly.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Classification {
    /// Cases failing now that were not in the previously failing set.
    pub new_failures: IndexSet<SmolStr>,
    /// Cases failing now that were already failing.
    pub continued_failures: IndexSet<SmolStr>,
    /// Previously failing cases that pass in the most recent run.
    pub fixed: IndexSet<SmolStr>,
    /// Cases that failed in some older run but pass in the most recent one.
    pub transient_failures: IndexSet<SmolStr>,
    /// Reserved: previously failing cases whose SKIP has gone stale. No
    /// population rule is currently defined, but the data path is kept so
    /// notifications render the set if one is ever assigned.
    pub skipped_since_failing: IndexSet<SmolStr>,
    /// Number of cases passing (or skipped with no prior failure) in the
    /// most recent run.
    pub passing_count: u32,
    /// References to the last known failing result of each failing case,
    /// for the replacement aggregate.
    pub failing_refs: Vec<FailingCaseRef>,
    /// The most recent run examined.
    pub most_recent_run: RunKey,
    /// Start time of the most recent run, in microseconds since the epoch.
    /// Becomes the replacement aggregate's `last_run_micros`.
    pub most_recent_start_micros: i64,
    /// Deduplicated build identifiers of the devices participating in the
    /// most recent run, in first-seen order.
    pub build_ids: Vec<String>,
}

impl Classification {
    /// The build identifiers joined for display.
    pub fn joined_build_ids(&self) -> String {
        self.build_ids.iter().join(",")
    }

    /// Folds this classification into a replacement status aggregate.
    pub fn to_status(&self, status: &TestStatus) -> TestStatus {
        TestStatus {
            test: status.test.clone(),
            last_run_micros: self.most_recent_start_micros,
            passing_count: self.passing_count,
            failing_refs: self.failing_refs.clone(),
        }
    }
}

/// Resolves a status aggregate's failing-case references back into a
/// `case name -> reference` map.
///
/// Each reference is a `(batch, offset)` pair; resolution is a batch get
/// plus a bounds-checked index. References whose target batch has vanished,
/// or whose offset is out of bounds, are dropped.
pub fn resolve_current_failures<S: DashboardStore>(
    store: &S,
    status: &TestStatus,
) -> Result<IndexMap<SmolStr, FailingCaseRef>, StoreError> {
    let mut resolved = IndexMap::new();
    if status.failing_refs.is_empty() {
        return Ok(resolved);
    }

    let keys: Vec<_> = status
        .failing_refs
        .iter()
        .map(|failing_ref| failing_ref.execution)
        .unique()
        .collect();
    let batches = store.case_executions(&keys)?;

    for failing_ref in &status.failing_refs {
        let Some(batch) = batches.get(&failing_ref.execution) else {
            warn!(
                test = %status.test,
                execution = failing_ref.execution.0,
                "failing-case reference target vanished; dropping"
            );
            continue;
        };
        let Some(entry) = batch.entries.get(failing_ref.offset as usize) else {
            warn!(
                test = %status.test,
                execution = failing_ref.execution.0,
                offset = failing_ref.offset,
                "failing-case reference offset out of bounds; dropping"
            );
            continue;
        };
        resolved.insert(entry.name.clone(), *failing_ref);
    }
    Ok(resolved)
}

/// Classifies all runs of a suite newer than its aggregate's
/// `last_run_micros`.
///
/// Returns `Ok(None)` if no newer run exists; the caller must then check
/// inactivity independently and must not mutate the aggregate. Malformed
/// runs, missing case-execution batches, and unrecognized result codes are
/// logged and skipped without aborting the walk.
pub fn classify<S: DashboardStore>(
    store: &S,
    status: &TestStatus,
    prior_failing: &IndexMap<SmolStr, FailingCaseRef>,
    filter: RunFilter,
) -> Result<Option<Classification>, StoreError> {
    let mut most_recent: Option<(RunKey, i64)> = None;
    let mut most_recent_results: IndexMap<SmolStr, CaseResult> = IndexMap::new();
    let mut transient_failures: IndexSet<SmolStr> = IndexSet::new();
    // Last known failing detail per case, used to seed references for new
    // failures. Insert-overwrite while walking backward, so the oldest
    // fail-like observation wins.
    let mut breakage: IndexMap<SmolStr, FailingCaseRef> = IndexMap::new();

    for run in store.runs_since(&status.test, status.last_run_micros, filter) {
        let run = match run {
            Ok(run) => run,
            Err(StoreError::Malformed { reason }) => {
                warn!(test = %status.test, reason, "malformed run record; skipping");
                continue;
            }
            Err(err) => return Err(err),
        };

        let is_most_recent = most_recent.is_none();
        if is_most_recent {
            most_recent = Some((run.run_key, run.start_micros));
        }

        let batches = store.case_executions(&run.case_execution_keys)?;
        for key in &run.case_execution_keys {
            let Some(batch) = batches.get(key) else {
                warn!(
                    test = %status.test,
                    execution = key.0,
                    "case execution batch missing; skipping"
                );
                continue;
            };
            for (offset, entry) in batch.entries.iter().enumerate() {
                let result = match CaseResult::from_wire(entry.result_code) {
                    Ok(result) => result,
                    Err(err) => {
                        warn!(test = %status.test, case = %entry.name, %err, "skipping case");
                        continue;
                    }
                };

                if is_most_recent {
                    most_recent_results.insert(entry.name.clone(), result);
                } else {
                    match most_recent_results.get(&entry.name).copied() {
                        // Cases absent from newer runs are deprecated from
                        // tracking, not classified.
                        None => {}
                        // An older, concrete observation supersedes an
                        // unresolved SKIP.
                        Some(CaseResult::Skip) => {
                            most_recent_results.insert(entry.name.clone(), result);
                        }
                        // Passing now, but failed at some point in the
                        // window: transient.
                        Some(CaseResult::Pass) if result.is_fail_like() => {
                            transient_failures.insert(entry.name.clone());
                        }
                        Some(_) => {}
                    }
                }

                if result.is_fail_like() {
                    breakage.insert(
                        entry.name.clone(),
                        FailingCaseRef {
                            execution: *key,
                            offset: offset as u32,
                        },
                    );
                }
            }
        }
    }

    let Some((most_recent_run, most_recent_start_micros)) = most_recent else {
        return Ok(None);
    };

    let mut passing_count = 0u32;
    let mut failing_refs = Vec::new();
    let mut new_failures = IndexSet::new();
    let mut continued_failures = IndexSet::new();
    let mut fixed = IndexSet::new();

    for (name, result) in &most_recent_results {
        let prior = prior_failing.get(name);
        match result {
            // A skip persists the prior state: the failure reference is
            // carried forward unchanged, or the case counts as passing.
            CaseResult::Skip => match prior {
                Some(prior_ref) => failing_refs.push(*prior_ref),
                None => passing_count += 1,
            },
            CaseResult::Pass => {
                passing_count += 1;
                if prior.is_some() && !transient_failures.contains(name) {
                    fixed.insert(name.clone());
                }
            }
            _ => match prior {
                Some(prior_ref) => {
                    continued_failures.insert(name.clone());
                    failing_refs.push(*prior_ref);
                }
                None => {
                    new_failures.insert(name.clone());
                    match breakage.get(name) {
                        Some(breakage_ref) => failing_refs.push(*breakage_ref),
                        // Unreachable in practice: a fail-like result in the
                        // most recent run is always recorded in the breakage
                        // map as it is observed.
                        None => warn!(
                            test = %status.test,
                            case = %name,
                            "no failure detail recorded for new failure"
                        ),
                    }
                }
            },
        }
    }

    let mut build_ids: IndexSet<String> = IndexSet::new();
    for device in store.devices_for_run(most_recent_run)? {
        build_ids.insert(device.build_id);
    }

    Ok(Some(Classification {
        new_failures,
        continued_failures,
        fixed,
        transient_failures,
        skipped_since_failing: IndexSet::new(),
        passing_count,
        failing_refs,
        most_recent_run,
        most_recent_start_micros,
        build_ids: build_ids.into_iter().collect(),
    }))
}
