// Copyright (c) The suitewatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-test evaluation cycle.
//!
//! Invoked periodically by an external scheduler. For each tracked suite:
//! resolve the previously failing set, classify the run history, compose at
//! most one alert, commit the replacement aggregate, and release the alert
//! only if the commit won. Failures are contained per test; one suite's
//! error never aborts the cycle for the rest.

use crate::{
    classify::{classify, resolve_current_failures},
    config::AlertConfig,
    errors::EvaluateError,
    notify::{
        compose_inactivity_alert, compose_status_alert, NotificationTransport,
        SubscriberDirectory,
    },
    store::DashboardStore,
    update::{commit_status, CommitOutcome},
};
use suitewatch_metadata::TestStatus;
use tracing::{debug, error, warn};

/// How one test's evaluation concluded.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TestOutcome {
    /// No runs newer than the aggregate. The aggregate is untouched; an
    /// inactivity notice may have been sent.
    Idle {
        /// Whether an inactivity notice was dispatched.
        inactivity_notified: bool,
    },
    /// A replacement aggregate was committed.
    Committed {
        /// Whether a status alert was dispatched.
        alerted: bool,
    },
    /// Another evaluator advanced the aggregate first; nothing was sent.
    Superseded,
    /// The test was deleted mid-evaluation; nothing was sent.
    Vanished,
}

/// Tallies for one full evaluation cycle.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CycleSummary {
    /// Tests whose aggregates were read and evaluated.
    pub evaluated: usize,
    /// Tests whose replacement aggregate was committed.
    pub committed: usize,
    /// Status alerts dispatched.
    pub alerted: usize,
    /// Inactivity notices dispatched.
    pub inactivity_notices: usize,
    /// Tests superseded by a concurrent evaluator.
    pub superseded: usize,
    /// Tests that vanished mid-evaluation.
    pub vanished: usize,
    /// Tests skipped because their stored aggregate was malformed.
    pub malformed: usize,
    /// Tests whose evaluation failed.
    pub failed: usize,
}

/// The scheduled alert job: evaluates every tracked suite once.
#[derive(Debug)]
pub struct AlertJob<'a, S, D, T> {
    store: &'a S,
    directory: &'a D,
    transport: &'a T,
    config: &'a AlertConfig,
}

impl<'a, S, D, T> AlertJob<'a, S, D, T>
where
    S: DashboardStore,
    D: SubscriberDirectory,
    T: NotificationTransport,
{
    /// Creates a new job over the given collaborators.
    pub fn new(store: &'a S, directory: &'a D, transport: &'a T, config: &'a AlertConfig) -> Self {
        Self {
            store,
            directory,
            transport,
            config,
        }
    }

    /// Evaluates every tracked suite, containing failures per test.
    pub fn run_cycle(&self, now_micros: i64) -> CycleSummary {
        let mut summary = CycleSummary::default();
        for status in self.store.all_tests() {
            let status = match status {
                Ok(status) => status,
                Err(err) => {
                    warn!(%err, "corrupted status aggregate; skipping test");
                    summary.malformed += 1;
                    continue;
                }
            };
            summary.evaluated += 1;
            match self.evaluate_test(&status, now_micros) {
                Ok(TestOutcome::Idle {
                    inactivity_notified,
                }) => {
                    if inactivity_notified {
                        summary.inactivity_notices += 1;
                    }
                }
                Ok(TestOutcome::Committed { alerted }) => {
                    summary.committed += 1;
                    if alerted {
                        summary.alerted += 1;
                    }
                }
                Ok(TestOutcome::Superseded) => summary.superseded += 1,
                Ok(TestOutcome::Vanished) => summary.vanished += 1,
                Err(err) => {
                    error!(test = %status.test, %err, "test evaluation failed");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// Evaluates a single suite against its run history.
    pub fn evaluate_test(
        &self,
        status: &TestStatus,
        now_micros: i64,
    ) -> Result<TestOutcome, EvaluateError> {
        let recipients: Vec<String> = self
            .directory
            .subscriber_emails(&status.test)
            .into_iter()
            .filter(|address| self.config.recipient_allowed(address))
            .collect();
        let link = self.config.status_link(&status.test);

        let prior_failing = resolve_current_failures(self.store, status)?;
        let Some(classification) =
            classify(self.store, status, &prior_failing, self.config.run_filter)?
        else {
            // No newer runs: the aggregate must not be mutated. Inactivity
            // notices have no aggregate change to gate on, so they are sent
            // immediately.
            let mut notified = false;
            if !recipients.is_empty() {
                if let Some(message) =
                    compose_inactivity_alert(status, now_micros, &link, &recipients)
                {
                    self.transport.send_all(vec![message]);
                    notified = true;
                }
            }
            return Ok(TestOutcome::Idle {
                inactivity_notified: notified,
            });
        };

        debug!(
            test = %status.test,
            new = classification.new_failures.len(),
            continued = classification.continued_failures.len(),
            fixed = classification.fixed.len(),
            transient = classification.transient_failures.len(),
            passing = classification.passing_count,
            "classified run history"
        );

        let message = if recipients.is_empty() {
            None
        } else {
            compose_status_alert(&status.test, &classification, &link, &recipients)
        };

        let candidate = classification.to_status(status);
        match commit_status(self.store, &candidate, self.config.max_commit_attempts)? {
            CommitOutcome::Committed => {
                // Only a winning commit releases the composed alert.
                let alerted = message.is_some();
                if let Some(message) = message {
                    self.transport.send_all(vec![message]);
                }
                Ok(TestOutcome::Committed { alerted })
            }
            CommitOutcome::Superseded => Ok(TestOutcome::Superseded),
            CommitOutcome::Vanished => Ok(TestOutcome::Vanished),
        }
    }
}
