// Copyright (c) The suitewatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification composition and inactivity detection.
//!
//! At most one status notification is produced per evaluation: the ordered
//! [`ALERT_PRIORITY`] list is scanned and the first matching alert kind
//! wins. Inactivity notices are separate; they apply only when a suite has
//! no newer runs at all.

use crate::{classify::Classification, errors::ComposeError};
use chrono::DateTime;
use itertools::Itertools;
use smol_str::SmolStr;
use suitewatch_metadata::{TestKey, TestStatus};
use swrite::{SWrite, swrite};
use tracing::warn;

const MINUTE_MICROS: i64 = 60 * 1_000_000;
const DAY_MICROS: i64 = 24 * 60 * MINUTE_MICROS;

/// Inactivity notices start after one full day without uploads.
const INACTIVITY_MIN_MICROS: i64 = DAY_MICROS;
/// After 8 days the suite is presumed deprecated and notices stop.
const INACTIVITY_MAX_MICROS: i64 = 8 * DAY_MICROS;
/// Width of the once-per-day trigger window.
const INACTIVITY_WINDOW_MICROS: i64 = 3 * MINUTE_MICROS;

/// The kinds of status alert, in no particular order; see
/// [`ALERT_PRIORITY`] for selection order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AlertKind {
    /// At least one case is failing that was not failing before.
    NewFailures,
    /// Previously failing cases are still failing.
    ContinuedFailures,
    /// The latest run is fully passing, but some case failed in an older
    /// run inside the evaluated window.
    TransientFailure,
    /// Previously failing cases are now fixed and nothing is failing.
    AllPassing,
}

/// Alert selection order. The first kind whose predicate matches the
/// classification wins; at most one alert is sent per evaluation.
pub const ALERT_PRIORITY: [AlertKind; 4] = [
    AlertKind::NewFailures,
    AlertKind::ContinuedFailures,
    AlertKind::TransientFailure,
    AlertKind::AllPassing,
];

impl AlertKind {
    fn applies(self, classification: &Classification) -> bool {
        match self {
            AlertKind::NewFailures => !classification.new_failures.is_empty(),
            AlertKind::ContinuedFailures => !classification.continued_failures.is_empty(),
            AlertKind::TransientFailure => !classification.transient_failures.is_empty(),
            AlertKind::AllPassing => !classification.fixed.is_empty(),
        }
    }
}

/// Picks the alert to send for a classification, if any.
pub fn select_alert(classification: &Classification) -> Option<AlertKind> {
    ALERT_PRIORITY
        .into_iter()
        .find(|kind| kind.applies(classification))
}

/// A composed notification, ready for dispatch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    /// Recipient email addresses.
    pub recipients: Vec<String>,
    /// The subject line.
    pub subject: String,
    /// The HTML body.
    pub html_body: String,
}

impl Message {
    /// Composes a message, validating recipient encoding.
    ///
    /// Recipients must be ASCII and shaped like `local@domain` with both
    /// parts non-empty.
    pub fn compose(
        recipients: &[String],
        subject: impl Into<String>,
        html_body: impl Into<String>,
    ) -> Result<Self, ComposeError> {
        if recipients.is_empty() {
            return Err(ComposeError::NoRecipients);
        }
        for address in recipients {
            if !valid_recipient(address) {
                return Err(ComposeError::InvalidRecipient {
                    address: address.clone(),
                });
            }
        }
        Ok(Self {
            recipients: recipients.to_vec(),
            subject: subject.into(),
            html_body: html_body.into(),
        })
    }
}

fn valid_recipient(address: &str) -> bool {
    if !address.is_ascii() || address.contains(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty() && !domain.is_empty() && !domain.contains('@')
}

/// Dispatches composed notifications. Fire and forget: the engine invokes
/// this only after a successful aggregate commit, or directly for
/// inactivity notices.
pub trait NotificationTransport {
    /// Sends all queued messages.
    fn send_all(&self, messages: Vec<Message>);
}

/// Resolves the subscriber list of a monitored suite.
pub trait SubscriberDirectory {
    /// Returns the email addresses subscribed to `test`.
    fn subscriber_emails(&self, test: &TestKey) -> Vec<String>;
}

/// The email footer linking to a suite's status page.
fn footer(link: &str) -> String {
    format!("<br><br>For details, visit the <a href='{link}'>suitewatch dashboard.</a>")
}

fn sorted(set: &indexmap::IndexSet<SmolStr>) -> Vec<&str> {
    set.iter().map(|name| name.as_str()).sorted().collect()
}

/// Builds the case-name summary shared by every status alert body.
///
/// Section order is fixed: bolded new failures, plain continued failures,
/// italicized fixed cases, transient failures, then cases not run since
/// failing. Names are lexicographically sorted within each section.
fn summary_html(classification: &Classification) -> String {
    let mut summary = String::new();
    if !classification.new_failures.is_empty() || !classification.continued_failures.is_empty() {
        summary.push_str("The following test cases failed in the latest test run:<br>");
        for name in sorted(&classification.new_failures) {
            swrite!(summary, "- <b>{name}</b><br>");
        }
        for name in sorted(&classification.continued_failures) {
            swrite!(summary, "- {name}<br>");
        }
    }
    if !classification.fixed.is_empty() {
        summary
            .push_str("<br><br>The following test cases were fixed in the latest test run:<br>");
        for name in sorted(&classification.fixed) {
            swrite!(summary, "- <i>{name}</i><br>");
        }
    }
    if !classification.transient_failures.is_empty() {
        summary.push_str("<br><br>The following transient test case failures occurred:<br>");
        for name in sorted(&classification.transient_failures) {
            swrite!(summary, "- {name}<br>");
        }
    }
    if !classification.skipped_since_failing.is_empty() {
        summary.push_str("<br><br>The following test cases have not been run since failing:<br>");
        for name in sorted(&classification.skipped_since_failing) {
            swrite!(summary, "- {name}<br>");
        }
    }
    summary
}

/// Composes the status alert for a classification, if one applies.
///
/// Returns `None` when no alert condition matches or when composition
/// fails; a composition failure drops that single notification with a
/// warning and never aborts the evaluation.
pub fn compose_status_alert(
    test: &TestKey,
    classification: &Classification,
    link: &str,
    recipients: &[String],
) -> Option<Message> {
    let kind = select_alert(classification)?;
    let build_id = classification.joined_build_ids();
    let summary = summary_html(classification);
    let footer = footer(link);

    let (subject, body) = match kind {
        AlertKind::NewFailures => (
            format!("New test failures in {test} @ {build_id}"),
            format!(
                "Hello,<br><br>Test cases are failing in {test} for device build ID(s): \
                 {build_id}.<br><br>{summary}{footer}"
            ),
        ),
        AlertKind::ContinuedFailures => (
            format!("Continued test failures in {test} @ {build_id}"),
            format!(
                "Hello,<br><br>Test cases are failing in {test} for device build ID(s): \
                 {build_id}.<br><br>{summary}{footer}"
            ),
        ),
        AlertKind::TransientFailure => (
            format!("Transient test failure in {test} @ {build_id}"),
            format!(
                "Hello,<br><br>Some test cases failed in {test} but tests all are passing \
                 in the latest device build(s): {build_id}.<br><br>{summary}{footer}"
            ),
        ),
        AlertKind::AllPassing => (
            format!("All test cases passing in {test} @ {build_id}"),
            format!(
                "Hello,<br><br>All test cases passed in {test} for device build ID(s): \
                 {build_id}!<br><br>{summary}{footer}"
            ),
        ),
    };

    match Message::compose(recipients, subject, body) {
        Ok(message) => Some(message),
        Err(err) => {
            warn!(%test, %err, "error composing status alert; dropping");
            None
        }
    }
}

/// Returns true if an inactivity notice is due.
///
/// Fires once per calendar day inside a short trigger window, starting
/// after one full day without uploads and stopping after seven, at which
/// point the suite is presumed deprecated.
pub fn inactivity_due(last_run_micros: i64, now_micros: i64) -> bool {
    let elapsed = now_micros - last_run_micros;
    elapsed > INACTIVITY_MIN_MICROS
        && elapsed < INACTIVITY_MAX_MICROS
        && elapsed % DAY_MICROS < INACTIVITY_WINDOW_MICROS
}

/// Composes an inactivity notice for a suite, if one is due.
pub fn compose_inactivity_alert(
    status: &TestStatus,
    now_micros: i64,
    link: &str,
    recipients: &[String],
) -> Option<Message> {
    if !inactivity_due(status.last_run_micros, now_micros) {
        return None;
    }
    let test = &status.test;
    let last_upload = DateTime::from_timestamp_micros(status.last_run_micros)
        .map(|time| time.format("%m/%d/%Y %H:%M:%S").to_string())
        .unwrap_or_else(|| "(unknown)".to_owned());
    let subject = format!("Warning! Inactive test: {test}");
    let body = format!(
        "Hello,<br><br>Test \"{test}\" is inactive. No new data has been uploaded since \
         {last_upload}.{}",
        footer(link)
    );
    match Message::compose(recipients, subject, body) {
        Ok(message) => Some(message),
        Err(err) => {
            warn!(%test, %err, "error composing inactivity notice; dropping");
            None
        }
    }
}
