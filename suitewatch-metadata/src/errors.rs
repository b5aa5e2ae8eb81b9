// Copyright (c) The suitewatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use thiserror::Error;

/// Error returned when a stored case-result code is not a recognized
/// [`CaseResult`](crate::CaseResult) discriminant.
#[derive(Clone, Debug, Error)]
#[error("unrecognized case result code {code} (known codes: 0..=5)")]
pub struct ResultCodeParseError {
    code: u32,
}

impl ResultCodeParseError {
    pub(crate) fn new(code: u32) -> Self {
        Self { code }
    }

    /// The unrecognized wire code.
    pub fn code(&self) -> u32 {
        self.code
    }
}
