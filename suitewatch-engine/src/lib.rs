// Copyright (c) The suitewatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core evaluation logic for suitewatch.
//!
//! For each monitored test suite, an evaluation cycle decides whether the
//! most recent execution runs introduced, continued, fixed, or transiently
//! produced case failures relative to the previously recorded status, then
//! commits a replacement status aggregate under optimistic concurrency and
//! releases at most one notification per suite — only if the commit won.
//!
//! The pieces, leaves first:
//!
//! - [`store`] — seams over the external dashboard store, plus an
//!   in-memory implementation for tests.
//! - [`classify`] — the failure classification engine: the backward walk
//!   over run history.
//! - [`notify`] — alert selection and composition, and the inactivity
//!   detector.
//! - [`update`] — the bounded-retry optimistic commit of the aggregate.
//! - [`evaluate`] — the scheduled job driving all of the above per suite.

pub mod classify;
pub mod config;
pub mod errors;
pub mod evaluate;
pub mod notify;
pub mod store;
pub mod update;
