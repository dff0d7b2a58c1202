// Copyright 2026 Trialign Contributors
// SPDX-License-Identifier: Apache-2.0

//! Trialign — asynchronous signal-alignment analysis pipeline.
//!
//! Given a raw fluorescence time-series and a parallel behavioral-event
//! label stream, trialign produces trial-aligned matrices (trial ×
//! relative-time bin) suitable for downstream visualization and
//! statistics. Analyses run as cancellable, pollable background jobs
//! over datasets selected through a boolean tag-membership expression.
//!
//! The crate is the core of a larger research data manager; persistence,
//! HTTP routing, authentication, and file handling live outside and talk
//! to this crate through the [`orchestrator::DataProvider`] seam and the
//! serializable wire types.

pub mod engine;
pub mod error;
pub mod mirror;
pub mod orchestrator;
pub mod registry;
pub mod selector;
pub mod series;

pub use error::{Error, Result};
