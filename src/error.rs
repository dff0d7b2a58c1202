// Copyright 2026 Trialign Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the analysis pipeline.
//!
//! Every failure a caller can observe carries a stable `kind` string, so
//! the HTTP layer (out of scope here) can serialize errors without ever
//! touching an unclassified exception. Configuration and expression
//! errors are raised synchronously, before any job exists; everything
//! that happens inside a running job is captured by the registry and
//! surfaced as a stored descriptor.

use serde::{Deserialize, Serialize};

/// Errors raised by the selector, engine, registry, and orchestrator.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// Malformed tag expression (e.g., negative tag id). Raised at
    /// construction time — an expression is validated once, evaluated many
    /// times.
    #[error("invalid tag expression: {0}")]
    InvalidExpression(String),

    /// Malformed engine configuration (non-positive window, zero bin
    /// count, empty template, …). Raised at submission, before a job id
    /// is ever issued.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Unknown job identifier.
    #[error("job not found: {0}")]
    NotFound(String),

    /// Result requested while the job is still queued or running.
    #[error("job not ready: {0}")]
    NotReady(String),

    /// Any failure raised inside the unit of work during execution,
    /// including panics. Captured by the registry, never propagated as an
    /// unhandled crash.
    #[error("engine failure: {0}")]
    EngineFailure(String),

    /// The job was cancelled. Not strictly an error, but result retrieval
    /// on a cancelled job reports this kind rather than `NotReady`.
    #[error("job cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    /// Stable kind discriminator for wire responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidExpression(_) => "InvalidExpression",
            Error::InvalidConfiguration(_) => "InvalidConfiguration",
            Error::NotFound(_) => "NotFound",
            Error::NotReady(_) => "NotReady",
            Error::EngineFailure(_) => "EngineFailure",
            Error::Cancelled(_) => "Cancelled",
        }
    }

    /// Serialize into the wire error body.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

/// Wire shape of an error response: `{ kind, message }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, Error>;
