// SPDX-License-Identifier: MIT OR Apache-2.0

//! Failure signalling across the processing pipeline.
//!
//! Every rejection carries a machine-readable code in
//! `<Subsystem><Condition>` shape plus a human-readable detail. The code is
//! the leading token of the status detail, so callers can match on it
//! without a second channel. Convergence checks signal through explicit
//! result values; nothing in the hot path unwinds.
use std::fmt::Display;

use thiserror::Error;

use crate::authorize::AuthorizationError;
use crate::reply::Status;

/// A handler-level failure, translated to a [`Status`] at the entry point.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Rejection with an explicit status code.
    #[error("{code}: {detail}")]
    Rejected {
        status: u16,
        code: &'static str,
        detail: String,
    },

    /// Protocol-rule evaluation failed.
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    /// Underlying store I/O failed; the transition was not committed.
    #[error("store failure: {0}")]
    Store(String),
}

impl ProcessError {
    pub(crate) fn bad_request(code: &'static str, detail: impl Into<String>) -> Self {
        Self::rejected(400, code, detail)
    }

    pub(crate) fn unauthorized(code: &'static str, detail: impl Into<String>) -> Self {
        Self::rejected(401, code, detail)
    }

    pub(crate) fn not_found(code: &'static str, detail: impl Into<String>) -> Self {
        Self::rejected(404, code, detail)
    }

    pub(crate) fn conflict(code: &'static str, detail: impl Into<String>) -> Self {
        Self::rejected(409, code, detail)
    }

    pub(crate) fn rejected(status: u16, code: &'static str, detail: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            code,
            detail: detail.into(),
        }
    }

    pub(crate) fn store<E: Display>(err: E) -> Self {
        Self::Store(err.to_string())
    }

    /// The status object surfaced to the caller.
    pub fn status(&self) -> Status {
        let code = match self {
            ProcessError::Rejected { status, .. } => *status,
            ProcessError::Authorization(err) => err.status_code(),
            ProcessError::Store(_) => 500,
        };
        Status::new(code, self.to_string())
    }
}
