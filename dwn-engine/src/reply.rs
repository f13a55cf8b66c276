// SPDX-License-Identifier: MIT OR Apache-2.0

//! Processing outcomes.
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP-aligned processing status.
///
/// 200 ok, 202 accepted, 400 malformed or invalid reference, 401
/// unauthenticated or unauthorized, 404 not found, 409 conflict, 500 store
/// failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: u16,
    pub detail: String,
}

impl Status {
    pub fn new(code: u16, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

/// The outcome of processing one message.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub status: Status,

    /// Matching messages, present on query and read replies.
    pub entries: Option<Vec<Value>>,

    /// Record data, present on read replies when the blob is held.
    pub data: Option<Vec<u8>>,
}

impl Reply {
    /// A state transition was accepted.
    pub fn accepted() -> Self {
        Self::status(Status::new(202, "Accepted"))
    }

    /// A lookup succeeded.
    pub fn ok(entries: Vec<Value>, data: Option<Vec<u8>>) -> Self {
        Self {
            status: Status::new(200, "OK"),
            entries: Some(entries),
            data,
        }
    }

    pub fn status(status: Status) -> Self {
        Self {
            status,
            entries: None,
            data: None,
        }
    }
}
