// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-method state-transition handlers.
//!
//! Every handler follows the same shape: structural parse, authentication,
//! authorization, then a convergence decision against prior store state.
//! All reads and decisions happen before the first mutation; the caller
//! holds the tenant lock across the whole transition.
use dwn_core::{Cid, Did, Message, Timestamp};
use dwn_store::{Filter, FilterValue, IndexMap, StoredMessage};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ProcessError;

pub(crate) mod permissions_grant;
pub(crate) mod permissions_revoke;
pub(crate) mod protocols_configure;
pub(crate) mod protocols_query;
pub(crate) mod records_delete;
pub(crate) mod records_query;
pub(crate) mod records_read;
pub(crate) mod records_write;

/// The total order over messages: message timestamp, then string CID. The
/// timestamp text form is fixed-width, so string comparison agrees with
/// time comparison.
pub(crate) fn stored_order_key(stored: &StoredMessage) -> (String, String) {
    (
        stored
            .indexes
            .get("messageTimestamp")
            .cloned()
            .unwrap_or_default(),
        stored.cid.to_string(),
    )
}

pub(crate) fn incoming_order_key(timestamp: &Timestamp, cid: &Cid) -> (String, String) {
    (timestamp.to_rfc3339(), cid.to_string())
}

/// The newest stored message by `(messageTimestamp, cid)`.
pub(crate) fn newest(matches: Vec<StoredMessage>) -> Option<StoredMessage> {
    matches
        .into_iter()
        .max_by_key(|stored| stored_order_key(stored))
}

pub(crate) fn parse_message<D: DeserializeOwned>(
    raw: Value,
    code: &'static str,
) -> Result<Message<D>, ProcessError> {
    Message::from_value(raw).map_err(|err| ProcessError::bad_request(code, err.to_string()))
}

/// The CID of a typed message, surfacing encoding failures as malformed
/// input.
pub(crate) fn cid_of<D: Serialize>(
    message: &Message<D>,
    code: &'static str,
) -> Result<Cid, ProcessError> {
    message
        .cid()
        .map_err(|err| ProcessError::bad_request(code, err.to_string()))
}

/// The stored form of an envelope: attached data lives in the data store,
/// not the message store.
pub(crate) fn stored_form(message: &Value) -> Value {
    match message.as_object() {
        Some(map) if map.contains_key("encodedData") => {
            let mut stripped = map.clone();
            stripped.remove("encodedData");
            Value::Object(stripped)
        }
        _ => message.clone(),
    }
}

pub(crate) fn filter_of(entries: &[(&str, FilterValue)]) -> Filter {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

pub(crate) fn equals(value: impl Into<String>) -> FilterValue {
    FilterValue::Equals(value.into())
}

pub(crate) struct IndexBuilder(IndexMap);

impl IndexBuilder {
    pub(crate) fn new(
        interface: &str,
        method: &str,
        message_timestamp: &Timestamp,
        author: &Did,
    ) -> Self {
        let mut indexes = IndexMap::new();
        indexes.insert("interface".to_string(), interface.to_string());
        indexes.insert("method".to_string(), method.to_string());
        indexes.insert(
            "messageTimestamp".to_string(),
            message_timestamp.to_rfc3339(),
        );
        indexes.insert("author".to_string(), author.to_string());
        Self(indexes)
    }

    pub(crate) fn entry(mut self, name: &str, value: impl Into<String>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    pub(crate) fn entry_opt(mut self, name: &str, value: Option<impl Into<String>>) -> Self {
        if let Some(value) = value {
            self.0.insert(name.to_string(), value.into());
        }
        self
    }

    pub(crate) fn build(self) -> IndexMap {
        self.0
    }
}
