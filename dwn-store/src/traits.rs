// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for the stores backing the message-processing engine.
use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::future::Future;

use dwn_core::{Cid, Did};
use serde_json::Value;

/// Index names mapped to their indexed string values.
///
/// Recognized names: `interface`, `method`, `protocol`, `contextId`,
/// `recordId`, `parentId`, `protocolPath`, `schema`, `dataFormat`,
/// `recipient`, `permissionsGrantId`, `entryId`, `dateCreated`,
/// `messageTimestamp`, `author`, `latestBaseState`.
pub type IndexMap = BTreeMap<String, String>;

/// Matches one indexed value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterValue {
    /// The indexed value must equal the given value.
    Equals(String),

    /// The indexed value must be a member of the given set.
    OneOf(Vec<String>),
}

impl FilterValue {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            FilterValue::Equals(expected) => expected == value,
            FilterValue::OneOf(expected) => expected.iter().any(|entry| entry == value),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Equals(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Equals(value)
    }
}

/// Index names mapped to the values a query matches on.
///
/// A message matches when every named index is present and matches; entries
/// are conjunctive.
pub type Filter = BTreeMap<String, FilterValue>;

/// A message held by a [`MessageStore`].
#[derive(Clone, Debug, PartialEq)]
pub struct StoredMessage {
    pub cid: Cid,
    pub message: Value,
    pub indexes: IndexMap,
}

/// Interface for storing, querying and deleting indexed messages.
///
/// Implementations are cheap to clone and namespace all state by tenant.
pub trait MessageStore: Clone {
    type Error: Display + Debug;

    /// Insert a message under its CID together with its index values.
    ///
    /// Idempotent by CID: returns `true` when the insert occurred, or
    /// `false` when the message already existed and nothing changed.
    fn put(
        &mut self,
        tenant: &Did,
        cid: Cid,
        message: &Value,
        indexes: &IndexMap,
    ) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Get a single message by CID.
    fn get(
        &self,
        tenant: &Did,
        cid: Cid,
    ) -> impl Future<Output = Result<Option<StoredMessage>, Self::Error>>;

    /// Query messages by indexed values.
    ///
    /// Results are returned in unspecified order; callers sort.
    fn query(
        &self,
        tenant: &Did,
        filter: &Filter,
    ) -> impl Future<Output = Result<Vec<StoredMessage>, Self::Error>>;

    /// Delete a message by CID.
    ///
    /// Idempotent: returns `true` when the removal occurred and `false` when
    /// the message was not found.
    fn delete(&mut self, tenant: &Did, cid: Cid) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Drop all state, across tenants. Test support.
    fn clear(&mut self) -> impl Future<Output = Result<(), Self::Error>>;
}

/// Interface for storing opaque data blobs.
///
/// Blobs are keyed by `(tenant, record id, data cid)`; blob identity is the
/// raw-codec data CID.
pub trait DataStore: Clone {
    type Error: Display + Debug;

    /// Store a blob. Returns `false` when the key already existed.
    fn put(
        &mut self,
        tenant: &Did,
        record_id: Cid,
        data_cid: Cid,
        data: Vec<u8>,
    ) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Get a blob.
    fn get(
        &self,
        tenant: &Did,
        record_id: Cid,
        data_cid: Cid,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>>;

    /// Delete a blob. Returns `false` when the key was not found.
    fn delete(
        &mut self,
        tenant: &Did,
        record_id: Cid,
        data_cid: Cid,
    ) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Drop all state, across tenants. Test support.
    fn clear(&mut self) -> impl Future<Output = Result<(), Self::Error>>;
}

/// One page of an event log.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventPage {
    /// Message CIDs in append order.
    pub events: Vec<Cid>,

    /// Pass to the next [`EventLog::events`] call to resume after the last
    /// returned event. `None` when the page is empty.
    pub cursor: Option<Cid>,
}

/// Interface for the per-tenant append-only CID sequence.
///
/// The log is append-only with surgical deletion: entries superseded during
/// convergence are spliced out so that a replay of the remaining events
/// reconstructs the live message store.
pub trait EventLog: Clone {
    type Error: Display + Debug;

    /// Append a message CID to a tenant's log.
    fn append(&mut self, tenant: &Did, cid: Cid) -> impl Future<Output = Result<(), Self::Error>>;

    /// Get events in append order, after the cursor position when one is
    /// given.
    ///
    /// The cursor is a message CID; cursor positions survive splices because
    /// the log stores the CID sequence itself.
    fn events(
        &self,
        tenant: &Did,
        cursor: Option<Cid>,
    ) -> impl Future<Output = Result<EventPage, Self::Error>>;

    /// Splice the given CIDs out of a tenant's log. Returns the number of
    /// removed entries.
    fn delete_by_cid(
        &mut self,
        tenant: &Did,
        cids: &[Cid],
    ) -> impl Future<Output = Result<usize, Self::Error>>;

    /// Drop all state, across tenants. Test support.
    fn clear(&mut self) -> impl Future<Output = Result<(), Self::Error>>;
}
