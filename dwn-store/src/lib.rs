// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store interfaces and in-memory persistence for DWN messages.
//!
//! Three collaborators back the message-processing engine:
//!
//! - [`MessageStore`]: indexed message metadata, queried by named indexes.
//! - [`DataStore`]: opaque data blobs keyed by `(tenant, record, data cid)`.
//! - [`EventLog`]: the per-tenant ordered CID sequence used for change-data
//!   capture.
//!
//! All interfaces are tenant-namespaced; implementations must never leak
//! state across tenants. The in-memory implementations in [`memory`] are
//! suitable for tests and embedded use.

pub mod memory;
mod traits;

pub use memory::{MemoryDataStore, MemoryEventLog, MemoryMessageStore};
pub use traits::{
    DataStore, EventLog, EventPage, Filter, FilterValue, IndexMap, MessageStore, StoredMessage,
};
