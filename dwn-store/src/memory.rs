// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory persistence for DWN messages, data blobs and event logs.
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dwn_core::{Cid, Did};
use serde_json::Value;

use crate::traits::{
    DataStore, EventLog, EventPage, Filter, IndexMap, MessageStore, StoredMessage,
};

#[derive(Debug, Default)]
struct InnerMessageStore {
    messages: HashMap<Did, HashMap<Cid, (Value, IndexMap)>>,
}

/// An in-memory [`MessageStore`].
///
/// Supports usage in asynchronous and multi-threaded contexts by wrapping
/// the inner state with an `RwLock` and `Arc`; clones share state.
#[derive(Clone, Debug, Default)]
pub struct MemoryMessageStore {
    inner: Arc<RwLock<InnerMessageStore>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_store(&self) -> RwLockReadGuard<'_, InnerMessageStore> {
        self.inner
            .read()
            .expect("acquire shared read access on store")
    }

    fn write_store(&self) -> RwLockWriteGuard<'_, InnerMessageStore> {
        self.inner
            .write()
            .expect("acquire exclusive write access on store")
    }
}

fn matches(indexes: &IndexMap, filter: &Filter) -> bool {
    filter.iter().all(|(name, value)| {
        indexes
            .get(name)
            .is_some_and(|indexed| value.matches(indexed))
    })
}

impl MessageStore for MemoryMessageStore {
    type Error = Infallible;

    async fn put(
        &mut self,
        tenant: &Did,
        cid: Cid,
        message: &Value,
        indexes: &IndexMap,
    ) -> Result<bool, Self::Error> {
        let mut store = self.write_store();
        let messages = store.messages.entry(tenant.clone()).or_default();

        if messages.contains_key(&cid) {
            return Ok(false);
        }

        messages.insert(cid, (message.clone(), indexes.clone()));
        Ok(true)
    }

    async fn get(&self, tenant: &Did, cid: Cid) -> Result<Option<StoredMessage>, Self::Error> {
        let store = self.read_store();
        let Some(messages) = store.messages.get(tenant) else {
            return Ok(None);
        };

        Ok(messages.get(&cid).map(|(message, indexes)| StoredMessage {
            cid,
            message: message.clone(),
            indexes: indexes.clone(),
        }))
    }

    async fn query(&self, tenant: &Did, filter: &Filter) -> Result<Vec<StoredMessage>, Self::Error> {
        let store = self.read_store();
        let Some(messages) = store.messages.get(tenant) else {
            return Ok(Vec::new());
        };

        Ok(messages
            .iter()
            .filter(|(_, (_, indexes))| matches(indexes, filter))
            .map(|(cid, (message, indexes))| StoredMessage {
                cid: *cid,
                message: message.clone(),
                indexes: indexes.clone(),
            })
            .collect())
    }

    async fn delete(&mut self, tenant: &Did, cid: Cid) -> Result<bool, Self::Error> {
        let mut store = self.write_store();
        let Some(messages) = store.messages.get_mut(tenant) else {
            return Ok(false);
        };

        Ok(messages.remove(&cid).is_some())
    }

    async fn clear(&mut self) -> Result<(), Self::Error> {
        self.write_store().messages.clear();
        Ok(())
    }
}

/// An in-memory [`DataStore`].
#[derive(Clone, Debug, Default)]
pub struct MemoryDataStore {
    inner: Arc<RwLock<HashMap<(Did, Cid, Cid), Vec<u8>>>>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataStore for MemoryDataStore {
    type Error = Infallible;

    async fn put(
        &mut self,
        tenant: &Did,
        record_id: Cid,
        data_cid: Cid,
        data: Vec<u8>,
    ) -> Result<bool, Self::Error> {
        let mut store = self
            .inner
            .write()
            .expect("acquire exclusive write access on store");

        let key = (tenant.clone(), record_id, data_cid);
        if store.contains_key(&key) {
            return Ok(false);
        }

        store.insert(key, data);
        Ok(true)
    }

    async fn get(
        &self,
        tenant: &Did,
        record_id: Cid,
        data_cid: Cid,
    ) -> Result<Option<Vec<u8>>, Self::Error> {
        let store = self
            .inner
            .read()
            .expect("acquire shared read access on store");

        Ok(store.get(&(tenant.clone(), record_id, data_cid)).cloned())
    }

    async fn delete(
        &mut self,
        tenant: &Did,
        record_id: Cid,
        data_cid: Cid,
    ) -> Result<bool, Self::Error> {
        let mut store = self
            .inner
            .write()
            .expect("acquire exclusive write access on store");

        Ok(store.remove(&(tenant.clone(), record_id, data_cid)).is_some())
    }

    async fn clear(&mut self) -> Result<(), Self::Error> {
        self.inner
            .write()
            .expect("acquire exclusive write access on store")
            .clear();
        Ok(())
    }
}

/// An in-memory [`EventLog`].
#[derive(Clone, Debug, Default)]
pub struct MemoryEventLog {
    inner: Arc<RwLock<HashMap<Did, Vec<Cid>>>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventLog for MemoryEventLog {
    type Error = Infallible;

    async fn append(&mut self, tenant: &Did, cid: Cid) -> Result<(), Self::Error> {
        self.inner
            .write()
            .expect("acquire exclusive write access on log")
            .entry(tenant.clone())
            .or_default()
            .push(cid);
        Ok(())
    }

    async fn events(&self, tenant: &Did, cursor: Option<Cid>) -> Result<EventPage, Self::Error> {
        let log = self
            .inner
            .read()
            .expect("acquire shared read access on log");
        let Some(events) = log.get(tenant) else {
            return Ok(EventPage::default());
        };

        let events: Vec<Cid> = match cursor {
            Some(cursor) => events
                .iter()
                .skip_while(|cid| **cid != cursor)
                .skip(1)
                .copied()
                .collect(),
            None => events.clone(),
        };

        Ok(EventPage {
            cursor: events.last().copied(),
            events,
        })
    }

    async fn delete_by_cid(&mut self, tenant: &Did, cids: &[Cid]) -> Result<usize, Self::Error> {
        let mut log = self
            .inner
            .write()
            .expect("acquire exclusive write access on log");
        let Some(events) = log.get_mut(tenant) else {
            return Ok(0);
        };

        let before = events.len();
        events.retain(|cid| !cids.contains(cid));
        Ok(before - events.len())
    }

    async fn clear(&mut self) -> Result<(), Self::Error> {
        self.inner
            .write()
            .expect("acquire exclusive write access on log")
            .clear();
        Ok(())
    }
}
