// SPDX-License-Identifier: MIT OR Apache-2.0

//! The engine facade and its entry point.
use dwn_core::{Did, DidResolver, KeyResolver, ProtocolLimits};
use dwn_store::{
    DataStore, EventLog, MemoryDataStore, MemoryEventLog, MemoryMessageStore, MessageStore,
};
use serde_json::Value;
use tracing::debug;

use crate::error::ProcessError;
use crate::handlers;
use crate::reply::Reply;
use crate::tenant::TenantLocks;

/// A Decentralized Web Node message-processing engine.
///
/// Generic over its injected collaborators: the message store, the data
/// store, the event log and the DID resolver. All state transitions go
/// through [`Dwn::process_message`].
pub struct Dwn<S, D, L, R> {
    pub(crate) message_store: S,
    pub(crate) data_store: D,
    pub(crate) event_log: L,
    pub(crate) resolver: R,
    pub(crate) limits: ProtocolLimits,
    pub(crate) locks: TenantLocks,
}

impl Dwn<MemoryMessageStore, MemoryDataStore, MemoryEventLog, KeyResolver> {
    /// An engine over in-memory stores, for tests and embedded use.
    pub fn in_memory(resolver: KeyResolver) -> Self {
        Self::new(
            MemoryMessageStore::new(),
            MemoryDataStore::new(),
            MemoryEventLog::new(),
            resolver,
        )
    }
}

impl<S, D, L, R> Dwn<S, D, L, R>
where
    S: MessageStore,
    D: DataStore,
    L: EventLog,
    R: DidResolver,
{
    pub fn new(message_store: S, data_store: D, event_log: L, resolver: R) -> Self {
        Self {
            message_store,
            data_store,
            event_log,
            resolver,
            limits: ProtocolLimits::default(),
            locks: TenantLocks::default(),
        }
    }

    /// Override the ingestion-time bounds on protocol definitions.
    pub fn with_limits(mut self, limits: ProtocolLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn message_store(&self) -> &S {
        &self.message_store
    }

    pub fn data_store(&self) -> &D {
        &self.data_store
    }

    pub fn event_log(&self) -> &L {
        &self.event_log
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Process one message against a tenant's data space.
    ///
    /// Processing is serialized per tenant: prior state is read, acceptance
    /// decided and new state written under the tenant's exclusive lock.
    /// Failures never unwind past this point; they are translated into the
    /// reply status.
    pub async fn process_message(&self, tenant: &Did, message: Value) -> Reply {
        let _guard = self.locks.acquire(tenant).await;

        match self.dispatch(tenant, message).await {
            Ok(reply) => reply,
            Err(err) => {
                debug!(%tenant, %err, "message rejected");
                Reply::status(err.status())
            }
        }
    }

    async fn dispatch(&self, tenant: &Did, message: Value) -> Result<Reply, ProcessError> {
        let interface = descriptor_field(&message, "interface")?;
        let method = descriptor_field(&message, "method")?;
        debug!(%tenant, %interface, %method, "processing message");

        match (interface.as_str(), method.as_str()) {
            ("Records", "Write") => handlers::records_write::handle(self, tenant, message).await,
            ("Records", "Read") => handlers::records_read::handle(self, tenant, message).await,
            ("Records", "Query") => handlers::records_query::handle(self, tenant, message).await,
            ("Records", "Delete") => handlers::records_delete::handle(self, tenant, message).await,
            ("Protocols", "Configure") => {
                handlers::protocols_configure::handle(self, tenant, message).await
            }
            ("Protocols", "Query") => {
                handlers::protocols_query::handle(self, tenant, message).await
            }
            ("Permissions", "Grant") => {
                handlers::permissions_grant::handle(self, tenant, message).await
            }
            ("Permissions", "Revoke") => {
                handlers::permissions_revoke::handle(self, tenant, message).await
            }
            _ => Err(ProcessError::bad_request(
                "ParseUnknownInterfaceMethod",
                format!("no handler for {interface} {method}"),
            )),
        }
    }
}

fn descriptor_field(message: &Value, name: &str) -> Result<String, ProcessError> {
    message
        .pointer(&format!("/descriptor/{name}"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ProcessError::bad_request(
                "ParseMalformedDescriptor",
                format!("descriptor carries no {name}"),
            )
        })
}
