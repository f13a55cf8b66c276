// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ProtocolsConfigure` handling.
//!
//! The newest configure per protocol URI wins by `(messageTimestamp, cid)`;
//! a superseded definition is replaced through delete-plus-insert. Shape
//! limits are enforced here, at ingestion, never at query time.
use dwn_core::{
    Did, DidResolver, Message, message::ProtocolsConfigureDescriptor, validate_protocols_configure,
};
use dwn_store::{DataStore, EventLog, MessageStore};
use serde_json::Value;
use tracing::debug;

use crate::authenticate::authenticate;
use crate::engine::Dwn;
use crate::error::ProcessError;
use crate::handlers::{
    IndexBuilder, cid_of, equals, filter_of, incoming_order_key, newest, parse_message,
    stored_order_key,
};
use crate::reply::Reply;

pub(crate) async fn handle<S, D, L, R>(
    dwn: &Dwn<S, D, L, R>,
    tenant: &Did,
    raw: Value,
) -> Result<Reply, ProcessError>
where
    S: MessageStore,
    D: DataStore,
    L: EventLog,
    R: DidResolver,
{
    let message: Message<ProtocolsConfigureDescriptor> =
        parse_message(raw, "ProtocolsConfigureParseFailed")?;
    validate_protocols_configure(&message).map_err(|err| {
        ProcessError::bad_request("ProtocolsConfigureParseFailed", err.to_string())
    })?;
    message
        .descriptor
        .definition
        .validate(&dwn.limits)
        .map_err(|err| {
            ProcessError::bad_request("ProtocolsConfigureInvalidDefinition", err.to_string())
        })?;

    let author = authenticate(&message, &dwn.resolver).await?;
    if author != *tenant {
        return Err(ProcessError::unauthorized(
            "ProtocolsConfigureUnauthorized",
            format!("only {tenant} may configure protocols in this data space"),
        ));
    }

    let protocol = message.descriptor.protocol.clone();
    let existing = dwn
        .message_store
        .query(
            tenant,
            &filter_of(&[
                ("interface", equals("Protocols")),
                ("method", equals("Configure")),
                ("protocol", equals(protocol.clone())),
            ]),
        )
        .await
        .map_err(ProcessError::store)?;

    let cid = cid_of(&message, "ProtocolsConfigureComputeCidFailed")?;
    let incoming_key = incoming_order_key(&message.descriptor.message_timestamp, &cid);

    let prev = newest(existing);
    if let Some(prev) = &prev {
        if incoming_key <= stored_order_key(prev) {
            return Err(ProcessError::conflict(
                "ProtocolsConfigureConflict",
                format!("a newer configuration is already stored for {protocol}"),
            ));
        }
    }

    // Decision made; mutate.
    let mut message_store = dwn.message_store.clone();
    let mut event_log = dwn.event_log.clone();

    if let Some(prev) = prev {
        debug!(%tenant, %protocol, superseded = %prev.cid, "replacing protocol configuration");
        message_store
            .delete(tenant, prev.cid)
            .await
            .map_err(ProcessError::store)?;
    }

    let value = message.to_value().map_err(|err| {
        ProcessError::bad_request("ProtocolsConfigureParseFailed", err.to_string())
    })?;
    let indexes = IndexBuilder::new(
        "Protocols",
        "Configure",
        &message.descriptor.message_timestamp,
        &author,
    )
    .entry("protocol", protocol)
    .build();

    message_store
        .put(tenant, cid, &value, &indexes)
        .await
        .map_err(ProcessError::store)?;
    event_log
        .append(tenant, cid)
        .await
        .map_err(ProcessError::store)?;

    Ok(Reply::accepted())
}
