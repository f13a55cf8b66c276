// SPDX-License-Identifier: MIT OR Apache-2.0

//! `RecordsQuery` handling.
use dwn_core::{Did, DidResolver, Message, message::RecordsQueryDescriptor};
use dwn_store::{DataStore, EventLog, Filter, MessageStore};
use serde_json::Value;

use crate::authenticate::authenticate;
use crate::engine::Dwn;
use crate::error::ProcessError;
use crate::handlers::{equals, parse_message};
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
    let message: Message<RecordsQueryDescriptor> = parse_message(raw, "RecordsQueryParseFailed")?;
    let requester = authenticate(&message, &dwn.resolver).await?;

    if requester != *tenant {
        return Err(ProcessError::unauthorized(
            "RecordsQueryUnauthorized",
            format!("only {tenant} may query this data space"),
        ));
    }

    let mut filter = Filter::new();
    filter.insert("interface".to_string(), equals("Records"));
    filter.insert("method".to_string(), equals("Write"));
    filter.insert("latestBaseState".to_string(), equals("true"));

    let requested = &message.descriptor.filter;
    if let Some(record_id) = requested.record_id {
        filter.insert("recordId".to_string(), equals(record_id.to_string()));
    }
    if let Some(protocol) = &requested.protocol {
        filter.insert("protocol".to_string(), equals(protocol.clone()));
    }
    if let Some(protocol_path) = &requested.protocol_path {
        filter.insert("protocolPath".to_string(), equals(protocol_path.clone()));
    }
    if let Some(schema) = &requested.schema {
        filter.insert("schema".to_string(), equals(schema.clone()));
    }
    if let Some(recipient) = &requested.recipient {
        filter.insert("recipient".to_string(), equals(recipient.to_string()));
    }
    if let Some(context_id) = requested.context_id {
        filter.insert("contextId".to_string(), equals(context_id.to_string()));
    }
    if let Some(data_format) = &requested.data_format {
        filter.insert("dataFormat".to_string(), equals(data_format.clone()));
    }
    if let Some(parent_id) = requested.parent_id {
        filter.insert("parentId".to_string(), equals(parent_id.to_string()));
    }

    let mut matches = dwn
        .message_store
        .query(tenant, &filter)
        .await
        .map_err(ProcessError::store)?;

    // Stores return in unspecified order; present by creation time with the
    // string CID as deterministic tiebreaker.
    matches.sort_by_key(|stored| {
        (
            stored.indexes.get("dateCreated").cloned().unwrap_or_default(),
            stored.cid.to_string(),
        )
    });

    let entries: Vec<Value> = matches.into_iter().map(|stored| stored.message).collect();
    Ok(Reply::ok(entries, None))
}
