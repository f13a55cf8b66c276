// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ProtocolsQuery` handling.
use dwn_core::{Did, DidResolver, Message, message::ProtocolsQueryDescriptor};
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
    let message: Message<ProtocolsQueryDescriptor> =
        parse_message(raw, "ProtocolsQueryParseFailed")?;
    let requester = authenticate(&message, &dwn.resolver).await?;

    if requester != *tenant {
        return Err(ProcessError::unauthorized(
            "ProtocolsQueryUnauthorized",
            format!("only {tenant} may query this data space"),
        ));
    }

    let mut filter = Filter::new();
    filter.insert("interface".to_string(), equals("Protocols"));
    filter.insert("method".to_string(), equals("Configure"));
    if let Some(protocol) = message
        .descriptor
        .filter
        .as_ref()
        .and_then(|filter| filter.protocol.clone())
    {
        filter.insert("protocol".to_string(), equals(protocol));
    }

    let mut matches = dwn
        .message_store
        .query(tenant, &filter)
        .await
        .map_err(ProcessError::store)?;

    matches.sort_by_key(|stored| {
        (
            stored
                .indexes
                .get("messageTimestamp")
                .cloned()
                .unwrap_or_default(),
            stored.cid.to_string(),
        )
    });

    let entries: Vec<Value> = matches.into_iter().map(|stored| stored.message).collect();
    Ok(Reply::ok(entries, None))
}
