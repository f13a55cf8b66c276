// SPDX-License-Identifier: MIT OR Apache-2.0

//! `RecordsDelete` handling.
use dwn_core::{
    Did, DidResolver, Message,
    message::{RecordsDeleteDescriptor, RecordsWriteDescriptor},
};
use dwn_store::{DataStore, EventLog, FilterValue, MessageStore};
use serde_json::Value;

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
    let message: Message<RecordsDeleteDescriptor> = parse_message(raw, "RecordsDeleteParseFailed")?;
    let author = authenticate(&message, &dwn.resolver).await?;

    if author != *tenant {
        return Err(ProcessError::unauthorized(
            "RecordsDeleteUnauthorized",
            format!("only {tenant} may delete records in this data space"),
        ));
    }

    let record_id = message.descriptor.record_id;
    let record_id_text = record_id.to_string();

    let existing = dwn
        .message_store
        .query(
            tenant,
            &filter_of(&[
                ("interface", equals("Records")),
                (
                    "method",
                    FilterValue::OneOf(vec!["Write".to_string(), "Delete".to_string()]),
                ),
                ("recordId", equals(record_id_text.clone())),
            ]),
        )
        .await
        .map_err(ProcessError::store)?;

    let Some(prev) = newest(existing.clone()) else {
        return Err(ProcessError::not_found(
            "RecordsDeleteNotFound",
            format!("no record found for {record_id}"),
        ));
    };
    if prev.indexes.get("method").map(String::as_str) == Some("Delete") {
        return Err(ProcessError::not_found(
            "RecordsDeleteNotFound",
            format!("record {record_id} is already deleted"),
        ));
    }

    let cid = cid_of(&message, "RecordsDeleteComputeCidFailed")?;
    let incoming_key = incoming_order_key(&message.descriptor.message_timestamp, &cid);
    if incoming_key <= stored_order_key(&prev) {
        return Err(ProcessError::conflict(
            "RecordsDeleteConflict",
            format!("a newer message is already stored for record {record_id}"),
        ));
    }

    let newest_write: Message<RecordsWriteDescriptor> =
        Message::from_value(prev.message.clone()).map_err(ProcessError::store)?;

    // Decision made; mutate.
    let mut message_store = dwn.message_store.clone();
    let mut data_store = dwn.data_store.clone();
    let mut event_log = dwn.event_log.clone();

    data_store
        .delete(tenant, record_id, newest_write.descriptor.data_cid)
        .await
        .map_err(ProcessError::store)?;

    // Prune superseded writes; the initial write is retained for record
    // identity, no longer as latest base state.
    for stored in existing {
        if stored.indexes.get("method").map(String::as_str) != Some("Write") {
            continue;
        }
        let is_initial =
            stored.indexes.get("entryId").map(String::as_str) == Some(record_id_text.as_str());

        message_store
            .delete(tenant, stored.cid)
            .await
            .map_err(ProcessError::store)?;
        if is_initial {
            let mut indexes = stored.indexes;
            indexes.insert("latestBaseState".to_string(), "false".to_string());
            message_store
                .put(tenant, stored.cid, &stored.message, &indexes)
                .await
                .map_err(ProcessError::store)?;
        }
    }

    let value = message
        .to_value()
        .map_err(|err| ProcessError::bad_request("RecordsDeleteParseFailed", err.to_string()))?;
    let indexes = IndexBuilder::new(
        "Records",
        "Delete",
        &message.descriptor.message_timestamp,
        &author,
    )
    .entry("recordId", record_id_text)
    .entry("latestBaseState", "true")
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
