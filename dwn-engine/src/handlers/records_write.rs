// SPDX-License-Identifier: MIT OR Apache-2.0

//! `RecordsWrite` handling.
//!
//! A record is the sequence of writes sharing a `recordId`; its current
//! state is the newest write by `(messageTimestamp, cid)`. An incoming
//! write that loses that comparison is acknowledged and discarded, so
//! replayed and out-of-order deliveries converge without observable
//! difference. Superseded writes are dropped from the message store, except
//! the initial write, which is retained because record identity and author
//! checks consult it.
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dwn_core::{
    Cid, Did, DidResolver, Message, entry_id, message::RecordsWriteDescriptor,
    validate_records_write,
};
use dwn_store::{DataStore, EventLog, FilterValue, MessageStore, StoredMessage};
use serde_json::Value;
use tracing::debug;

use crate::authenticate::authenticate;
use crate::authorize::authorize_write;
use crate::engine::Dwn;
use crate::error::ProcessError;
use crate::handlers::{
    IndexBuilder, cid_of, equals, filter_of, incoming_order_key, newest, parse_message,
    stored_form, stored_order_key,
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
    let message: Message<RecordsWriteDescriptor> = parse_message(raw, "RecordsWriteParseFailed")?;
    validate_records_write(&message)
        .map_err(|err| ProcessError::bad_request("RecordsWriteParseFailed", err.to_string()))?;

    let author = authenticate(&message, &dwn.resolver).await?;

    let record_id = message
        .record_id
        .ok_or_else(|| ProcessError::bad_request("RecordsWriteParseFailed", "missing recordId"))?;
    let record_id_text = record_id.to_string();

    let cid = cid_of(&message, "RecordsWriteComputeCidFailed")?;
    let derived_entry_id = entry_id(&message.descriptor, tenant)
        .map_err(|err| ProcessError::bad_request("RecordsWriteComputeCidFailed", err.to_string()))?;
    let is_initial = derived_entry_id == record_id;

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

    if message.descriptor.protocol.is_some() {
        authorize_write(tenant, &message, &author, &dwn.message_store).await?;
    } else {
        // Without a protocol declaration the data space is owner-only.
        if author != *tenant {
            return Err(ProcessError::unauthorized(
                "RecordsWriteUnauthorized",
                format!("only {tenant} may write records without a protocol"),
            ));
        }
        if !is_initial && find_initial(&existing, &record_id_text).is_none() {
            return Err(ProcessError::bad_request(
                "RecordsWriteInitialWriteMissing",
                format!("record {record_id} has no initial write"),
            ));
        }
    }

    let incoming_key = incoming_order_key(&message.descriptor.message_timestamp, &cid);
    let newest_existing = newest(existing.clone());
    if let Some(prev) = &newest_existing {
        if incoming_key <= stored_order_key(prev) {
            // Convergence loser (or replay of the stored state): the caller
            // cannot distinguish this from a store, nothing changes.
            debug!(%tenant, %record_id, "write loses against stored state");
            return Ok(Reply::accepted());
        }
    }

    if is_initial
        && find_initial(&existing, &record_id_text).is_some_and(|stored| stored.cid != cid)
    {
        return Err(ProcessError::conflict(
            "RecordsWriteInitialWriteCollision",
            format!("record {record_id} already has a different initial write"),
        ));
    }

    let data = verify_data(dwn, tenant, record_id, &message).await?;

    // Decision made; mutate.
    let mut message_store = dwn.message_store.clone();
    let mut event_log = dwn.event_log.clone();

    if let Some(data) = data {
        let mut data_store = dwn.data_store.clone();
        data_store
            .put(tenant, record_id, message.descriptor.data_cid, data)
            .await
            .map_err(ProcessError::store)?;
    }

    let value = message
        .to_value()
        .map_err(|err| ProcessError::bad_request("RecordsWriteParseFailed", err.to_string()))?;
    let descriptor = &message.descriptor;
    let indexes = IndexBuilder::new("Records", "Write", &descriptor.message_timestamp, &author)
        .entry("recordId", record_id_text.clone())
        .entry("entryId", derived_entry_id.to_string())
        .entry("dateCreated", descriptor.date_created.to_rfc3339())
        .entry("dataFormat", descriptor.data_format.clone())
        .entry("latestBaseState", "true")
        .entry_opt("protocol", descriptor.protocol.clone())
        .entry_opt("protocolPath", descriptor.protocol_path.clone())
        .entry_opt("schema", descriptor.schema.clone())
        .entry_opt(
            "recipient",
            descriptor.recipient.as_ref().map(Did::to_string),
        )
        .entry_opt("parentId", descriptor.parent_id.map(|cid| cid.to_string()))
        .entry_opt("contextId", message.context_id.map(|cid| cid.to_string()))
        .build();

    message_store
        .put(tenant, cid, &stored_form(&value), &indexes)
        .await
        .map_err(ProcessError::store)?;

    if let Some(prev) = newest_existing {
        supersede(&mut message_store, tenant, &record_id_text, prev).await?;
    }

    event_log
        .append(tenant, cid)
        .await
        .map_err(ProcessError::store)?;

    Ok(Reply::accepted())
}

/// Check attached data against the descriptor, or check that referenced
/// data is already held. Returns bytes that still need storing.
async fn verify_data<S, D, L, R>(
    dwn: &Dwn<S, D, L, R>,
    tenant: &Did,
    record_id: Cid,
    message: &Message<RecordsWriteDescriptor>,
) -> Result<Option<Vec<u8>>, ProcessError>
where
    S: MessageStore,
    D: DataStore,
    L: EventLog,
    R: DidResolver,
{
    let descriptor = &message.descriptor;

    match &message.encoded_data {
        Some(encoded) => {
            let data = URL_SAFE_NO_PAD.decode(encoded).map_err(|err| {
                ProcessError::bad_request("RecordsWriteMalformedData", err.to_string())
            })?;
            if Cid::of_raw(&data) != descriptor.data_cid {
                return Err(ProcessError::bad_request(
                    "RecordsWriteDataCidMismatch",
                    "attached data does not hash to the declared dataCid",
                ));
            }
            if data.len() as u64 != descriptor.data_size {
                return Err(ProcessError::bad_request(
                    "RecordsWriteDataSizeMismatch",
                    format!(
                        "attached data is {} bytes, descriptor declares {}",
                        data.len(),
                        descriptor.data_size
                    ),
                ));
            }
            Ok(Some(data))
        }
        None => {
            let held = dwn
                .data_store
                .get(tenant, record_id, descriptor.data_cid)
                .await
                .map_err(ProcessError::store)?;
            if held.is_none() {
                return Err(ProcessError::bad_request(
                    "RecordsWriteDataMissing",
                    format!(
                        "no data attached and {} is not held for record {record_id}",
                        descriptor.data_cid
                    ),
                ));
            }
            Ok(None)
        }
    }
}

/// Drop the superseded newest message; the initial write is kept but is no
/// longer the latest base state.
async fn supersede<S: MessageStore>(
    message_store: &mut S,
    tenant: &Did,
    record_id_text: &str,
    prev: StoredMessage,
) -> Result<(), ProcessError> {
    message_store
        .delete(tenant, prev.cid)
        .await
        .map_err(ProcessError::store)?;

    let is_initial_write = prev.indexes.get("method").map(String::as_str) == Some("Write")
        && prev.indexes.get("entryId").map(String::as_str) == Some(record_id_text);
    if is_initial_write {
        let mut indexes = prev.indexes;
        indexes.insert("latestBaseState".to_string(), "false".to_string());
        message_store
            .put(tenant, prev.cid, &prev.message, &indexes)
            .await
            .map_err(ProcessError::store)?;
    }

    Ok(())
}

fn find_initial<'a>(existing: &'a [StoredMessage], record_id_text: &str) -> Option<&'a StoredMessage> {
    existing.iter().find(|stored| {
        stored.indexes.get("method").map(String::as_str) == Some("Write")
            && stored.indexes.get("entryId").map(String::as_str) == Some(record_id_text)
    })
}
