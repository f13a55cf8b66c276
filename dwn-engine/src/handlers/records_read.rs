// SPDX-License-Identifier: MIT OR Apache-2.0

//! `RecordsRead` handling.
use dwn_core::{
    Did, DidResolver, Message,
    message::{RecordsReadDescriptor, RecordsWriteDescriptor},
};
use dwn_store::{DataStore, EventLog, MessageStore};
use serde_json::Value;

use crate::authenticate::authenticate;
use crate::authorize::authorize_read;
use crate::engine::Dwn;
use crate::error::ProcessError;
use crate::handlers::{equals, filter_of, newest, parse_message};
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
    let message: Message<RecordsReadDescriptor> = parse_message(raw, "RecordsReadParseFailed")?;
    let requester = authenticate(&message, &dwn.resolver).await?;
    let record_id = message.descriptor.record_id;

    let matches = dwn
        .message_store
        .query(
            tenant,
            &filter_of(&[
                ("interface", equals("Records")),
                ("recordId", equals(record_id.to_string())),
                ("latestBaseState", equals("true")),
            ]),
        )
        .await
        .map_err(ProcessError::store)?;

    let not_found = || {
        ProcessError::not_found(
            "RecordsReadNotFound",
            format!("no record found for {record_id}"),
        )
    };

    let stored = newest(matches).ok_or_else(not_found)?;
    if stored.indexes.get("method").map(String::as_str) == Some("Delete") {
        return Err(not_found());
    }

    let write: Message<RecordsWriteDescriptor> =
        Message::from_value(stored.message.clone()).map_err(ProcessError::store)?;

    if requester != *tenant {
        if write.descriptor.protocol.is_some() {
            let newest_author = stored
                .indexes
                .get("author")
                .map(|author| Did::new(author.clone()))
                .ok_or_else(|| ProcessError::store("stored message has no author index"))?;
            authorize_read(tenant, &write, &newest_author, &requester, &dwn.message_store).await?;
        } else {
            return Err(ProcessError::unauthorized(
                "RecordsReadUnauthorized",
                format!("only {tenant} may read records without a protocol"),
            ));
        }
    }

    let data = dwn
        .data_store
        .get(tenant, record_id, write.descriptor.data_cid)
        .await
        .map_err(ProcessError::store)?;

    Ok(Reply::ok(vec![stored.message], data))
}
