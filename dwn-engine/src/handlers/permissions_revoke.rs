// SPDX-License-Identifier: MIT OR Apache-2.0

//! `PermissionsRevoke` handling.
//!
//! For any grant, the stored revokes converge to exactly one: the revoke
//! with the earliest message timestamp, ties broken by the lowest string
//! CID. A later-ordered stored revoke is tombstoned when an earlier-ordered
//! one arrives, including its event-log entry, so that replaying the log
//! reproduces the convergent state.
use dwn_core::{
    Cid, Did, DidResolver, Message,
    message::{PermissionsGrantDescriptor, PermissionsRevokeDescriptor},
    validate_permissions_revoke,
};
use dwn_store::{DataStore, EventLog, MessageStore};
use serde_json::Value;
use tracing::debug;

use crate::authenticate::authenticate;
use crate::engine::Dwn;
use crate::error::ProcessError;
use crate::handlers::{
    IndexBuilder, cid_of, equals, filter_of, incoming_order_key, parse_message, stored_order_key,
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
    let message: Message<PermissionsRevokeDescriptor> =
        parse_message(raw, "PermissionsRevokeParseFailed")?;
    validate_permissions_revoke(&message)
        .map_err(|err| ProcessError::bad_request("PermissionsRevokeParseFailed", err.to_string()))?;

    let author = authenticate(&message, &dwn.resolver).await?;
    let descriptor = &message.descriptor;
    let grant_id = descriptor.permissions_grant_id;

    let payload = message
        .authorization
        .decode_payload()
        .map_err(|err| ProcessError::bad_request("PermissionsRevokeParseFailed", err.to_string()))?;
    if payload.permissions_grant_id.is_some_and(|cited| cited != grant_id) {
        return Err(ProcessError::bad_request(
            "PermissionsRevokeGrantIdMismatch",
            "signed payload cites a different permissionsGrantId than the descriptor",
        ));
    }

    // The cited grant must exist in this tenant's space.
    let grant = fetch_grant(dwn, tenant, grant_id).await?;

    if descriptor.message_timestamp < grant.descriptor.message_timestamp {
        return Err(ProcessError::bad_request(
            "PermissionsRevokeRevokeBeforeGrant",
            format!(
                "revoke of {grant_id} carries an earlier date than associated PermissionsGrant"
            ),
        ));
    }

    if author != grant.descriptor.granted_for {
        return Err(ProcessError::unauthorized(
            "PermissionsRevokeUnauthorizedRevoke",
            format!(
                "only {} may revoke grant {grant_id}",
                grant.descriptor.granted_for
            ),
        ));
    }

    let cid = cid_of(&message, "PermissionsRevokeComputeCidFailed")?;
    let incoming_key = incoming_order_key(&descriptor.message_timestamp, &cid);

    let existing = dwn
        .message_store
        .query(
            tenant,
            &filter_of(&[
                ("interface", equals("Permissions")),
                ("method", equals("Revoke")),
                ("permissionsGrantId", equals(grant_id.to_string())),
            ]),
        )
        .await
        .map_err(ProcessError::store)?;

    let mut superseded: Vec<Cid> = Vec::new();
    for stored in &existing {
        let stored_key = stored_order_key(stored);
        if stored_key < incoming_key {
            return Err(ProcessError::conflict(
                "PermissionsRevokeSuperseded",
                format!("an earlier revoke is already stored for grant {grant_id}"),
            ));
        }
        if stored_key > incoming_key {
            superseded.push(stored.cid);
        }
    }

    // Decision made; mutate.
    let mut message_store = dwn.message_store.clone();
    let mut event_log = dwn.event_log.clone();

    for stored_cid in &superseded {
        debug!(%tenant, %grant_id, revoke = %stored_cid, "tombstoning superseded revoke");
        message_store
            .delete(tenant, *stored_cid)
            .await
            .map_err(ProcessError::store)?;
    }
    if !superseded.is_empty() {
        event_log
            .delete_by_cid(tenant, &superseded)
            .await
            .map_err(ProcessError::store)?;
    }

    let value = message
        .to_value()
        .map_err(|err| ProcessError::bad_request("PermissionsRevokeParseFailed", err.to_string()))?;
    let indexes = IndexBuilder::new(
        "Permissions",
        "Revoke",
        &descriptor.message_timestamp,
        &author,
    )
    .entry("permissionsGrantId", grant_id.to_string())
    .build();

    let inserted = message_store
        .put(tenant, cid, &value, &indexes)
        .await
        .map_err(ProcessError::store)?;
    if inserted {
        event_log
            .append(tenant, cid)
            .await
            .map_err(ProcessError::store)?;
    }

    Ok(Reply::accepted())
}

async fn fetch_grant<S, D, L, R>(
    dwn: &Dwn<S, D, L, R>,
    tenant: &Did,
    grant_id: Cid,
) -> Result<Message<PermissionsGrantDescriptor>, ProcessError>
where
    S: MessageStore,
    D: DataStore,
    L: EventLog,
    R: DidResolver,
{
    let not_found = || {
        ProcessError::bad_request(
            "PermissionsRevokeGrantNotFound",
            format!("Could not find PermissionsGrant {grant_id}"),
        )
    };

    let stored = dwn
        .message_store
        .get(tenant, grant_id)
        .await
        .map_err(ProcessError::store)?
        .ok_or_else(not_found)?;

    let is_grant = stored.indexes.get("interface").map(String::as_str) == Some("Permissions")
        && stored.indexes.get("method").map(String::as_str) == Some("Grant");
    if !is_grant {
        return Err(not_found());
    }

    Message::from_value(stored.message).map_err(ProcessError::store)
}
