// SPDX-License-Identifier: MIT OR Apache-2.0

//! `PermissionsGrant` handling.
use dwn_core::{
    Did, DidResolver, Message, message::PermissionsGrantDescriptor, validate_permissions_grant,
};
use dwn_store::{DataStore, EventLog, MessageStore};
use serde_json::Value;

use crate::authenticate::authenticate;
use crate::engine::Dwn;
use crate::error::ProcessError;
use crate::handlers::{IndexBuilder, cid_of, parse_message};
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
    let message: Message<PermissionsGrantDescriptor> =
        parse_message(raw, "PermissionsGrantParseFailed")?;
    validate_permissions_grant(&message)
        .map_err(|err| ProcessError::bad_request("PermissionsGrantParseFailed", err.to_string()))?;

    let author = authenticate(&message, &dwn.resolver).await?;
    let descriptor = &message.descriptor;

    // Grants are minted by the tenant for its own data space.
    if author != *tenant {
        return Err(ProcessError::unauthorized(
            "PermissionsGrantUnauthorizedGrant",
            format!("only {tenant} may issue grants in this data space"),
        ));
    }
    if descriptor.granted_by != author {
        return Err(ProcessError::unauthorized(
            "PermissionsGrantGrantedByMismatch",
            "grantedBy does not match the message author",
        ));
    }
    if descriptor.granted_for != *tenant {
        return Err(ProcessError::bad_request(
            "PermissionsGrantGrantedForMismatch",
            "grantedFor does not match the tenant",
        ));
    }

    let cid = cid_of(&message, "PermissionsGrantComputeCidFailed")?;
    let value = message
        .to_value()
        .map_err(|err| ProcessError::bad_request("PermissionsGrantParseFailed", err.to_string()))?;

    let indexes = IndexBuilder::new(
        "Permissions",
        "Grant",
        &descriptor.message_timestamp,
        &author,
    )
    .entry("grantedTo", descriptor.granted_to.to_string())
    .entry("grantedBy", descriptor.granted_by.to_string())
    .entry("grantedFor", descriptor.granted_for.to_string())
    .entry("dateExpires", descriptor.date_expires.to_rfc3339())
    .build();

    let mut message_store = dwn.message_store.clone();
    let inserted = message_store
        .put(tenant, cid, &value, &indexes)
        .await
        .map_err(ProcessError::store)?;
    if inserted {
        let mut event_log = dwn.event_log.clone();
        event_log
            .append(tenant, cid)
            .await
            .map_err(ProcessError::store)?;
    }

    Ok(Reply::accepted())
}
