// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message envelopes and typed descriptors.
//!
//! A message is `{descriptor, authorization}` plus the record identity
//! fields for records messages. The descriptor names its interface and
//! method and carries the method-specific fields; the authorization is a
//! [`Jws`] over the descriptor CID. Equality of messages is equality of
//! their CIDs, computed over the canonical CBOR encoding of the whole
//! envelope with any attached data stripped.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::cbor::EncodeError;
use crate::cid::Cid;
use crate::did::Did;
use crate::jws::{Jws, JwsError};
use crate::protocol::ProtocolDefinition;
use crate::time::Timestamp;

/// The interfaces a DWN exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interface {
    Records,
    Protocols,
    Permissions,
}

impl Interface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interface::Records => "Records",
            Interface::Protocols => "Protocols",
            Interface::Permissions => "Permissions",
        }
    }
}

impl std::fmt::Display for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The methods of the interfaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Write,
    Read,
    Query,
    Delete,
    Configure,
    Grant,
    Revoke,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Write => "Write",
            Method::Read => "Read",
            Method::Query => "Query",
            Method::Delete => "Delete",
            Method::Configure => "Configure",
            Method::Grant => "Grant",
            Method::Revoke => "Revoke",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signed message envelope around a typed descriptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message<D> {
    pub descriptor: D,
    pub authorization: Jws,

    /// Stable record identity, required on records messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<Cid>,

    /// Record id of the protocol root ancestor, present on protocol records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<Cid>,

    /// base64-encoded data travelling alongside a write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoded_data: Option<String>,
}

impl<D: Serialize> Message<D> {
    /// The content identifier of the whole message, authorization included.
    pub fn cid(&self) -> Result<Cid, EncodeError> {
        message_cid(&self.to_value()?)
    }

    /// The content identifier of the descriptor alone.
    pub fn descriptor_cid(&self) -> Result<Cid, EncodeError> {
        Cid::of(&self.descriptor)
    }

    /// The claimed author, the DID behind the first signature entry.
    ///
    /// Only meaningful once the authorization has been verified.
    pub fn author(&self) -> Result<Did, JwsError> {
        let signers = self.authorization.signer_dids()?;
        Ok(signers
            .into_iter()
            .next()
            .expect("signer_dids errors on empty signatures"))
    }

    /// The JSON form of the envelope.
    pub fn to_value(&self) -> Result<Value, EncodeError> {
        serde_json::to_value(self).map_err(|err| EncodeError::Value(err.to_string()))
    }
}

impl<D: DeserializeOwned> Message<D> {
    /// Parse an envelope into a typed message.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// The content identifier of a message in JSON form.
///
/// Data travels next to the message but is content-addressed on its own; it
/// never contributes to message identity.
pub fn message_cid(message: &Value) -> Result<Cid, EncodeError> {
    match message.as_object() {
        Some(map) if map.contains_key("encodedData") => {
            let mut stripped = map.clone();
            stripped.remove("encodedData");
            Cid::of(&stripped)
        }
        _ => Cid::of(message),
    }
}

/// Derive the stable identity of a record from its initial write.
///
/// The descriptor never contains `recordId`, `contextId` or the
/// authorization, so hashing it together with the tenant is well-founded:
/// the identity exists before the envelope that carries it.
pub fn entry_id<D: Serialize>(descriptor: &D, tenant: &Did) -> Result<Cid, EncodeError> {
    let mut value = serde_json::to_value(descriptor).map_err(|err| EncodeError::Value(err.to_string()))?;
    let map = value
        .as_object_mut()
        .ok_or_else(|| EncodeError::Value("descriptor must encode to a map".to_string()))?;
    map.insert(
        "tenant".to_string(),
        Value::String(tenant.as_str().to_string()),
    );
    Cid::of(&value)
}

/// Descriptor of a `RecordsWrite`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsWriteDescriptor {
    pub interface: Interface,
    pub method: Method,
    pub message_timestamp: Timestamp,

    /// Creation time of the record, identical across all writes of a record.
    pub date_created: Timestamp,

    pub data_cid: Cid,
    pub data_size: u64,
    pub data_format: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Did>,

    /// Protocol URI, present on protocol records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    /// `/`-delimited record-definition names from the protocol root down to
    /// this record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Record id of the parent record in the protocol tree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Cid>,
}

/// Descriptor of a `RecordsRead`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsReadDescriptor {
    pub interface: Interface,
    pub method: Method,
    pub message_timestamp: Timestamp,
    pub record_id: Cid,
}

/// Filter of a `RecordsQuery`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<Cid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Did>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<Cid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Cid>,
}

impl RecordsFilter {
    pub fn is_empty(&self) -> bool {
        self == &RecordsFilter::default()
    }
}

/// Descriptor of a `RecordsQuery`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsQueryDescriptor {
    pub interface: Interface,
    pub method: Method,
    pub message_timestamp: Timestamp,
    pub filter: RecordsFilter,
}

/// Descriptor of a `RecordsDelete`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsDeleteDescriptor {
    pub interface: Interface,
    pub method: Method,
    pub message_timestamp: Timestamp,
    pub record_id: Cid,
}

/// Descriptor of a `ProtocolsConfigure`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolsConfigureDescriptor {
    pub interface: Interface,
    pub method: Method,
    pub message_timestamp: Timestamp,

    /// Protocol URI the definition is configured under.
    pub protocol: String,

    pub definition: ProtocolDefinition,
}

/// Filter of a `ProtocolsQuery`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolsQueryFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// Descriptor of a `ProtocolsQuery`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolsQueryDescriptor {
    pub interface: Interface,
    pub method: Method,
    pub message_timestamp: Timestamp,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<ProtocolsQueryFilter>,
}

/// The reach of a permission grant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionScope {
    pub interface: Interface,
    pub method: Method,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

/// Descriptor of a `PermissionsGrant`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsGrantDescriptor {
    pub interface: Interface,
    pub method: Method,
    pub message_timestamp: Timestamp,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The principal being granted access.
    pub granted_to: Did,

    /// The principal issuing the grant.
    pub granted_by: Did,

    /// The tenant whose data space the grant reaches into.
    pub granted_for: Did,

    pub date_expires: Timestamp,

    pub scope: PermissionScope,
}

/// Descriptor of a `PermissionsRevoke`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsRevokeDescriptor {
    pub interface: Interface,
    pub method: Method,
    pub message_timestamp: Timestamp,

    /// Message CID of the grant being revoked.
    pub permissions_grant_id: Cid,
}

fn expect_interface_method(
    interface: Interface,
    method: Method,
    expected: (Interface, Method),
) -> Result<(), MessageError> {
    if (interface, method) != expected {
        return Err(MessageError::UnexpectedType {
            expected_interface: expected.0,
            expected_method: expected.1,
            interface,
            method,
        });
    }
    Ok(())
}

/// Structural validation of a `RecordsWrite` envelope.
pub fn validate_records_write(
    message: &Message<RecordsWriteDescriptor>,
) -> Result<(), MessageError> {
    let descriptor = &message.descriptor;
    expect_interface_method(
        descriptor.interface,
        descriptor.method,
        (Interface::Records, Method::Write),
    )?;

    if message.record_id.is_none() {
        return Err(MessageError::MissingRecordId);
    }

    match (&descriptor.protocol, &descriptor.protocol_path) {
        (Some(_), Some(path)) => {
            if path.is_empty() || path.split('/').any(str::is_empty) {
                return Err(MessageError::MalformedProtocolPath(path.clone()));
            }
            if message.context_id.is_none() {
                return Err(MessageError::MissingContextId);
            }
        }
        (None, None) => {
            if descriptor.parent_id.is_some() {
                return Err(MessageError::ParentWithoutProtocol);
            }
            if message.context_id.is_some() {
                return Err(MessageError::ContextWithoutProtocol);
            }
        }
        _ => return Err(MessageError::IncompleteProtocolFields),
    }

    Ok(())
}

/// Structural validation of a `ProtocolsConfigure` envelope.
pub fn validate_protocols_configure(
    message: &Message<ProtocolsConfigureDescriptor>,
) -> Result<(), MessageError> {
    let descriptor = &message.descriptor;
    expect_interface_method(
        descriptor.interface,
        descriptor.method,
        (Interface::Protocols, Method::Configure),
    )?;

    if descriptor.protocol.is_empty() {
        return Err(MessageError::EmptyProtocolUri);
    }

    Ok(())
}

/// Structural validation of a `PermissionsGrant` envelope.
pub fn validate_permissions_grant(
    message: &Message<PermissionsGrantDescriptor>,
) -> Result<(), MessageError> {
    let descriptor = &message.descriptor;
    expect_interface_method(
        descriptor.interface,
        descriptor.method,
        (Interface::Permissions, Method::Grant),
    )?;

    if descriptor.date_expires <= descriptor.message_timestamp {
        return Err(MessageError::GrantExpiresBeforeIssued);
    }

    Ok(())
}

/// Structural validation of a `PermissionsRevoke` envelope.
pub fn validate_permissions_revoke(
    message: &Message<PermissionsRevokeDescriptor>,
) -> Result<(), MessageError> {
    let descriptor = &message.descriptor;
    expect_interface_method(
        descriptor.interface,
        descriptor.method,
        (Interface::Permissions, Method::Revoke),
    )
}

/// Error types for structural message validation.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error(
        "descriptor declares {interface} {method}, expected {expected_interface} {expected_method}"
    )]
    UnexpectedType {
        expected_interface: Interface,
        expected_method: Method,
        interface: Interface,
        method: Method,
    },

    #[error("records message carries no recordId")]
    MissingRecordId,

    #[error("protocol and protocolPath must be declared together")]
    IncompleteProtocolFields,

    #[error("malformed protocolPath \"{0}\"")]
    MalformedProtocolPath(String),

    #[error("protocol records must carry a contextId")]
    MissingContextId,

    #[error("parentId declared without a protocol")]
    ParentWithoutProtocol,

    #[error("contextId declared without a protocol")]
    ContextWithoutProtocol,

    #[error("protocol uri must not be empty")]
    EmptyProtocolUri,

    #[error("grant dateExpires must be later than its messageTimestamp")]
    GrantExpiresBeforeIssued,
}
