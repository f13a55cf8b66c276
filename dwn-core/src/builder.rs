// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builders for signed message envelopes.
//!
//! Builders assemble a descriptor, derive the record identity where one is
//! called for and sign the authorization payload in one step. They are the
//! only supported way to mint messages; hand-rolled envelopes tend to get
//! the identity derivation wrong.
//!
//! ## Example
//!
//! ```
//! use dwn_core::builder::RecordsWriteBuilder;
//! use dwn_core::{Did, PrivateKey};
//!
//! let tenant = Did::new("did:example:alice");
//! let key = PrivateKey::new();
//!
//! let message = RecordsWriteBuilder::new()
//!     .data(b"hello".to_vec())
//!     .data_format("text/plain")
//!     .sign(&tenant, "did:example:alice#key-1", &key)
//!     .unwrap();
//!
//! assert_eq!(message.record_id, Some(dwn_core::entry_id(&message.descriptor, &tenant).unwrap()));
//! ```
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use thiserror::Error;

use crate::cbor::EncodeError;
use crate::cid::Cid;
use crate::did::Did;
use crate::identity::PrivateKey;
use crate::jws::{AuthorizationPayload, Jws, JwsError};
use crate::message::{
    Interface, Message, Method, PermissionScope, PermissionsGrantDescriptor,
    PermissionsRevokeDescriptor, ProtocolsConfigureDescriptor, ProtocolsQueryDescriptor,
    ProtocolsQueryFilter, RecordsDeleteDescriptor, RecordsFilter, RecordsQueryDescriptor,
    RecordsReadDescriptor, RecordsWriteDescriptor, entry_id,
};
use crate::protocol::ProtocolDefinition;
use crate::time::{Timestamp, TimestampError};

/// Default lifetime of a permission grant when none is given.
const DEFAULT_GRANT_LIFETIME_SECONDS: i64 = 365 * 24 * 60 * 60;

/// Builds a signed `RecordsWrite`.
#[derive(Clone, Debug, Default)]
pub struct RecordsWriteBuilder {
    data: Option<Vec<u8>>,
    data_reference: Option<(Cid, u64)>,
    data_format: Option<String>,
    recipient: Option<Did>,
    protocol: Option<String>,
    protocol_path: Option<String>,
    schema: Option<String>,
    parent_id: Option<Cid>,
    context_id: Option<Cid>,
    record_id: Option<Cid>,
    date_created: Option<Timestamp>,
    message_timestamp: Option<Timestamp>,
}

impl RecordsWriteBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach data; the descriptor's `dataCid` and `dataSize` are derived
    /// from it and the bytes travel in the envelope.
    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    /// Reference data already held by the data store instead of attaching
    /// bytes.
    pub fn data_reference(mut self, data_cid: Cid, data_size: u64) -> Self {
        self.data_reference = Some((data_cid, data_size));
        self
    }

    pub fn data_format(mut self, data_format: impl Into<String>) -> Self {
        self.data_format = Some(data_format.into());
        self
    }

    pub fn recipient(mut self, recipient: Did) -> Self {
        self.recipient = Some(recipient);
        self
    }

    /// Declare the record's position in a protocol tree.
    pub fn protocol(mut self, protocol: impl Into<String>, protocol_path: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self.protocol_path = Some(protocol_path.into());
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Parent record and context for non-root protocol records.
    pub fn parent(mut self, context_id: Cid, parent_id: Cid) -> Self {
        self.context_id = Some(context_id);
        self.parent_id = Some(parent_id);
        self
    }

    /// Target an existing record instead of creating one.
    pub fn record_id(mut self, record_id: Cid) -> Self {
        self.record_id = Some(record_id);
        self
    }

    pub fn context_id(mut self, context_id: Cid) -> Self {
        self.context_id = Some(context_id);
        self
    }

    pub fn date_created(mut self, date_created: Timestamp) -> Self {
        self.date_created = Some(date_created);
        self
    }

    pub fn message_timestamp(mut self, message_timestamp: Timestamp) -> Self {
        self.message_timestamp = Some(message_timestamp);
        self
    }

    /// Build the descriptor, derive the record identity for initial writes
    /// and sign the envelope.
    pub fn sign(
        self,
        tenant: &Did,
        kid: &str,
        key: &PrivateKey,
    ) -> Result<Message<RecordsWriteDescriptor>, BuilderError> {
        let (data_cid, data_size, encoded_data) = match (&self.data, self.data_reference) {
            (Some(data), None) => (
                Cid::of_raw(data),
                data.len() as u64,
                Some(URL_SAFE_NO_PAD.encode(data)),
            ),
            (None, Some((data_cid, data_size))) => (data_cid, data_size, None),
            (None, None) => return Err(BuilderError::MissingField("data")),
            (Some(_), Some(_)) => return Err(BuilderError::ConflictingData),
        };

        let message_timestamp = self.message_timestamp.unwrap_or_else(Timestamp::now);
        let descriptor = RecordsWriteDescriptor {
            interface: Interface::Records,
            method: Method::Write,
            message_timestamp,
            date_created: self.date_created.unwrap_or(message_timestamp),
            data_cid,
            data_size,
            data_format: self
                .data_format
                .unwrap_or_else(|| "application/json".to_string()),
            recipient: self.recipient,
            protocol: self.protocol,
            protocol_path: self.protocol_path,
            schema: self.schema,
            parent_id: self.parent_id,
        };

        let record_id = match self.record_id {
            Some(record_id) => record_id,
            None => entry_id(&descriptor, tenant)?,
        };

        // A protocol root is its own context.
        let context_id = match (&descriptor.protocol, self.context_id) {
            (Some(_), Some(context_id)) => Some(context_id),
            (Some(_), None) => Some(record_id),
            (None, _) => None,
        };

        let mut payload = AuthorizationPayload::new(Cid::of(&descriptor)?);
        payload.record_id = Some(record_id);
        payload.context_id = context_id;

        Ok(Message {
            authorization: Jws::sign(&payload, kid, key)?,
            descriptor,
            record_id: Some(record_id),
            context_id,
            encoded_data,
        })
    }
}

/// Builds a signed `RecordsRead`.
#[derive(Clone, Debug, Default)]
pub struct RecordsReadBuilder {
    record_id: Option<Cid>,
    message_timestamp: Option<Timestamp>,
}

impl RecordsReadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_id(mut self, record_id: Cid) -> Self {
        self.record_id = Some(record_id);
        self
    }

    pub fn message_timestamp(mut self, message_timestamp: Timestamp) -> Self {
        self.message_timestamp = Some(message_timestamp);
        self
    }

    pub fn sign(
        self,
        kid: &str,
        key: &PrivateKey,
    ) -> Result<Message<RecordsReadDescriptor>, BuilderError> {
        let descriptor = RecordsReadDescriptor {
            interface: Interface::Records,
            method: Method::Read,
            message_timestamp: self.message_timestamp.unwrap_or_else(Timestamp::now),
            record_id: self
                .record_id
                .ok_or(BuilderError::MissingField("recordId"))?,
        };

        sign_plain(descriptor, kid, key)
    }
}

/// Builds a signed `RecordsQuery`.
#[derive(Clone, Debug, Default)]
pub struct RecordsQueryBuilder {
    filter: RecordsFilter,
    message_timestamp: Option<Timestamp>,
}

impl RecordsQueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: RecordsFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn message_timestamp(mut self, message_timestamp: Timestamp) -> Self {
        self.message_timestamp = Some(message_timestamp);
        self
    }

    pub fn sign(
        self,
        kid: &str,
        key: &PrivateKey,
    ) -> Result<Message<RecordsQueryDescriptor>, BuilderError> {
        let descriptor = RecordsQueryDescriptor {
            interface: Interface::Records,
            method: Method::Query,
            message_timestamp: self.message_timestamp.unwrap_or_else(Timestamp::now),
            filter: self.filter,
        };

        sign_plain(descriptor, kid, key)
    }
}

/// Builds a signed `RecordsDelete`.
#[derive(Clone, Debug, Default)]
pub struct RecordsDeleteBuilder {
    record_id: Option<Cid>,
    message_timestamp: Option<Timestamp>,
}

impl RecordsDeleteBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_id(mut self, record_id: Cid) -> Self {
        self.record_id = Some(record_id);
        self
    }

    pub fn message_timestamp(mut self, message_timestamp: Timestamp) -> Self {
        self.message_timestamp = Some(message_timestamp);
        self
    }

    pub fn sign(
        self,
        kid: &str,
        key: &PrivateKey,
    ) -> Result<Message<RecordsDeleteDescriptor>, BuilderError> {
        let descriptor = RecordsDeleteDescriptor {
            interface: Interface::Records,
            method: Method::Delete,
            message_timestamp: self.message_timestamp.unwrap_or_else(Timestamp::now),
            record_id: self
                .record_id
                .ok_or(BuilderError::MissingField("recordId"))?,
        };

        sign_plain(descriptor, kid, key)
    }
}

/// Builds a signed `ProtocolsConfigure`.
#[derive(Clone, Debug, Default)]
pub struct ProtocolsConfigureBuilder {
    protocol: Option<String>,
    definition: Option<ProtocolDefinition>,
    message_timestamp: Option<Timestamp>,
}

impl ProtocolsConfigureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn definition(mut self, definition: ProtocolDefinition) -> Self {
        self.definition = Some(definition);
        self
    }

    pub fn message_timestamp(mut self, message_timestamp: Timestamp) -> Self {
        self.message_timestamp = Some(message_timestamp);
        self
    }

    pub fn sign(
        self,
        kid: &str,
        key: &PrivateKey,
    ) -> Result<Message<ProtocolsConfigureDescriptor>, BuilderError> {
        let descriptor = ProtocolsConfigureDescriptor {
            interface: Interface::Protocols,
            method: Method::Configure,
            message_timestamp: self.message_timestamp.unwrap_or_else(Timestamp::now),
            protocol: self
                .protocol
                .ok_or(BuilderError::MissingField("protocol"))?,
            definition: self
                .definition
                .ok_or(BuilderError::MissingField("definition"))?,
        };

        sign_plain(descriptor, kid, key)
    }
}

/// Builds a signed `ProtocolsQuery`.
#[derive(Clone, Debug, Default)]
pub struct ProtocolsQueryBuilder {
    protocol: Option<String>,
    message_timestamp: Option<Timestamp>,
}

impl ProtocolsQueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn message_timestamp(mut self, message_timestamp: Timestamp) -> Self {
        self.message_timestamp = Some(message_timestamp);
        self
    }

    pub fn sign(
        self,
        kid: &str,
        key: &PrivateKey,
    ) -> Result<Message<ProtocolsQueryDescriptor>, BuilderError> {
        let descriptor = ProtocolsQueryDescriptor {
            interface: Interface::Protocols,
            method: Method::Query,
            message_timestamp: self.message_timestamp.unwrap_or_else(Timestamp::now),
            filter: self
                .protocol
                .map(|protocol| ProtocolsQueryFilter {
                    protocol: Some(protocol),
                }),
        };

        sign_plain(descriptor, kid, key)
    }
}

/// Builds a signed `PermissionsGrant`.
#[derive(Clone, Debug, Default)]
pub struct PermissionsGrantBuilder {
    description: Option<String>,
    granted_to: Option<Did>,
    granted_by: Option<Did>,
    granted_for: Option<Did>,
    date_expires: Option<Timestamp>,
    scope: Option<PermissionScope>,
    message_timestamp: Option<Timestamp>,
}

impl PermissionsGrantBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn granted_to(mut self, granted_to: Did) -> Self {
        self.granted_to = Some(granted_to);
        self
    }

    pub fn granted_by(mut self, granted_by: Did) -> Self {
        self.granted_by = Some(granted_by);
        self
    }

    pub fn granted_for(mut self, granted_for: Did) -> Self {
        self.granted_for = Some(granted_for);
        self
    }

    /// Defaults to one year after the message timestamp.
    pub fn date_expires(mut self, date_expires: Timestamp) -> Self {
        self.date_expires = Some(date_expires);
        self
    }

    pub fn scope(mut self, scope: PermissionScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn message_timestamp(mut self, message_timestamp: Timestamp) -> Self {
        self.message_timestamp = Some(message_timestamp);
        self
    }

    pub fn sign(
        self,
        kid: &str,
        key: &PrivateKey,
    ) -> Result<Message<PermissionsGrantDescriptor>, BuilderError> {
        let message_timestamp = self.message_timestamp.unwrap_or_else(Timestamp::now);
        let date_expires = match self.date_expires {
            Some(date_expires) => date_expires,
            None => message_timestamp.plus_seconds(DEFAULT_GRANT_LIFETIME_SECONDS)?,
        };

        let descriptor = PermissionsGrantDescriptor {
            interface: Interface::Permissions,
            method: Method::Grant,
            message_timestamp,
            description: self.description,
            granted_to: self
                .granted_to
                .ok_or(BuilderError::MissingField("grantedTo"))?,
            granted_by: self
                .granted_by
                .ok_or(BuilderError::MissingField("grantedBy"))?,
            granted_for: self
                .granted_for
                .ok_or(BuilderError::MissingField("grantedFor"))?,
            date_expires,
            scope: self.scope.unwrap_or(PermissionScope {
                interface: Interface::Records,
                method: Method::Write,
                protocol: None,
                schema: None,
            }),
        };

        sign_plain(descriptor, kid, key)
    }
}

/// Builds a signed `PermissionsRevoke`.
#[derive(Clone, Debug, Default)]
pub struct PermissionsRevokeBuilder {
    permissions_grant_id: Option<Cid>,
    message_timestamp: Option<Timestamp>,
}

impl PermissionsRevokeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permissions_grant_id(mut self, permissions_grant_id: Cid) -> Self {
        self.permissions_grant_id = Some(permissions_grant_id);
        self
    }

    pub fn message_timestamp(mut self, message_timestamp: Timestamp) -> Self {
        self.message_timestamp = Some(message_timestamp);
        self
    }

    pub fn sign(
        self,
        kid: &str,
        key: &PrivateKey,
    ) -> Result<Message<PermissionsRevokeDescriptor>, BuilderError> {
        let permissions_grant_id = self
            .permissions_grant_id
            .ok_or(BuilderError::MissingField("permissionsGrantId"))?;

        let descriptor = PermissionsRevokeDescriptor {
            interface: Interface::Permissions,
            method: Method::Revoke,
            message_timestamp: self.message_timestamp.unwrap_or_else(Timestamp::now),
            permissions_grant_id,
        };

        let mut payload = AuthorizationPayload::new(Cid::of(&descriptor)?);
        payload.permissions_grant_id = Some(permissions_grant_id);

        Ok(Message {
            authorization: Jws::sign(&payload, kid, key)?,
            descriptor,
            record_id: None,
            context_id: None,
            encoded_data: None,
        })
    }
}

fn sign_plain<D: serde::Serialize>(
    descriptor: D,
    kid: &str,
    key: &PrivateKey,
) -> Result<Message<D>, BuilderError> {
    let payload = AuthorizationPayload::new(Cid::of(&descriptor)?);

    Ok(Message {
        authorization: Jws::sign(&payload, kid, key)?,
        descriptor,
        record_id: None,
        context_id: None,
        encoded_data: None,
    })
}

/// Error types for message builders.
#[derive(Debug, Error)]
pub enum BuilderError {
    /// A required builder field was not set.
    #[error("missing required field \"{0}\"")]
    MissingField(&'static str),

    /// Both attached data and a data reference were given.
    #[error("attached data and a data reference are mutually exclusive")]
    ConflictingData,

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Jws(#[from] JwsError),

    #[error(transparent)]
    Timestamp(#[from] TimestampError),
}

#[cfg(test)]
mod tests {
    use crate::did::Did;
    use crate::identity::PrivateKey;
    use crate::message::{entry_id, validate_records_write};

    use super::{PermissionsRevokeBuilder, RecordsWriteBuilder};

    #[test]
    fn initial_write_derives_record_identity() {
        let tenant = Did::new("did:example:alice");
        let key = PrivateKey::new();

        let message = RecordsWriteBuilder::new()
            .data(b"hello".to_vec())
            .data_format("text/plain")
            .sign(&tenant, "did:example:alice#key-1", &key)
            .unwrap();

        validate_records_write(&message).unwrap();
        assert_eq!(
            message.record_id,
            Some(entry_id(&message.descriptor, &tenant).unwrap())
        );
        assert!(message.context_id.is_none());
    }

    #[test]
    fn protocol_root_is_its_own_context() {
        let tenant = Did::new("did:example:alice");
        let key = PrivateKey::new();

        let message = RecordsWriteBuilder::new()
            .data(b"{}".to_vec())
            .protocol("https://example.com/email", "email")
            .schema("email")
            .sign(&tenant, "did:example:alice#key-1", &key)
            .unwrap();

        validate_records_write(&message).unwrap();
        assert_eq!(message.context_id, message.record_id);
    }

    #[test]
    fn revoke_requires_grant_id() {
        let key = PrivateKey::new();
        let result = PermissionsRevokeBuilder::new().sign("did:example:alice#key-1", &key);
        assert!(result.is_err());
    }
}
