// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core data types for Decentralized Web Node (DWN) messages.
//!
//! A DWN message is a content-addressed, signed envelope carrying a typed
//! descriptor. This crate provides the building blocks shared by every store
//! and processing layer:
//!
//! - [`Cid`]: CIDv1 content identifiers over canonical CBOR or raw bytes.
//! - [`cbor`]: deterministic CBOR encoding with sorted map keys.
//! - [`PrivateKey`] / [`PublicKey`]: ed25519 signing identities.
//! - [`Did`] and [`DidResolver`]: decentralized identifiers and the narrow
//!   resolution interface the engine consumes.
//! - [`Jws`]: the flattened general JWS used as a message authorization block.
//! - [`Message`] and the per-method descriptor types.
//! - [`ProtocolDefinition`]: the rule tree declared by `ProtocolsConfigure`.

pub mod builder;
pub mod cbor;
pub mod cid;
pub mod did;
pub mod identity;
pub mod jws;
pub mod message;
pub mod protocol;
mod serde;
pub mod time;

pub use cid::{Cid, CidError};
pub use did::{Did, DidDocument, DidResolver, KeyResolver, ResolverError, VerificationMethod};
pub use identity::{IdentityError, PrivateKey, PublicKey, Signature};
pub use jws::{AuthorizationPayload, Jws, JwsError, JwsSignature};
pub use message::{
    Interface, Message, MessageError, Method, entry_id, message_cid, validate_permissions_grant,
    validate_permissions_revoke, validate_protocols_configure, validate_records_write,
};
pub use protocol::{
    ProtocolAction, ProtocolActor, ProtocolAllowRule, ProtocolDefinition, ProtocolDefinitionError,
    ProtocolLimits, ProtocolRuleSet, RecordDefinition,
};
pub use time::{Timestamp, TimestampError};
