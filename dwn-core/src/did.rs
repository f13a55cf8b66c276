// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decentralized identifiers and the resolution interface.
//!
//! The engine treats DIDs as opaque principal names. It never interprets a
//! DID method; everything it needs, the verification keys behind a `kid`,
//! comes from a [`DidResolver`]. Hosts plug in whatever resolution stack
//! they run. [`KeyResolver`] is an in-memory implementation for embedded
//! use and tests.
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::PublicKey;

/// A decentralized identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Did {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Did").field(&self.0).finish()
    }
}

/// A key a DID controller uses to sign messages, referenced by `kid`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationMethod {
    /// Fully qualified key id, `<did>#<fragment>`.
    pub id: String,
    pub public_key: PublicKey,
}

/// The resolved document of a DID.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidDocument {
    pub id: Did,
    pub verification_methods: Vec<VerificationMethod>,
}

impl DidDocument {
    /// Look up a verification method by its fully qualified key id.
    pub fn verification_method(&self, kid: &str) -> Option<&VerificationMethod> {
        self.verification_methods
            .iter()
            .find(|method| method.id == kid)
    }
}

/// Resolves a DID to its document.
///
/// Implementations must return the verification methods needed to check a
/// signature's `kid`. The resolver is shared across tenants and handlers and
/// is treated as read-only by the engine.
pub trait DidResolver: Clone {
    fn resolve(&self, did: &Did) -> impl Future<Output = Result<DidDocument, ResolverError>>;
}

/// Error types for DID resolution.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// No document is known for the DID.
    #[error("could not resolve {0}")]
    NotFound(Did),

    /// The resolution backend failed.
    #[error("resolver failure: {0}")]
    Backend(String),
}

/// An in-memory DID resolver backed by registered documents.
#[derive(Clone, Debug, Default)]
pub struct KeyResolver {
    documents: Arc<RwLock<HashMap<Did, DidDocument>>>,
}

impl KeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document, replacing any previous document for the DID.
    pub fn register(&self, document: DidDocument) {
        self.documents
            .write()
            .expect("acquire exclusive write access on resolver")
            .insert(document.id.clone(), document);
    }

    /// Register a DID controlled by a single key and return the key id to
    /// sign with.
    pub fn register_key(&self, did: &Did, public_key: PublicKey) -> String {
        let kid = format!("{did}#key-1");
        self.register(DidDocument {
            id: did.clone(),
            verification_methods: vec![VerificationMethod {
                id: kid.clone(),
                public_key,
            }],
        });
        kid
    }
}

impl DidResolver for KeyResolver {
    async fn resolve(&self, did: &Did) -> Result<DidDocument, ResolverError> {
        self.documents
            .read()
            .expect("acquire shared read access on resolver")
            .get(did)
            .cloned()
            .ok_or_else(|| ResolverError::NotFound(did.clone()))
    }
}
