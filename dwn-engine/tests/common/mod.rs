// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixtures for engine integration tests.
use dwn_core::{Did, DidDocument, KeyResolver, PrivateKey, VerificationMethod};
use dwn_engine::Dwn;
use dwn_store::{MemoryDataStore, MemoryEventLog, MemoryMessageStore};

pub type TestDwn = Dwn<MemoryMessageStore, MemoryDataStore, MemoryEventLog, KeyResolver>;

pub struct Actor {
    pub did: Did,
    pub kid: String,
    pub key: PrivateKey,
}

/// A fresh principal with one registered signing key.
pub fn actor(resolver: &KeyResolver, name: &str) -> Actor {
    let did = Did::new(format!("did:example:{name}"));
    let key = PrivateKey::new();
    let kid = resolver.register_key(&did, key.public_key());
    Actor { did, kid, key }
}

/// A fresh principal controlling two signing keys, for scenarios that need
/// distinct message CIDs over identical descriptors.
#[allow(dead_code)]
pub fn actor_with_two_keys(resolver: &KeyResolver, name: &str) -> (Actor, Actor) {
    let did = Did::new(format!("did:example:{name}"));
    let first = PrivateKey::new();
    let second = PrivateKey::new();

    resolver.register(DidDocument {
        id: did.clone(),
        verification_methods: vec![
            VerificationMethod {
                id: format!("{did}#key-1"),
                public_key: first.public_key(),
            },
            VerificationMethod {
                id: format!("{did}#key-2"),
                public_key: second.public_key(),
            },
        ],
    });

    (
        Actor {
            did: did.clone(),
            kid: format!("{did}#key-1"),
            key: first,
        },
        Actor {
            kid: format!("{did}#key-2"),
            did,
            key: second,
        },
    )
}

pub fn engine() -> (TestDwn, KeyResolver) {
    let resolver = KeyResolver::new();
    (Dwn::in_memory(resolver.clone()), resolver)
}
