// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message-processing engine for a Decentralized Web Node.
//!
//! The engine ingests signed, content-addressed messages from identified
//! principals, authenticates and authorizes them against protocol-defined
//! rules, reconciles them against prior state deterministically and
//! idempotently, and persists the resulting transitions to the injected
//! stores.
//!
//! Everything is reachable from a single entry point,
//! [`Dwn::process_message`]. Messages of the same tenant are serialized
//! through a per-tenant lock; the outcome of processing is a [`Reply`] with
//! an HTTP-aligned status.
//!
//! ## Example
//!
//! ```
//! use dwn_core::builder::RecordsWriteBuilder;
//! use dwn_core::{Did, KeyResolver, PrivateKey};
//! use dwn_engine::Dwn;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let resolver = KeyResolver::new();
//! let alice = Did::new("did:example:alice");
//! let key = PrivateKey::new();
//! let kid = resolver.register_key(&alice, key.public_key());
//!
//! let dwn = Dwn::in_memory(resolver);
//! let message = RecordsWriteBuilder::new()
//!     .data(b"hello".to_vec())
//!     .data_format("text/plain")
//!     .sign(&alice, &kid, &key)
//!     .unwrap();
//!
//! let reply = dwn
//!     .process_message(&alice, message.to_value().unwrap())
//!     .await;
//! assert_eq!(reply.status.code, 202);
//! # });
//! ```

mod authenticate;
mod authorize;
mod engine;
mod error;
mod handlers;
mod reply;
mod tenant;

pub use authorize::AuthorizationError;
pub use engine::Dwn;
pub use error::ProcessError;
pub use reply::{Reply, Status};
