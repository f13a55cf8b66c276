// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol-based authorization.
//!
//! Decides whether a requester may write or read a protocol record. The
//! decision is a pure function of the tenant, the incoming message, the
//! requester and message-store state: the record's ancestor chain is walked
//! back to the protocol root, the declared protocol path is checked against
//! it, and the rule set at that path is evaluated. Access is the union of
//! all matching allow rules, not the most specific one.
use std::collections::HashSet;

use dwn_core::{
    Cid, Did, Message, ProtocolAction, ProtocolActor, ProtocolDefinition, ProtocolRuleSet,
    entry_id,
    message::{ProtocolsConfigureDescriptor, RecordsWriteDescriptor},
};
use dwn_store::{Filter, FilterValue, MessageStore, StoredMessage};
use thiserror::Error;
use tracing::debug;

use crate::handlers::{newest, stored_order_key};

/// One link of a record's ancestor chain, root-first.
struct ChainEntry {
    protocol_path: String,
    author: Did,
    recipient: Option<Did>,
}

/// Authorize an incoming write of a protocol record.
pub(crate) async fn authorize_write<S: MessageStore>(
    tenant: &Did,
    message: &Message<RecordsWriteDescriptor>,
    author: &Did,
    store: &S,
) -> Result<(), AuthorizationError> {
    let descriptor = &message.descriptor;
    let (Some(protocol), Some(declared_path)) = (&descriptor.protocol, &descriptor.protocol_path)
    else {
        return Err(AuthorizationError::Malformed(
            "write carries no protocol declaration".to_string(),
        ));
    };

    let chain = ancestor_chain(
        tenant,
        ChainEntry {
            protocol_path: declared_path.clone(),
            author: author.clone(),
            recipient: descriptor.recipient.clone(),
        },
        protocol,
        message.context_id,
        descriptor.parent_id,
        store,
    )
    .await?;

    let definition = protocol_definition(tenant, protocol, store).await?;

    // The declared path must retrace the ancestor chain and end in a
    // declared record definition.
    let ancestors = &chain[..chain.len() - 1];
    let record_type = declared_path
        .rsplit('/')
        .next()
        .expect("split yields at least one segment");
    let expected_path = ancestors
        .iter()
        .map(|entry| terminal_segment(&entry.protocol_path))
        .chain([record_type])
        .collect::<Vec<_>>()
        .join("/");
    if *declared_path != expected_path {
        return Err(AuthorizationError::IncorrectProtocolPath {
            declared: declared_path.clone(),
            expected: expected_path,
        });
    }

    let record_definition = definition
        .record_definition(record_type)
        .ok_or_else(|| AuthorizationError::InvalidRecordDefinition(record_type.to_string()))?;

    let rule_set = definition
        .rule_set(declared_path)
        .ok_or_else(|| AuthorizationError::MissingRuleSet(declared_path.clone()))?;

    if let Some(schema) = &record_definition.schema {
        if descriptor.schema.as_ref() != Some(schema) {
            return Err(AuthorizationError::InvalidSchema {
                declared: descriptor.schema.clone().unwrap_or_default(),
                expected: schema.clone(),
            });
        }
    }
    if let Some(data_formats) = &record_definition.data_formats {
        if !data_formats.contains(&descriptor.data_format) {
            return Err(AuthorizationError::InvalidDataFormat {
                declared: descriptor.data_format.clone(),
            });
        }
    }

    evaluate_rules(rule_set, &chain, author, ProtocolAction::Write, tenant)?;

    verify_author_matches_initial(tenant, message, author, store).await
}

/// Authorize a read of a protocol record through its newest write.
pub(crate) async fn authorize_read<S: MessageStore>(
    tenant: &Did,
    newest_write: &Message<RecordsWriteDescriptor>,
    newest_author: &Did,
    requester: &Did,
    store: &S,
) -> Result<(), AuthorizationError> {
    let descriptor = &newest_write.descriptor;
    let (Some(protocol), Some(protocol_path)) = (&descriptor.protocol, &descriptor.protocol_path)
    else {
        return Err(AuthorizationError::Malformed(
            "stored write carries no protocol declaration".to_string(),
        ));
    };

    let chain = ancestor_chain(
        tenant,
        ChainEntry {
            protocol_path: protocol_path.clone(),
            author: newest_author.clone(),
            recipient: descriptor.recipient.clone(),
        },
        protocol,
        newest_write.context_id,
        descriptor.parent_id,
        store,
    )
    .await?;

    let definition = protocol_definition(tenant, protocol, store).await?;
    let rule_set = definition
        .rule_set(protocol_path)
        .ok_or_else(|| AuthorizationError::MissingRuleSet(protocol_path.clone()))?;

    evaluate_rules(rule_set, &chain, requester, ProtocolAction::Read, tenant)
}

/// Walk `parentId` links back to the protocol root. Returns the chain
/// root-first, ending in the target entry.
async fn ancestor_chain<S: MessageStore>(
    tenant: &Did,
    target: ChainEntry,
    protocol: &str,
    context_id: Option<Cid>,
    parent_id: Option<Cid>,
    store: &S,
) -> Result<Vec<ChainEntry>, AuthorizationError> {
    let mut chain = vec![target];
    let mut parent = parent_id;

    while let Some(parent_id) = parent {
        let stored = newest_write_for(tenant, protocol, context_id, parent_id, store)
            .await?
            .ok_or(AuthorizationError::AncestorMissing(parent_id))?;

        let message: Message<RecordsWriteDescriptor> =
            Message::from_value(stored.message.clone())
                .map_err(|err| AuthorizationError::Malformed(err.to_string()))?;
        let descriptor = message.descriptor;

        chain.push(ChainEntry {
            protocol_path: descriptor.protocol_path.ok_or_else(|| {
                AuthorizationError::Malformed("stored ancestor carries no protocolPath".to_string())
            })?,
            author: stored_author(&stored)?,
            recipient: descriptor.recipient,
        });

        parent = descriptor.parent_id;
    }

    chain.reverse();
    Ok(chain)
}

/// The newest `RecordsWrite` of a record, scoped to a protocol context.
async fn newest_write_for<S: MessageStore>(
    tenant: &Did,
    protocol: &str,
    context_id: Option<Cid>,
    record_id: Cid,
    store: &S,
) -> Result<Option<StoredMessage>, AuthorizationError> {
    let mut filter = Filter::new();
    filter.insert("interface".to_string(), FilterValue::from("Records"));
    filter.insert("method".to_string(), FilterValue::from("Write"));
    filter.insert("protocol".to_string(), FilterValue::from(protocol));
    filter.insert(
        "recordId".to_string(),
        FilterValue::from(record_id.to_string()),
    );
    if let Some(context_id) = context_id {
        filter.insert(
            "contextId".to_string(),
            FilterValue::from(context_id.to_string()),
        );
    }

    let matches = store
        .query(tenant, &filter)
        .await
        .map_err(|err| AuthorizationError::Store(err.to_string()))?;
    Ok(newest(matches))
}

/// The newest `ProtocolsConfigure` declaring the protocol.
async fn protocol_definition<S: MessageStore>(
    tenant: &Did,
    protocol: &str,
    store: &S,
) -> Result<ProtocolDefinition, AuthorizationError> {
    let mut filter = Filter::new();
    filter.insert("interface".to_string(), FilterValue::from("Protocols"));
    filter.insert("method".to_string(), FilterValue::from("Configure"));
    filter.insert("protocol".to_string(), FilterValue::from(protocol));

    let matches = store
        .query(tenant, &filter)
        .await
        .map_err(|err| AuthorizationError::Store(err.to_string()))?;
    let stored = newest(matches)
        .ok_or_else(|| AuthorizationError::ProtocolNotFound(protocol.to_string()))?;

    let message: Message<ProtocolsConfigureDescriptor> = Message::from_value(stored.message)
        .map_err(|err| AuthorizationError::Malformed(err.to_string()))?;
    Ok(message.descriptor.definition)
}

/// Union the actions of all matching allow rules and require the needed one.
fn evaluate_rules(
    rule_set: &ProtocolRuleSet,
    chain: &[ChainEntry],
    requester: &Did,
    required: ProtocolAction,
    tenant: &Did,
) -> Result<(), AuthorizationError> {
    let Some(rules) = &rule_set.allow else {
        // No allow list: the data belongs to the tenant alone.
        if requester == tenant {
            return Ok(());
        }
        return Err(AuthorizationError::UnauthorizedNoAllowRule);
    };

    let mut allowed: HashSet<ProtocolAction> = HashSet::new();
    for rule in rules {
        let granted = match rule.actor {
            ProtocolActor::Anyone => true,
            ProtocolActor::Author => ancestor_at(chain, rule.protocol_path.as_deref())
                .is_some_and(|entry| &entry.author == requester),
            ProtocolActor::Recipient => ancestor_at(chain, rule.protocol_path.as_deref())
                .is_some_and(|entry| entry.recipient.as_ref() == Some(requester)),
        };
        if granted {
            allowed.extend(rule.actions.iter().copied());
        }
    }

    if allowed.contains(&required) {
        return Ok(());
    }

    debug!(%requester, ?required, "no allow rule grants the required action");
    Err(AuthorizationError::ActionNotAllowed {
        requester: requester.clone(),
        action: required,
    })
}

fn ancestor_at<'a>(chain: &'a [ChainEntry], path: Option<&str>) -> Option<&'a ChainEntry> {
    let path = path?;
    chain.iter().find(|entry| entry.protocol_path == path)
}

/// Every non-initial write must come from the author of the initial write.
async fn verify_author_matches_initial<S: MessageStore>(
    tenant: &Did,
    message: &Message<RecordsWriteDescriptor>,
    author: &Did,
    store: &S,
) -> Result<(), AuthorizationError> {
    let Some(record_id) = message.record_id else {
        return Err(AuthorizationError::Malformed(
            "write carries no recordId".to_string(),
        ));
    };

    let derived = entry_id(&message.descriptor, tenant)
        .map_err(|err| AuthorizationError::Malformed(err.to_string()))?;
    if derived == record_id {
        return Ok(());
    }

    let mut filter = Filter::new();
    filter.insert("interface".to_string(), FilterValue::from("Records"));
    filter.insert("method".to_string(), FilterValue::from("Write"));
    filter.insert(
        "recordId".to_string(),
        FilterValue::from(record_id.to_string()),
    );

    let matches = store
        .query(tenant, &filter)
        .await
        .map_err(|err| AuthorizationError::Store(err.to_string()))?;
    let record_id_text = record_id.to_string();
    let initial = matches
        .iter()
        .filter(|stored| {
            stored.indexes.get("entryId").map(String::as_str) == Some(record_id_text.as_str())
        })
        .max_by_key(|stored| stored_order_key(stored))
        .ok_or(AuthorizationError::InitialWriteMissing(record_id))?;

    if &stored_author(initial)? != author {
        return Err(AuthorizationError::AuthorMismatch);
    }

    Ok(())
}

fn stored_author(stored: &StoredMessage) -> Result<Did, AuthorizationError> {
    stored
        .indexes
        .get("author")
        .map(|author| Did::new(author.clone()))
        .ok_or_else(|| AuthorizationError::Malformed("stored message has no author index".to_string()))
}

fn terminal_segment(path: &str) -> &str {
    path.rsplit('/').next().expect("split yields at least one segment")
}

/// Error types for protocol authorization.
#[derive(Debug, Error)]
pub enum AuthorizationError {
    /// An ancestor referenced by `parentId` is not held by the store.
    #[error("ProtocolAuthorizationAncestorMissing: could not find ancestor record {0}")]
    AncestorMissing(Cid),

    /// No `ProtocolsConfigure` is stored for the declared protocol URI.
    #[error("ProtocolAuthorizationProtocolNotFound: could not find protocol definition {0}")]
    ProtocolNotFound(String),

    /// The declared path does not retrace the ancestor chain.
    #[error(
        "ProtocolAuthorizationIncorrectProtocolPath: declared \"{declared}\", expected \"{expected}\""
    )]
    IncorrectProtocolPath { declared: String, expected: String },

    /// The claimed record type is not declared by the protocol.
    #[error("ProtocolAuthorizationInvalidRecordDefinition: \"{0}\" is not declared by the protocol")]
    InvalidRecordDefinition(String),

    /// No rule set exists at the declared path.
    #[error("ProtocolAuthorizationMissingRuleSet: no rule set at \"{0}\"")]
    MissingRuleSet(String),

    /// The record definition fixes a different schema.
    #[error(
        "ProtocolAuthorizationInvalidSchema: write declares schema \"{declared}\", record definition fixes \"{expected}\""
    )]
    InvalidSchema { declared: String, expected: String },

    /// The record definition does not admit the declared data format.
    #[error("ProtocolAuthorizationInvalidDataFormat: \"{declared}\" is not an allowed data format")]
    InvalidDataFormat { declared: String },

    /// The rule set has no allow list and the requester is not the tenant.
    #[error("ProtocolAuthorizationUnauthorizedNoAllowRule: no allow rule covers the requester")]
    UnauthorizedNoAllowRule,

    /// No matching allow rule grants the required action.
    #[error("ProtocolAuthorizationActionNotAllowed: {requester} may not {action:?}")]
    ActionNotAllowed {
        requester: Did,
        action: ProtocolAction,
    },

    /// A non-initial write from a different author than the initial write.
    #[error("ProtocolAuthorizationAuthorMismatch: author does not match the initial record author")]
    AuthorMismatch,

    /// A non-initial write targeting a record with no stored initial write.
    #[error("ProtocolAuthorizationInitialWriteMissing: record {0} has no initial write")]
    InitialWriteMissing(Cid),

    /// Stored state failed to decode; the store holds data this engine did
    /// not write.
    #[error("malformed stored state: {0}")]
    Malformed(String),

    /// Underlying store I/O failed.
    #[error("store failure: {0}")]
    Store(String),
}

impl AuthorizationError {
    /// References under the caller's control map to 400, denials to 401 and
    /// engine-internal inconsistencies to 500.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthorizationError::AncestorMissing(_)
            | AuthorizationError::ProtocolNotFound(_)
            | AuthorizationError::InitialWriteMissing(_) => 400,
            AuthorizationError::Malformed(_) | AuthorizationError::Store(_) => 500,
            _ => 401,
        }
    }
}
