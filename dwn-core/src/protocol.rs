// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol definitions.
//!
//! A `ProtocolsConfigure` message declares a finite tree of rule sets. Each
//! node names the record definition written at that position of the tree and
//! the actors allowed to act on it; the nested `records` map declares the
//! children. Records later claim a position in the tree through their
//! `protocolPath`.
//!
//! Definitions are validated once, at configure time. Query-time traversal
//! can then assume a well-formed tree.
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The actor classes an allow rule can address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolActor {
    /// Any authenticated principal.
    Anyone,

    /// The author of the ancestor record the rule points at.
    Author,

    /// The recipient of the ancestor record the rule points at.
    Recipient,
}

/// The actions an allow rule can grant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolAction {
    Read,
    Write,
}

/// Grants `actions` to `actor`, optionally scoped through the ancestor
/// record at `protocol_path`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolAllowRule {
    pub actor: ProtocolActor,
    pub actions: Vec<ProtocolAction>,

    /// Path of the ancestor whose author or recipient is the expected
    /// requester. Required unless the actor is `Anyone`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_path: Option<String>,
}

/// Fixes the shape of the records written under a definition name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDefinition {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_formats: Option<Vec<String>>,
}

/// One node of the protocol tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolRuleSet {
    /// Record definition written at this node. Defaults to the key the node
    /// is stored under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_definition: Option<String>,

    /// Ordered allow rules. Absent means only the tenant may act.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow: Option<Vec<ProtocolAllowRule>>,

    /// Child rule sets by record-definition name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub records: BTreeMap<String, ProtocolRuleSet>,
}

/// The rule tree declared by a `ProtocolsConfigure`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolDefinition {
    pub record_definitions: Vec<RecordDefinition>,

    /// Root rule sets by record-definition name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub records: BTreeMap<String, ProtocolRuleSet>,
}

/// Ingestion-time bounds on the size of a protocol definition.
#[derive(Clone, Copy, Debug)]
pub struct ProtocolLimits {
    pub max_depth: usize,
    pub max_rule_sets: usize,
}

impl Default for ProtocolLimits {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_rule_sets: 100,
        }
    }
}

impl ProtocolDefinition {
    /// Look up a record definition by name.
    pub fn record_definition(&self, name: &str) -> Option<&RecordDefinition> {
        self.record_definitions
            .iter()
            .find(|definition| definition.id == name)
    }

    /// Walk the tree along a `/`-delimited protocol path.
    pub fn rule_set(&self, protocol_path: &str) -> Option<&ProtocolRuleSet> {
        let mut segments = protocol_path.split('/');
        let mut current = self.records.get(segments.next()?)?;
        for segment in segments {
            current = current.records.get(segment)?;
        }
        Some(current)
    }

    /// Validate the definition against the given bounds.
    ///
    /// Runs once when a `ProtocolsConfigure` is ingested so that traversal
    /// at authorization time never has to re-check shape.
    pub fn validate(&self, limits: &ProtocolLimits) -> Result<(), ProtocolDefinitionError> {
        let mut seen = HashSet::new();
        for definition in &self.record_definitions {
            if !seen.insert(definition.id.as_str()) {
                return Err(ProtocolDefinitionError::DuplicateRecordDefinition(
                    definition.id.clone(),
                ));
            }
        }

        let mut rule_sets = 0;
        let mut stack: Vec<(String, &ProtocolRuleSet, usize)> = self
            .records
            .iter()
            .map(|(name, node)| (name.clone(), node, 1))
            .collect();

        while let Some((path, node, depth)) = stack.pop() {
            rule_sets += 1;
            if rule_sets > limits.max_rule_sets {
                return Err(ProtocolDefinitionError::TooManyRuleSets(
                    limits.max_rule_sets,
                ));
            }
            if depth > limits.max_depth {
                return Err(ProtocolDefinitionError::DepthExceeded(limits.max_depth));
            }

            let definition_name = node
                .record_definition
                .as_deref()
                .unwrap_or_else(|| path.rsplit('/').next().expect("path is never empty"));
            if self.record_definition(definition_name).is_none() {
                return Err(ProtocolDefinitionError::UnknownRecordDefinition(
                    definition_name.to_string(),
                ));
            }

            for rule in node.allow.iter().flatten() {
                if rule.actions.is_empty() {
                    return Err(ProtocolDefinitionError::EmptyAllowedActions(path.clone()));
                }
                match (&rule.actor, &rule.protocol_path) {
                    (ProtocolActor::Anyone, Some(_)) => {
                        return Err(ProtocolDefinitionError::AnyoneWithAncestorPath(path));
                    }
                    (ProtocolActor::Anyone, None) => (),
                    (_, None) => {
                        return Err(ProtocolDefinitionError::MissingAncestorPath(path));
                    }
                    (_, Some(rule_path)) => {
                        // The referenced ancestor must lie strictly above
                        // this node on its own branch.
                        if !path.starts_with(&format!("{rule_path}/")) {
                            return Err(ProtocolDefinitionError::InvalidAncestorPath {
                                rule_set: path,
                                ancestor: rule_path.clone(),
                            });
                        }
                    }
                }
            }

            for (name, child) in &node.records {
                stack.push((format!("{path}/{name}"), child, depth + 1));
            }
        }

        Ok(())
    }
}

/// Error types for protocol-definition validation.
#[derive(Debug, Error)]
pub enum ProtocolDefinitionError {
    #[error("record definition \"{0}\" is declared more than once")]
    DuplicateRecordDefinition(String),

    #[error("protocol tree exceeds the maximum depth of {0}")]
    DepthExceeded(usize),

    #[error("protocol tree exceeds the maximum of {0} rule sets")]
    TooManyRuleSets(usize),

    #[error("rule set references undeclared record definition \"{0}\"")]
    UnknownRecordDefinition(String),

    #[error("rule set \"{0}\" declares an allow rule without actions")]
    EmptyAllowedActions(String),

    #[error("rule set \"{0}\" scopes an \"anyone\" rule through an ancestor path")]
    AnyoneWithAncestorPath(String),

    #[error("rule set \"{0}\" declares an actor rule without an ancestor path")]
    MissingAncestorPath(String),

    #[error("rule set \"{rule_set}\" references \"{ancestor}\" which is not one of its ancestors")]
    InvalidAncestorPath { rule_set: String, ancestor: String },
}
