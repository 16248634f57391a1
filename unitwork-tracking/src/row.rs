//! The row vocabulary shared by the tracker and the stores.
//!
//! A persisted entity is a row of scalar values plus named links: single
//! references and ordered collection memberships. Writes travel as one
//! [`ChangeSet`] per save.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use unitwork_model::Properties;
use unitwork_types::NodeKey;

/// One persisted row: its identity and scalar values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub node: NodeKey,
    pub scalars: Properties,
}

/// How a navigation is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Reference,
    Collection,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Collection => "collection",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reference" => Some(Self::Reference),
            "collection" => Some(Self::Collection),
            _ => None,
        }
    }
}

/// Membership changes of one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDelta {
    pub added: Vec<NodeKey>,
    pub removed: Vec<NodeKey>,
}

impl CollectionDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Adds `member` unless it is already listed.
    pub fn add(&mut self, member: NodeKey) {
        self.removed.retain(|m| *m != member);
        if !self.added.contains(&member) {
            self.added.push(member);
        }
    }
}

/// A new row with all its links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowInsert {
    pub node: NodeKey,
    pub scalars: Properties,
    pub references: BTreeMap<String, NodeKey>,
    pub collections: BTreeMap<String, Vec<NodeKey>>,
}

/// A partial update of an existing row. Only listed values are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowUpdate {
    pub node: NodeKey,
    pub scalars: Properties,
    /// `None` clears the reference.
    pub references: BTreeMap<String, Option<NodeKey>>,
    pub collections: BTreeMap<String, CollectionDelta>,
}

impl RowUpdate {
    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty() && self.references.is_empty() && self.collections.values().all(|d| d.is_empty())
    }
}

/// Everything one save writes. Stores apply it atomically: inserts, then
/// updates, then deletes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub inserts: Vec<RowInsert>,
    pub updates: Vec<RowUpdate>,
    pub deletes: Vec<NodeKey>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserts.len() + self.updates.len() + self.deletes.len()
    }
}
