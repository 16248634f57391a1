//! What the client originally saw.
//!
//! Built from the caller's base snapshot before an attach, so the
//! reconciler can tell "the client removed this" from "the client never
//! loaded this".

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use unitwork_model::GraphNode;
use unitwork_types::{KeyValue, NodeKey};

/// One relation observed in the base snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityReference {
    pub parent: NodeKey,
    pub child: NodeKey,
    pub property: String,
}

#[derive(Debug, Clone, Default)]
pub struct KnownReferences {
    relations: HashSet<EntityReference>,
    references: HashMap<(NodeKey, String), NodeKey>,
    /// Observed collections (empty ones included) with their ordered keys.
    collections: HashMap<(NodeKey, String), Vec<KeyValue>>,
}

impl KnownReferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walks `base` recursively: references first, then every element of
    /// every loaded collection. Nodes without a key were never persisted
    /// and contribute nothing.
    pub fn from_base(base: &dyn GraphNode) -> Self {
        let mut known = Self::new();
        let mut visited = HashSet::new();
        known.walk(base, &mut visited);
        debug!(
            "Known references from base {}: {} relation(s), {} collection(s)",
            base.node_key(),
            known.relations.len(),
            known.collections.len()
        );
        known
    }

    fn walk(&mut self, node: &dyn GraphNode, visited: &mut HashSet<NodeKey>) {
        if node.key().is_unset() {
            return;
        }
        let parent = node.node_key();
        if !visited.insert(parent.clone()) {
            return;
        }
        for reference in node.references() {
            let Some(target) = reference.target else { continue };
            if target.key().is_unset() {
                continue;
            }
            self.record_reference(parent.clone(), reference.name, target.node_key());
            self.walk(target, visited);
        }
        for collection in node.collections() {
            let Some(items) = collection.items else { continue };
            let keys: Vec<KeyValue> = items.iter().map(|i| i.key()).collect();
            self.observe_collection(parent.clone(), collection.name, keys);
            for item in items {
                if item.key().is_unset() {
                    continue;
                }
                self.relations.insert(EntityReference {
                    parent: parent.clone(),
                    child: item.node_key(),
                    property: collection.name.to_string(),
                });
                self.walk(item, visited);
            }
        }
    }

    /// Records that `parent.property` pointed at `child`.
    pub fn record_reference(&mut self, parent: NodeKey, property: &str, child: NodeKey) {
        self.references
            .insert((parent.clone(), property.to_string()), child.clone());
        self.relations.insert(EntityReference {
            parent,
            child,
            property: property.to_string(),
        });
    }

    /// Records that the client loaded `parent.property` with these members.
    pub fn observe_collection(&mut self, parent: NodeKey, property: &str, keys: Vec<KeyValue>) {
        self.collections.insert((parent, property.to_string()), keys);
    }

    /// The target the client saw in `parent.property`, if any.
    pub fn reference(&self, parent: &NodeKey, property: &str) -> Option<&NodeKey> {
        self.references.get(&(parent.clone(), property.to_string()))
    }

    /// The ordered member keys of `parent.property`, when the client loaded
    /// that collection.
    pub fn observed(&self, parent: &NodeKey, property: &str) -> Option<&[KeyValue]> {
        self.collections
            .get(&(parent.clone(), property.to_string()))
            .map(Vec::as_slice)
    }

    pub fn contains(&self, relation: &EntityReference) -> bool {
        self.relations.contains(relation)
    }

    pub fn relations(&self) -> impl Iterator<Item = &EntityReference> {
        self.relations.iter()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty() && self.collections.is_empty()
    }
}
