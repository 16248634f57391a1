//! Per-session change tracking.
//!
//! The tracker holds one entry per node that an attach, add or delete has
//! touched since the last save. It never reads storage itself; the
//! reconciler fills it and [`ChangeTracker::change_set`] turns it into
//! writes.

use crate::row::{ChangeSet, CollectionDelta, RowInsert, RowUpdate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use unitwork_model::Properties;
use unitwork_types::NodeKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryState {
    Added,
    Unchanged,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEntry {
    pub node: NodeKey,
    state: EntryState,
    /// The persisted row when the node was attached.
    pub original: Option<Properties>,
    pub current: Properties,
    /// Scalar properties flagged as modified.
    pub modified: BTreeSet<String>,
    /// References to write. For added rows these are all of them.
    pub references: BTreeMap<String, Option<NodeKey>>,
    /// Collection membership changes. For added rows `added` holds every
    /// member.
    pub collections: BTreeMap<String, CollectionDelta>,
}

impl TrackedEntry {
    pub fn added(node: NodeKey, current: Properties) -> Self {
        Self::with_state(node, EntryState::Added, None, current)
    }

    pub fn unchanged(node: NodeKey, original: Properties, current: Properties) -> Self {
        Self::with_state(node, EntryState::Unchanged, Some(original), current)
    }

    pub fn deleted(node: NodeKey) -> Self {
        Self::with_state(node, EntryState::Deleted, None, Properties::new())
    }

    fn with_state(node: NodeKey, state: EntryState, original: Option<Properties>, current: Properties) -> Self {
        Self {
            node,
            state,
            original,
            current,
            modified: BTreeSet::new(),
            references: BTreeMap::new(),
            collections: BTreeMap::new(),
        }
    }

    /// The effective state: an unchanged entry with flagged changes reports
    /// as `Modified`.
    pub fn state(&self) -> EntryState {
        match self.state {
            EntryState::Unchanged if self.has_changes() => EntryState::Modified,
            state => state,
        }
    }

    pub fn is_added(&self) -> bool {
        self.state == EntryState::Added
    }

    /// True when the entry produces a write.
    pub fn has_changes(&self) -> bool {
        match self.state {
            EntryState::Added | EntryState::Deleted => true,
            _ => {
                !self.modified.is_empty()
                    || !self.references.is_empty()
                    || self.collections.values().any(|d| !d.is_empty())
            }
        }
    }

    pub fn mark_modified(&mut self, property: &str) {
        self.modified.insert(property.to_string());
    }

    pub fn set_reference(&mut self, property: &str, target: Option<NodeKey>) {
        self.references.insert(property.to_string(), target);
    }

    pub fn collection_mut(&mut self, property: &str) -> &mut CollectionDelta {
        self.collections.entry(property.to_string()).or_default()
    }

    fn to_insert(&self) -> RowInsert {
        RowInsert {
            node: self.node.clone(),
            scalars: self.current.clone(),
            references: self
                .references
                .iter()
                .filter_map(|(name, target)| target.clone().map(|t| (name.clone(), t)))
                .collect(),
            collections: self
                .collections
                .iter()
                .map(|(name, delta)| (name.clone(), delta.added.clone()))
                .collect(),
        }
    }

    fn to_update(&self) -> RowUpdate {
        let mut scalars = Properties::new();
        for name in &self.modified {
            scalars.set(name.clone(), self.current.value(name).clone());
        }
        RowUpdate {
            node: self.node.clone(),
            scalars,
            references: self.references.clone(),
            collections: self
                .collections
                .iter()
                .filter(|(_, delta)| !delta.is_empty())
                .map(|(name, delta)| (name.clone(), delta.clone()))
                .collect(),
        }
    }
}

/// Ordered set of tracked entries keyed by node.
#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    entries: Vec<TrackedEntry>,
    index: HashMap<NodeKey, usize>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tracked(&self, node: &NodeKey) -> bool {
        self.index.contains_key(node)
    }

    pub fn get(&self, node: &NodeKey) -> Option<&TrackedEntry> {
        self.index.get(node).map(|&i| &self.entries[i])
    }

    pub fn get_mut(&mut self, node: &NodeKey) -> Option<&mut TrackedEntry> {
        self.index.get(node).map(|&i| &mut self.entries[i])
    }

    /// Tracks `entry`, replacing an existing entry for the same node in
    /// place.
    pub fn track(&mut self, entry: TrackedEntry) {
        match self.index.get(&entry.node) {
            Some(&i) => self.entries[i] = entry,
            None => {
                self.index.insert(entry.node.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    fn remove(&mut self, node: &NodeKey) -> Option<TrackedEntry> {
        let i = self.index.remove(node)?;
        let entry = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(entry)
    }

    /// Marks a node for deletion. Deleting a node added in the same unit of
    /// work just forgets it.
    pub fn mark_deleted(&mut self, node: NodeKey) {
        match self.get(&node).map(TrackedEntry::is_added) {
            Some(true) => {
                self.remove(&node);
            }
            Some(false) => {
                let original = self.get(&node).and_then(|e| e.original.clone());
                let mut entry = TrackedEntry::deleted(node);
                entry.original = original;
                self.track(entry);
            }
            None => self.track(TrackedEntry::deleted(node)),
        }
    }

    pub fn entries(&self) -> &[TrackedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_changes(&self) -> bool {
        self.entries.iter().any(TrackedEntry::has_changes)
    }

    /// The writes implied by every tracked entry, in tracking order.
    pub fn change_set(&self) -> ChangeSet {
        let mut changes = ChangeSet::default();
        for entry in &self.entries {
            match entry.state() {
                EntryState::Added => changes.inserts.push(entry.to_insert()),
                EntryState::Modified => changes.updates.push(entry.to_update()),
                EntryState::Deleted => changes.deletes.push(entry.node.clone()),
                EntryState::Unchanged => {}
            }
        }
        changes
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}
