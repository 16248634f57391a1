//! Attach-and-diff for disconnected entity graphs.
//!
//! [`GraphReconciler::attach`] walks an incoming graph breadth-first and
//! records one decision per node in the [`ChangeTracker`]:
//!
//! - an instance whose identity was already seen in this walk, or that is
//!   already tracked by the unit of work, is detached (the root is the
//!   exception: a tracked root is refreshed in place)
//! - otherwise the persisted row is fetched in a single round trip; no row
//!   means `Added`, a row means `Unchanged` with per-scalar modified flags
//!
//! Navigations are reconciled against the [`KnownReferences`] built from
//! the caller's base snapshot. A null reference is only disconnected when
//! the client is known to have seen a value there. A collection is only
//! reconciled when the client observed it, and then only if its ordered
//! keys differ from what was observed; members are compared by identity,
//! so a pure reordering changes nothing.

use crate::known::KnownReferences;
use crate::row::CollectionDelta;
use crate::store::RowStore;
use crate::tracker::{ChangeTracker, TrackedEntry};
use crate::TrackingResult;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::debug;
use unitwork_model::{GraphNode, KeyAssignments, Properties};
use unitwork_types::{KeyValue, NodeKey};
use uuid::Uuid;

/// Whether the root is being added or updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMode {
    /// The root is new; its row is not fetched.
    Add,
    /// The root may or may not be persisted.
    Update,
}

/// What the reconciler decided for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Decision {
    /// Another instance with the same identity is already tracked.
    Detached,
    /// No persisted counterpart.
    Added,
    /// Persisted; `modified` lists scalars that differ from the stored row.
    Unchanged { modified: Vec<String> },
    /// The root was already tracked and its values were replaced.
    Refreshed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDecision {
    pub node: NodeKey,
    pub decision: Decision,
}

/// Outcome of one attach.
#[derive(Debug, Clone, Default)]
pub struct AttachReport {
    pub decisions: Vec<NodeDecision>,
    /// Store calls made during the walk.
    pub round_trips: usize,
    /// Keys minted for nodes that arrived without one.
    pub keys: KeyAssignments,
}

impl AttachReport {
    /// The first decision recorded for `node`.
    pub fn decision(&self, node: &NodeKey) -> Option<&Decision> {
        self.decisions
            .iter()
            .find(|d| d.node == *node)
            .map(|d| &d.decision)
    }

    pub fn count(&self, matches: impl Fn(&Decision) -> bool) -> usize {
        self.decisions.iter().filter(|d| matches(&d.decision)).count()
    }
}

type Queue<'g> = VecDeque<(&'g dyn GraphNode, bool)>;

fn address(node: &dyn GraphNode) -> usize {
    (node as *const dyn GraphNode).cast::<()>() as usize
}

/// Scalars with the key property set to the resolved key.
fn current_scalars(node: &dyn GraphNode, key: &NodeKey) -> Properties {
    let mut scalars = node.scalars();
    scalars.set(node.key_name(), key.key.to_json());
    scalars
}

fn dedup(keys: impl IntoIterator<Item = NodeKey>) -> Vec<NodeKey> {
    let mut out: Vec<NodeKey> = Vec::new();
    for key in keys {
        if !out.contains(&key) {
            out.push(key);
        }
    }
    out
}

pub struct GraphReconciler<'a, S: RowStore + ?Sized> {
    store: &'a S,
    tracker: &'a mut ChangeTracker,
    known: &'a KnownReferences,
    report: AttachReport,
    /// Identity -> address of the instance that claimed it in this walk.
    visited: HashMap<NodeKey, usize>,
    /// Members of collections the client never observed; linked after the
    /// walk if they turn out to be new.
    unobserved: Vec<(NodeKey, &'static str, NodeKey)>,
}

impl<'a, S: RowStore + ?Sized> GraphReconciler<'a, S> {
    pub fn new(store: &'a S, tracker: &'a mut ChangeTracker, known: &'a KnownReferences) -> Self {
        Self {
            store,
            tracker,
            known,
            report: AttachReport::default(),
            visited: HashMap::new(),
            unobserved: Vec::new(),
        }
    }

    pub async fn attach(mut self, root: &dyn GraphNode, mode: AttachMode) -> TrackingResult<AttachReport> {
        let mut queue: Queue<'_> = VecDeque::from([(root, true)]);
        while let Some((node, is_root)) = queue.pop_front() {
            let key = self.resolve(node).await?;
            match self.visited.get(&key) {
                Some(&seen) if seen == address(node) => continue,
                Some(_) => {
                    debug!("Detaching duplicate instance of {}", key);
                    self.decide(&key, Decision::Detached);
                    continue;
                }
                None => {
                    self.visited.insert(key.clone(), address(node));
                }
            }
            if !is_root && self.tracker.is_tracked(&key) {
                debug!("{} is already tracked, detaching", key);
                self.decide(&key, Decision::Detached);
                continue;
            }

            let mut entry = self.entry_for(node, &key, is_root, mode).await?;
            self.reconcile_references(node, &key, &mut entry, &mut queue)
                .await?;
            self.reconcile_collections(node, &key, &mut entry, &mut queue)
                .await?;
            self.tracker.track(entry);
        }
        self.link_unobserved();
        debug!(
            "Attached {} node(s) in {} round trip(s)",
            self.report.decisions.len(),
            self.report.round_trips
        );
        Ok(self.report)
    }

    fn decide(&mut self, node: &NodeKey, decision: Decision) {
        self.report.decisions.push(NodeDecision {
            node: node.clone(),
            decision,
        });
    }

    /// The node's identity, minting a key (once per instance) when unset.
    async fn resolve(&mut self, node: &dyn GraphNode) -> TrackingResult<NodeKey> {
        let key = node.key();
        if !key.is_unset() {
            return Ok(NodeKey::new(node.entity_type(), key));
        }
        if let Some(assigned) = self.report.keys.get(node) {
            return Ok(NodeKey::new(node.entity_type(), assigned.clone()));
        }
        let fresh = match key {
            KeyValue::Int(_) => {
                self.report.round_trips += 1;
                KeyValue::Int(self.store.next_key(node.entity_type()).await?)
            }
            KeyValue::Uuid(_) => KeyValue::Uuid(Uuid::now_v7()),
            KeyValue::Text(_) => KeyValue::Text(Uuid::now_v7().to_string()),
        };
        debug!("Assigned key {} to new {}", fresh, node.entity_type());
        self.report.keys.assign(node, fresh.clone());
        Ok(NodeKey::new(node.entity_type(), fresh))
    }

    async fn entry_for(
        &mut self,
        node: &dyn GraphNode,
        key: &NodeKey,
        is_root: bool,
        mode: AttachMode,
    ) -> TrackingResult<TrackedEntry> {
        let current = current_scalars(node, key);

        if is_root {
            if let Some(previous) = self.tracker.get(key).cloned() {
                let was_added = previous.is_added();
                let mut entry = match previous.original {
                    Some(original) if !was_added => flagged(node.key_name(), key, original, current),
                    _ => TrackedEntry::added(key.clone(), current),
                };
                entry.references = previous.references;
                entry.collections = previous.collections;
                self.decide(key, Decision::Refreshed);
                return Ok(entry);
            }
            if mode == AttachMode::Add {
                self.decide(key, Decision::Added);
                return Ok(TrackedEntry::added(key.clone(), current));
            }
        }

        self.report.round_trips += 1;
        match self.store.fetch(key).await? {
            None => {
                self.decide(key, Decision::Added);
                Ok(TrackedEntry::added(key.clone(), current))
            }
            Some(original) => {
                let entry = flagged(node.key_name(), key, original, current);
                let modified = entry.modified.iter().cloned().collect();
                self.decide(key, Decision::Unchanged { modified });
                Ok(entry)
            }
        }
    }

    async fn reconcile_references<'g>(
        &mut self,
        node: &'g dyn GraphNode,
        key: &NodeKey,
        entry: &mut TrackedEntry,
        queue: &mut Queue<'g>,
    ) -> TrackingResult<()> {
        let added = entry.is_added();
        for reference in node.references() {
            let name = reference.name;
            match reference.target {
                None if added => entry.set_reference(name, None),
                None => {
                    // Only disconnect what the client is known to have seen.
                    if self.known.reference(key, name).is_none() {
                        continue;
                    }
                    self.report.round_trips += 1;
                    if self.store.load_reference(key, name).await?.is_some() {
                        debug!("Disconnecting {}.{}", key, name);
                        entry.set_reference(name, None);
                    }
                }
                Some(target) => {
                    let target_key = self.resolve(target).await?;
                    if added || self.known.reference(key, name) != Some(&target_key) {
                        entry.set_reference(name, Some(target_key));
                    }
                    queue.push_back((target, false));
                }
            }
        }
        Ok(())
    }

    async fn reconcile_collections<'g>(
        &mut self,
        node: &'g dyn GraphNode,
        key: &NodeKey,
        entry: &mut TrackedEntry,
        queue: &mut Queue<'g>,
    ) -> TrackingResult<()> {
        let added = entry.is_added();
        for collection in node.collections() {
            let name = collection.name;
            let Some(items) = collection.items else {
                continue;
            };
            let raw: Vec<KeyValue> = items.iter().map(|i| i.key()).collect();
            let mut members = Vec::with_capacity(items.len());
            for item in &items {
                members.push(self.resolve(*item).await?);
            }
            queue.extend(items.into_iter().map(|i| (i, false)));

            if added {
                *entry.collection_mut(name) = CollectionDelta {
                    added: dedup(members),
                    removed: Vec::new(),
                };
                continue;
            }

            let Some(seen) = self.known.observed(key, name) else {
                for member in members {
                    self.unobserved.push((key.clone(), name, member));
                }
                continue;
            };
            if seen == raw.as_slice() {
                continue;
            }

            self.report.round_trips += 1;
            let persisted = self.store.load_collection(key, name).await?;
            let delta = CollectionDelta {
                removed: persisted
                    .iter()
                    .filter(|p| !members.contains(p))
                    .cloned()
                    .collect(),
                added: dedup(members.into_iter().filter(|m| !persisted.contains(m))),
            };
            if delta.is_empty() {
                debug!("{}.{} reordered only", key, name);
                continue;
            }
            debug!(
                "{}.{}: +{} -{}",
                key,
                name,
                delta.added.len(),
                delta.removed.len()
            );
            *entry.collection_mut(name) = delta;
        }
        Ok(())
    }

    /// New nodes found in collections the client never observed still
    /// need their membership; nothing is ever removed from such a
    /// collection.
    fn link_unobserved(&mut self) {
        for (parent, name, member) in std::mem::take(&mut self.unobserved) {
            if !self.tracker.get(&member).is_some_and(TrackedEntry::is_added) {
                continue;
            }
            if let Some(entry) = self.tracker.get_mut(&parent) {
                if !entry.is_added() {
                    entry.collection_mut(name).add(member);
                }
            }
        }
    }
}

/// An unchanged entry with every differing scalar flagged, key excluded.
fn flagged(key_name: &str, key: &NodeKey, original: Properties, current: Properties) -> TrackedEntry {
    let modified: Vec<String> = current
        .iter()
        .filter(|(name, value)| *name != key_name && original.value(name) != *value)
        .map(|(name, _)| name.to_string())
        .collect();
    let mut entry = TrackedEntry::unchanged(key.clone(), original, current);
    for name in &modified {
        entry.mark_modified(name);
    }
    entry
}
