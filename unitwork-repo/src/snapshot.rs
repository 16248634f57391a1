use std::collections::HashMap;
use unitwork_model::Entity;

/// Per-unit-of-work map of load-time deep clones, keyed by id.
///
/// Snapshots are only ever replaced wholesale, never handed out mutably.
#[derive(Debug)]
pub struct SnapshotStore<E: Entity> {
    items: HashMap<E::Id, E>,
}

impl<E: Entity> Default for SnapshotStore<E> {
    fn default() -> Self {
        Self { items: HashMap::new() }
    }
}

impl<E: Entity> SnapshotStore<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a deep clone of `entity`, replacing any earlier snapshot.
    pub fn insert(&mut self, entity: &E) {
        self.items.insert(entity.id(), entity.clone());
    }

    pub fn get(&self, id: &E::Id) -> Option<&E> {
        self.items.get(id)
    }

    pub fn remove(&mut self, id: &E::Id) -> Option<E> {
        self.items.remove(id)
    }

    pub fn contains(&self, id: &E::Id) -> bool {
        self.items.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
