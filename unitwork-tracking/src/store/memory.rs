use super::RowStore;
use crate::row::{ChangeSet, RelationKind, Row, RowInsert, RowUpdate};
use crate::{TrackingError, TrackingResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;
use tracing::debug;
use unitwork_model::{EntitySchema, Properties};
use unitwork_query::{eval, QuerySpec};
use unitwork_repo::SaveSummary;
use unitwork_types::{KeyValue, NodeKey};

#[derive(Debug, Clone, Default)]
struct StoredRow {
    scalars: Properties,
    references: BTreeMap<String, NodeKey>,
    collections: BTreeMap<String, Vec<NodeKey>>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    rows: BTreeMap<NodeKey, StoredRow>,
    relations: HashMap<(String, String), RelationKind>,
    sequences: HashMap<String, i64>,
}

impl Tables {
    fn check(&self, entity_type: &str, property: &str, kind: RelationKind) -> TrackingResult<()> {
        match self.relations.get(&(entity_type.to_string(), property.to_string())) {
            Some(stored) if *stored != kind => Err(TrackingError::unsupported(
                entity_type,
                property,
                format!("persisted as a {}, used as a {}", stored.as_str(), kind.as_str()),
            )),
            _ => Ok(()),
        }
    }

    fn relation(&mut self, entity_type: &str, property: &str, kind: RelationKind) -> TrackingResult<()> {
        self.check(entity_type, property, kind)?;
        self.relations
            .insert((entity_type.to_string(), property.to_string()), kind);
        Ok(())
    }

    fn insert(&mut self, insert: &RowInsert) -> TrackingResult<()> {
        let node = &insert.node;
        if self.rows.contains_key(node) {
            return Err(TrackingError::DuplicateKey(node.clone()));
        }
        for name in insert.references.keys() {
            self.relation(&node.entity_type, name, RelationKind::Reference)?;
        }
        for name in insert.collections.keys() {
            self.relation(&node.entity_type, name, RelationKind::Collection)?;
        }
        if let KeyValue::Int(key) = node.key {
            let last = self.sequences.entry(node.entity_type.clone()).or_insert(0);
            *last = (*last).max(key);
        }
        self.rows.insert(
            node.clone(),
            StoredRow {
                scalars: insert.scalars.clone(),
                references: insert.references.clone(),
                collections: insert.collections.clone(),
            },
        );
        Ok(())
    }

    fn update(&mut self, update: &RowUpdate) -> TrackingResult<()> {
        let node = &update.node;
        for name in update.references.keys() {
            self.relation(&node.entity_type, name, RelationKind::Reference)?;
        }
        for name in update.collections.keys() {
            self.relation(&node.entity_type, name, RelationKind::Collection)?;
        }
        let row = self
            .rows
            .get_mut(node)
            .ok_or_else(|| TrackingError::ConcurrencyConflict(node.clone()))?;
        for (name, value) in update.scalars.iter() {
            row.scalars.set(name, value.clone());
        }
        for (name, target) in &update.references {
            match target {
                Some(target) => {
                    row.references.insert(name.clone(), target.clone());
                }
                None => {
                    row.references.remove(name);
                }
            }
        }
        for (name, delta) in &update.collections {
            let members = row.collections.entry(name.clone()).or_default();
            members.retain(|m| !delta.removed.contains(m));
            for added in &delta.added {
                if !members.contains(added) {
                    members.push(added.clone());
                }
            }
        }
        Ok(())
    }

    fn delete(&mut self, node: &NodeKey) -> TrackingResult<()> {
        if self.rows.remove(node).is_none() {
            return Err(TrackingError::ConcurrencyConflict(node.clone()));
        }
        for row in self.rows.values_mut() {
            row.references.retain(|_, target| target != node);
            for members in row.collections.values_mut() {
                members.retain(|m| m != node);
            }
        }
        Ok(())
    }
}

/// Round-trip counters of a [`MemoryRowStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub fetches: usize,
    pub reference_loads: usize,
    pub collection_loads: usize,
    pub selects: usize,
    pub applies: usize,
}

#[derive(Debug, Default)]
struct Counters {
    fetches: AtomicUsize,
    reference_loads: AtomicUsize,
    collection_loads: AtomicUsize,
    selects: AtomicUsize,
    applies: AtomicUsize,
}

/// In-memory row store with snapshot transactions.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    tables: RwLock<Tables>,
    /// Tables as they were when the open transaction began.
    saved: Mutex<Option<Tables>>,
    counters: Counters,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            reference_loads: self.counters.reference_loads.load(Ordering::Relaxed),
            collection_loads: self.counters.collection_loads.load(Ordering::Relaxed),
            selects: self.counters.selects.load(Ordering::Relaxed),
            applies: self.counters.applies.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        for counter in [
            &self.counters.fetches,
            &self.counters.reference_loads,
            &self.counters.collection_loads,
            &self.counters.selects,
            &self.counters.applies,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Number of stored rows of `entity_type`.
    pub async fn row_count(&self, entity_type: &str) -> usize {
        self.tables
            .read()
            .await
            .rows
            .keys()
            .filter(|k| k.entity_type == entity_type)
            .count()
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn fetch(&self, node: &NodeKey) -> TrackingResult<Option<Properties>> {
        self.counters.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .tables
            .read()
            .await
            .rows
            .get(node)
            .map(|row| row.scalars.clone()))
    }

    async fn load_reference(&self, node: &NodeKey, property: &str) -> TrackingResult<Option<NodeKey>> {
        self.counters.reference_loads.fetch_add(1, Ordering::Relaxed);
        let tables = self.tables.read().await;
        tables.check(&node.entity_type, property, RelationKind::Reference)?;
        Ok(tables
            .rows
            .get(node)
            .and_then(|row| row.references.get(property).cloned()))
    }

    async fn load_collection(&self, node: &NodeKey, property: &str) -> TrackingResult<Vec<NodeKey>> {
        self.counters.collection_loads.fetch_add(1, Ordering::Relaxed);
        let tables = self.tables.read().await;
        tables.check(&node.entity_type, property, RelationKind::Collection)?;
        Ok(tables
            .rows
            .get(node)
            .and_then(|row| row.collections.get(property).cloned())
            .unwrap_or_default())
    }

    async fn select(&self, schema: &EntitySchema, spec: &QuerySpec) -> TrackingResult<Vec<Row>> {
        self.counters.selects.fetch_add(1, Ordering::Relaxed);
        let rows: Vec<Row> = self
            .tables
            .read()
            .await
            .rows
            .iter()
            .filter(|(node, _)| node.entity_type == schema.entity_type())
            .map(|(node, row)| Row {
                node: node.clone(),
                scalars: row.scalars.clone(),
            })
            .collect();
        Ok(eval::apply(spec, schema, rows, |row| &row.scalars))
    }

    async fn next_key(&self, entity_type: &str) -> TrackingResult<i64> {
        let mut tables = self.tables.write().await;
        let last = tables.sequences.entry(entity_type.to_string()).or_insert(0);
        *last += 1;
        Ok(*last)
    }

    async fn apply(&self, changes: &ChangeSet) -> TrackingResult<SaveSummary> {
        self.counters.applies.fetch_add(1, Ordering::Relaxed);
        let mut tables = self.tables.write().await;
        let mut staged = tables.clone();
        for insert in &changes.inserts {
            staged.insert(insert)?;
        }
        for update in &changes.updates {
            staged.update(update)?;
        }
        for node in &changes.deletes {
            staged.delete(node)?;
        }
        *tables = staged;
        let summary = SaveSummary {
            inserted: changes.inserts.len(),
            updated: changes.updates.len(),
            deleted: changes.deletes.len(),
        };
        debug!("Applied {} change(s) to memory store", summary.total());
        Ok(summary)
    }

    async fn begin(&self) -> TrackingResult<()> {
        let snapshot = self.tables.read().await.clone();
        let mut saved = self.saved.lock().unwrap();
        if saved.is_some() {
            return Err(TrackingError::Storage("a transaction is already active".into()));
        }
        *saved = Some(snapshot);
        Ok(())
    }

    async fn commit(&self) -> TrackingResult<()> {
        match self.saved.lock().unwrap().take() {
            Some(_) => Ok(()),
            None => Err(TrackingError::Storage("no active transaction".into())),
        }
    }

    async fn rollback(&self) -> TrackingResult<()> {
        let snapshot = self.saved.lock().unwrap().take();
        match snapshot {
            Some(tables) => {
                *self.tables.write().await = tables;
                Ok(())
            }
            None => Err(TrackingError::Storage("no active transaction".into())),
        }
    }

    fn in_transaction(&self) -> bool {
        self.saved.lock().unwrap().is_some()
    }
}
