//! Structural difference engine.
//!
//! Compares two instances of the same entity type property by property.
//! Navigations are compared by identity only: a reference is unchanged when
//! both sides point at the same key (or both are empty), a collection is
//! unchanged when both sides hold the same set of keys in any order.

use crate::{compute_changes, GraphNode, Properties, PropertyChange};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use unitwork_types::KeyValue;

/// Which kind of property a difference was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceKind {
    Scalar,
    Reference,
    Collection,
}

/// A single difference between two instances.
///
/// For references the values are the referenced keys (or `null`); for
/// collections they are arrays of keys (or `null` when not loaded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Difference {
    pub path: String,
    pub old: Value,
    pub new: Value,
    pub kind: DifferenceKind,
}

/// Configurable comparer.
#[derive(Debug, Clone)]
pub struct Comparer {
    max_differences: usize,
    ignored: HashSet<String>,
}

impl Default for Comparer {
    fn default() -> Self {
        Self {
            max_differences: usize::MAX,
            ignored: HashSet::new(),
        }
    }
}

impl Comparer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops comparing after `max` differences have been found.
    pub fn with_max_differences(mut self, max: usize) -> Self {
        self.max_differences = max.max(1);
        self
    }

    /// Skips a top-level property by name.
    pub fn ignore(mut self, name: impl Into<String>) -> Self {
        self.ignored.insert(name.into());
        self
    }

    /// Compares `old` against `new` and returns every difference found.
    pub fn compare(&self, old: &dyn GraphNode, new: &dyn GraphNode) -> Vec<Difference> {
        let mut out = Vec::new();
        self.compare_scalars(&old.scalars(), &new.scalars(), &mut out);
        self.compare_references(old, new, &mut out);
        self.compare_collections(old, new, &mut out);
        out.truncate(self.max_differences);
        out
    }

    /// Compares and converts the differences into property changes.
    pub fn changes(&self, old: &dyn GraphNode, new: &dyn GraphNode) -> Vec<PropertyChange> {
        compute_changes(self.compare(old, new))
    }

    fn full(&self, out: &[Difference]) -> bool {
        out.len() >= self.max_differences
    }

    fn compare_scalars(&self, old: &Properties, new: &Properties, out: &mut Vec<Difference>) {
        let names: BTreeSet<&str> = old.names().chain(new.names()).collect();
        for name in names {
            if self.full(out) {
                return;
            }
            if self.ignored.contains(name) {
                continue;
            }
            compare_values(name.to_string(), old.value(name), new.value(name), out);
        }
    }

    fn compare_references(&self, old: &dyn GraphNode, new: &dyn GraphNode, out: &mut Vec<Difference>) {
        let before: BTreeMap<&str, Option<KeyValue>> = old
            .references()
            .into_iter()
            .map(|r| (r.name, r.target.map(|t| t.key())))
            .collect();
        let after: BTreeMap<&str, Option<KeyValue>> = new
            .references()
            .into_iter()
            .map(|r| (r.name, r.target.map(|t| t.key())))
            .collect();

        let names: BTreeSet<&str> = before.keys().chain(after.keys()).copied().collect();
        for name in names {
            if self.full(out) {
                return;
            }
            if self.ignored.contains(name) {
                continue;
            }
            let a = before.get(name).cloned().flatten();
            let b = after.get(name).cloned().flatten();
            if a != b {
                out.push(Difference {
                    path: name.to_string(),
                    old: a.map_or(Value::Null, |k| k.to_json()),
                    new: b.map_or(Value::Null, |k| k.to_json()),
                    kind: DifferenceKind::Reference,
                });
            }
        }
    }

    fn compare_collections(&self, old: &dyn GraphNode, new: &dyn GraphNode, out: &mut Vec<Difference>) {
        let before: BTreeMap<&str, Option<Vec<KeyValue>>> = old
            .collections()
            .iter()
            .map(|c| (c.name, c.keys()))
            .collect();
        let after: BTreeMap<&str, Option<Vec<KeyValue>>> = new
            .collections()
            .iter()
            .map(|c| (c.name, c.keys()))
            .collect();

        let names: BTreeSet<&str> = before.keys().chain(after.keys()).copied().collect();
        for name in names {
            if self.full(out) {
                return;
            }
            if self.ignored.contains(name) {
                continue;
            }
            let a = before.get(name).cloned().flatten();
            let b = after.get(name).cloned().flatten();
            let same = match (&a, &b) {
                (None, None) => true,
                (Some(a), Some(b)) => same_members(a, b),
                _ => false,
            };
            if !same {
                out.push(Difference {
                    path: name.to_string(),
                    old: keys_json(a.as_deref()),
                    new: keys_json(b.as_deref()),
                    kind: DifferenceKind::Collection,
                });
            }
        }
    }
}

fn compare_values(path: String, old: &Value, new: &Value, out: &mut Vec<Difference>) {
    if old == new {
        return;
    }
    if let (Value::Object(a), Value::Object(b)) = (old, new) {
        let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
        for key in keys {
            compare_values(
                format!("{path}.{key}"),
                a.get(key).unwrap_or(&Value::Null),
                b.get(key).unwrap_or(&Value::Null),
                out,
            );
        }
        return;
    }
    out.push(Difference {
        path,
        old: old.clone(),
        new: new.clone(),
        kind: DifferenceKind::Scalar,
    });
}

fn same_members(a: &[KeyValue], b: &[KeyValue]) -> bool {
    let a: BTreeSet<&KeyValue> = a.iter().collect();
    let b: BTreeSet<&KeyValue> = b.iter().collect();
    a == b
}

fn keys_json(keys: Option<&[KeyValue]>) -> Value {
    match keys {
        Some(keys) => Value::Array(keys.iter().map(KeyValue::to_json).collect()),
        None => Value::Null,
    }
}
