use crate::EntitySchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use unitwork_types::{Identity, KeyValue, NodeKey};

/// Named scalar values of one entity instance, as JSON.
///
/// Navigation properties never appear here; they are exposed through
/// [`GraphNode::references`] and [`GraphNode::collections`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, Value>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Properties::insert`].
    pub fn with<T: Serialize + ?Sized>(mut self, name: &str, value: &T) -> Self {
        self.insert(name, value);
        self
    }

    /// Serializes `value` and stores it under `name`. Values that fail to
    /// serialize are stored as `null`.
    pub fn insert<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.0.insert(name.to_string(), value);
    }

    /// Stores an already-serialized value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns the value for `name`, treating a missing entry as `null`.
    pub fn value(&self, name: &str) -> &Value {
        self.0.get(name).unwrap_or(&Value::Null)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Converts into a JSON object.
    pub fn into_object(self) -> serde_json::Map<String, Value> {
        self.0.into_iter().collect()
    }
}

impl FromIterator<(String, Value)> for Properties {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A single-valued navigation (0..1) of a graph node.
#[derive(Clone, Copy)]
pub struct Reference<'a> {
    pub name: &'static str,
    pub target: Option<&'a dyn GraphNode>,
}

impl<'a> Reference<'a> {
    pub fn of<T: GraphNode>(name: &'static str, target: Option<&'a T>) -> Self {
        Self {
            name,
            target: target.map(|t| t as &dyn GraphNode),
        }
    }
}

impl fmt::Debug for Reference<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("name", &self.name)
            .field("target", &self.target.map(|t| t.node_key()))
            .finish()
    }
}

/// A collection navigation (0..n) of a graph node.
///
/// `items == None` means the collection was never loaded (or is null);
/// `Some(vec![])` means it was loaded and is empty.
#[derive(Clone)]
pub struct Collection<'a> {
    pub name: &'static str,
    pub items: Option<Vec<&'a dyn GraphNode>>,
}

impl<'a> Collection<'a> {
    pub fn of<T: GraphNode>(name: &'static str, items: Option<&'a [T]>) -> Self {
        Self {
            name,
            items: items.map(|items| items.iter().map(|i| i as &dyn GraphNode).collect()),
        }
    }

    /// Keys of the items in their current order, or `None` when unloaded.
    pub fn keys(&self) -> Option<Vec<KeyValue>> {
        self.items
            .as_ref()
            .map(|items| items.iter().map(|i| i.key()).collect())
    }
}

impl fmt::Debug for Collection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("items", &self.keys())
            .finish()
    }
}

/// Object-safe view of an entity as a node in an object graph.
///
/// Every entity type implements this explicitly; graph walkers (the
/// comparer, the reconciler, access checks) operate purely on this trait.
pub trait GraphNode: Send + Sync {
    /// The entity type name. Must match `EntitySchema::entity_type`.
    fn entity_type(&self) -> &'static str;

    /// The node's key in storage-neutral form.
    fn key(&self) -> KeyValue;

    /// Name of the key property inside [`GraphNode::scalars`].
    fn key_name(&self) -> &'static str {
        "id"
    }

    /// Scalar property values, key included.
    fn scalars(&self) -> Properties;

    /// Single-valued navigations.
    fn references(&self) -> Vec<Reference<'_>> {
        Vec::new()
    }

    /// Collection navigations.
    fn collections(&self) -> Vec<Collection<'_>> {
        Vec::new()
    }

    /// Mutable access to the directly related nodes (referenced nodes, then
    /// collection items). Only needed to receive keys assigned on save;
    /// without it nested nodes keep their unset keys until reloaded.
    fn related_mut(&mut self) -> Vec<&mut dyn DynEntity> {
        Vec::new()
    }

    /// The type-qualified key of this node.
    fn node_key(&self) -> NodeKey {
        NodeKey::new(self.entity_type(), self.key())
    }
}

/// A persisted domain object.
///
/// Entities own their reachable graph, so `Clone` is a deep clone; snapshots
/// rely on this. Backends materialize entities by deserializing a JSON
/// object holding the scalars plus any included navigations, so navigation
/// fields must be optional (`Option<Box<T>>`, `Option<Vec<T>>`).
pub trait Entity:
    GraphNode + Clone + Default + fmt::Debug + Serialize + DeserializeOwned + 'static
{
    type Id: Identity;

    fn id(&self) -> Self::Id;

    fn set_id(&mut self, id: Self::Id);

    fn schema() -> &'static EntitySchema;
}

/// Type-erased entity handed to polymorphic filters, validators and access
/// checkers. Typed hooks recover the concrete type with `downcast_ref`.
pub trait DynEntity: GraphNode + Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn as_node(&self) -> &dyn GraphNode;

    /// Sets the key from its storage-neutral form.
    fn assign_key(&mut self, key: &KeyValue) -> unitwork_types::Result<()>;
}

impl<E: Entity> DynEntity for E {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_node(&self) -> &dyn GraphNode {
        self
    }

    fn assign_key(&mut self, key: &KeyValue) -> unitwork_types::Result<()> {
        self.set_id(E::Id::from_key(key)?);
        Ok(())
    }
}

impl dyn DynEntity {
    pub fn downcast_ref<E: Entity>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }

    pub fn downcast_mut<E: Entity>(&mut self) -> Option<&mut E> {
        self.as_any_mut().downcast_mut::<E>()
    }
}
