//! Storage-neutral keys.
//!
//! Every entity key type lowers to a [`KeyValue`]. Backends persist and
//! compare `KeyValue`s; graph walks qualify them with the entity type as a
//! [`NodeKey`] so that equal ids of different types never collide.

use crate::{EntityId, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use uuid::Uuid;

/// A key value in its storage-neutral form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum KeyValue {
    Int(i64),
    Uuid(Uuid),
    Text(String),
}

impl KeyValue {
    /// Returns true when the key carries the "not assigned yet" value of its
    /// kind: `0`, the nil UUID or the empty string.
    pub fn is_unset(&self) -> bool {
        match self {
            Self::Int(v) => *v == 0,
            Self::Uuid(u) => u.is_nil(),
            Self::Text(s) => s.is_empty(),
        }
    }

    /// The plain JSON form of the key (a number or a string), as it appears
    /// inside an entity's serialized properties.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Uuid(u) => serde_json::Value::String(u.to_string()),
            Self::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Encodes the key into a single string column value.
    ///
    /// The kind prefix keeps `Text("42")` and `Int(42)` distinct.
    pub fn encode(&self) -> String {
        match self {
            Self::Int(v) => format!("i:{v}"),
            Self::Uuid(u) => format!("u:{u}"),
            Self::Text(s) => format!("t:{s}"),
        }
    }

    /// Decodes a string produced by [`KeyValue::encode`].
    pub fn decode(encoded: &str) -> crate::Result<Self> {
        let mismatch = || TypesError::KeyMismatch {
            key: encoded.to_string(),
            target: "KeyValue",
        };
        let (kind, rest) = encoded.split_once(':').ok_or_else(mismatch)?;
        match kind {
            "i" => rest.parse().map(Self::Int).map_err(|_| mismatch()),
            "u" => Ok(Self::Uuid(Uuid::parse_str(rest)?)),
            "t" => Ok(Self::Text(rest.to_string())),
            _ => Err(mismatch()),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A key qualified by the entity type it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub entity_type: String,
    pub key: KeyValue,
}

impl NodeKey {
    pub fn new(entity_type: impl Into<String>, key: KeyValue) -> Self {
        Self {
            entity_type: entity_type.into(),
            key,
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity_type, self.key)
    }
}

/// Contract for an entity's key type.
///
/// Keys are compared by value; two entity instances with equal keys of the
/// same type are the same entity.
pub trait Identity: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Lowers the key to its storage-neutral form.
    fn to_key(&self) -> KeyValue;

    /// Rebuilds the key from its storage-neutral form.
    fn from_key(key: &KeyValue) -> crate::Result<Self>;

    /// Returns true when no key has been assigned yet.
    fn is_unset(&self) -> bool {
        self.to_key().is_unset()
    }

    /// Mints a fresh key, if this key type can be generated client-side.
    /// Integer keys return `None` and are assigned by the store.
    fn generate() -> Option<Self> {
        None
    }
}

fn mismatch(key: &KeyValue, target: &'static str) -> TypesError {
    TypesError::KeyMismatch {
        key: key.encode(),
        target,
    }
}

impl Identity for EntityId {
    fn to_key(&self) -> KeyValue {
        KeyValue::Uuid(self.as_uuid())
    }

    fn from_key(key: &KeyValue) -> crate::Result<Self> {
        match key {
            KeyValue::Uuid(u) => Ok(Self::from_uuid(*u)),
            KeyValue::Text(s) => Ok(Self::parse(s)?),
            KeyValue::Int(_) => Err(mismatch(key, "EntityId")),
        }
    }

    fn generate() -> Option<Self> {
        Some(Self::new())
    }
}

impl Identity for Uuid {
    fn to_key(&self) -> KeyValue {
        KeyValue::Uuid(*self)
    }

    fn from_key(key: &KeyValue) -> crate::Result<Self> {
        match key {
            KeyValue::Uuid(u) => Ok(*u),
            KeyValue::Text(s) => Ok(Uuid::parse_str(s)?),
            KeyValue::Int(_) => Err(mismatch(key, "Uuid")),
        }
    }

    fn generate() -> Option<Self> {
        Some(Uuid::now_v7())
    }
}

impl Identity for String {
    fn to_key(&self) -> KeyValue {
        KeyValue::Text(self.clone())
    }

    fn from_key(key: &KeyValue) -> crate::Result<Self> {
        match key {
            KeyValue::Text(s) => Ok(s.clone()),
            KeyValue::Uuid(u) => Ok(u.to_string()),
            KeyValue::Int(_) => Err(mismatch(key, "String")),
        }
    }

    fn generate() -> Option<Self> {
        Some(Uuid::now_v7().to_string())
    }
}

impl Identity for i64 {
    fn to_key(&self) -> KeyValue {
        KeyValue::Int(*self)
    }

    fn from_key(key: &KeyValue) -> crate::Result<Self> {
        match key {
            KeyValue::Int(v) => Ok(*v),
            _ => Err(mismatch(key, "i64")),
        }
    }
}

impl Identity for i32 {
    fn to_key(&self) -> KeyValue {
        KeyValue::Int(i64::from(*self))
    }

    fn from_key(key: &KeyValue) -> crate::Result<Self> {
        match key {
            KeyValue::Int(v) => i32::try_from(*v).map_err(|_| mismatch(key, "i32")),
            _ => Err(mismatch(key, "i32")),
        }
    }
}
