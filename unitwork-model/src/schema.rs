use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Describes an entity type's properties for query resolution, value
/// coercion and graph persistence.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    entity_type: &'static str,
    properties: Vec<PropertyDescriptor>,
    /// Lowercased name → index into `properties`, built on first lookup.
    lookup: OnceLock<HashMap<String, usize>>,
}

/// One property of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PropertyDescriptor {
    pub name: &'static str,
    pub kind: PropertyKind,
}

/// What a property holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    /// The identity property.
    Key(ScalarType),
    /// A plain value.
    Scalar(ScalarType),
    /// A single reference (0..1) to another entity type.
    Reference { target: &'static str },
    /// A collection (0..n) of another entity type.
    Collection { target: &'static str },
}

/// The data type of a scalar property, used to coerce untyped filter values
/// and to compare stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Int,
    Float,
    Decimal,
    Bool,
    Text,
    Uuid,
    Url,
    DateTime,
    /// Enumeration stored by variant name.
    Enum(&'static [&'static str]),
    /// Opaque JSON (objects, arrays).
    Json,
}

impl ScalarType {
    /// Returns true for types that support numeric aggregation.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float | Self::Decimal)
    }
}

impl PropertyDescriptor {
    /// The scalar type, for key and scalar properties.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self.kind {
            PropertyKind::Key(t) | PropertyKind::Scalar(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_key(&self) -> bool {
        matches!(self.kind, PropertyKind::Key(_))
    }

    pub fn is_navigation(&self) -> bool {
        matches!(
            self.kind,
            PropertyKind::Reference { .. } | PropertyKind::Collection { .. }
        )
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.kind, PropertyKind::Collection { .. })
    }

    /// Target entity type of a navigation.
    pub fn target(&self) -> Option<&'static str> {
        match self.kind {
            PropertyKind::Reference { target } | PropertyKind::Collection { target } => Some(target),
            _ => None,
        }
    }
}

impl EntitySchema {
    pub fn new(entity_type: &'static str) -> Self {
        Self {
            entity_type,
            properties: Vec::new(),
            lookup: OnceLock::new(),
        }
    }

    fn push(mut self, name: &'static str, kind: PropertyKind) -> Self {
        self.properties.push(PropertyDescriptor { name, kind });
        self
    }

    /// Declares the key property.
    pub fn key(self, name: &'static str, scalar_type: ScalarType) -> Self {
        self.push(name, PropertyKind::Key(scalar_type))
    }

    /// Declares a scalar property.
    pub fn scalar(self, name: &'static str, scalar_type: ScalarType) -> Self {
        self.push(name, PropertyKind::Scalar(scalar_type))
    }

    /// Shorthand for a text property.
    pub fn text(self, name: &'static str) -> Self {
        self.scalar(name, ScalarType::Text)
    }

    /// Shorthand for an integer property.
    pub fn int(self, name: &'static str) -> Self {
        self.scalar(name, ScalarType::Int)
    }

    /// Shorthand for a floating point property.
    pub fn float(self, name: &'static str) -> Self {
        self.scalar(name, ScalarType::Float)
    }

    /// Shorthand for a decimal property.
    pub fn decimal(self, name: &'static str) -> Self {
        self.scalar(name, ScalarType::Decimal)
    }

    /// Shorthand for a boolean property.
    pub fn bool(self, name: &'static str) -> Self {
        self.scalar(name, ScalarType::Bool)
    }

    /// Shorthand for a DateTime property.
    pub fn datetime(self, name: &'static str) -> Self {
        self.scalar(name, ScalarType::DateTime)
    }

    /// Shorthand for an enum property with fixed variant names.
    pub fn enumeration(self, name: &'static str, options: &'static [&'static str]) -> Self {
        self.scalar(name, ScalarType::Enum(options))
    }

    /// Declares a single reference navigation.
    pub fn reference(self, name: &'static str, target: &'static str) -> Self {
        self.push(name, PropertyKind::Reference { target })
    }

    /// Declares a collection navigation.
    pub fn collection(self, name: &'static str, target: &'static str) -> Self {
        self.push(name, PropertyKind::Collection { target })
    }

    pub fn entity_type(&self) -> &'static str {
        self.entity_type
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    /// The key property, if declared.
    pub fn key_property(&self) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.is_key())
    }

    /// Exact-name lookup.
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Case-insensitive lookup. The lowercase index is built once per schema.
    pub fn resolve(&self, name: &str) -> Option<&PropertyDescriptor> {
        let lookup = self.lookup.get_or_init(|| {
            self.properties
                .iter()
                .enumerate()
                .map(|(i, p)| (p.name.to_lowercase(), i))
                .collect()
        });
        lookup
            .get(&name.trim().to_lowercase())
            .map(|&i| &self.properties[i])
    }

    /// Scalar (and key) properties in declaration order.
    pub fn scalars(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter().filter(|p| p.scalar_type().is_some())
    }

    /// Navigation properties in declaration order.
    pub fn navigations(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter().filter(|p| p.is_navigation())
    }
}
