//! Boundary types for the relational side.
//!
//! The ORM is an external collaborator. Strata sees it through three
//! narrow views:
//!
//! - [`EntityDescriptor`]: read-only description of an entity type, used once
//!   at registration to derive the index schema;
//! - [`EntityRecord`]: one changed instance, handed to the change hook;
//! - [`EntityLoader`]: rehydrates the source entity of a search hit.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strata_core::Result;

/// Storage type an ORM declares for a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclaredType {
    /// Character data.
    Str,
    /// Integer.
    Int,
    /// Floating point.
    Float,
    /// Boolean.
    Bool,
    /// Calendar date.
    Date,
    /// Date and time.
    DateTime,
    /// Time of day.
    Time,
    /// Anything else (uuid, decimal, json, ...), indexed as text.
    Other(String),
}

impl DeclaredType {
    /// Temporal types are never part of a derived schema.
    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::DateTime | Self::Time)
    }

    /// Whether the ORM stores this type as a string.
    pub fn is_string(&self) -> bool {
        matches!(self, Self::Str)
    }
}

/// One declared field of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name (attribute name on the entity).
    pub name: String,
    /// Declared storage type; `None` means the ORM did not report one.
    pub declared_type: Option<DeclaredType>,
    /// Part of the primary key.
    #[serde(default)]
    pub is_primary_key: bool,
    /// Foreign key or collection pointing at another entity.
    #[serde(default)]
    pub is_relation: bool,
}

impl FieldDescriptor {
    /// A plain attribute.
    pub fn new(name: impl Into<String>, declared_type: DeclaredType) -> Self {
        Self {
            name: name.into(),
            declared_type: Some(declared_type),
            is_primary_key: false,
            is_relation: false,
        }
    }

    /// A primary-key attribute.
    pub fn primary_key(name: impl Into<String>, declared_type: DeclaredType) -> Self {
        Self {
            is_primary_key: true,
            ..Self::new(name, declared_type)
        }
    }

    /// A relation attribute; its declared type is the related entity's name.
    pub fn relation(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            is_relation: true,
            ..Self::new(name, DeclaredType::Other(target.into()))
        }
    }
}

/// Read-only view of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Table name, when the ORM maps the type to a named table.
    pub table: Option<String>,
    /// Type name of the entity.
    pub type_name: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldDescriptor>,
    /// Whether the primary key spans more than one field.
    #[serde(default)]
    pub primary_key_composite: bool,
}

impl EntityDescriptor {
    /// Start a descriptor for the given type name.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            table: None,
            type_name: type_name.into(),
            fields: Vec::new(),
            primary_key_composite: false,
        }
    }

    /// Set the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Append a field. `primary_key_composite` follows the key field count.
    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self.primary_key_composite = self.fields.iter().filter(|f| f.is_primary_key).count() > 1;
        self
    }

    /// Index name: the table name, or the type name when there is none.
    pub fn index_name(&self) -> &str {
        match self.table.as_deref() {
            Some(table) if !table.is_empty() => table,
            _ => &self.type_name,
        }
    }

    /// Primary-key field names in declaration order.
    pub fn primary_key(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.is_primary_key)
            .map(|f| f.name.clone())
            .collect()
    }
}

/// One entity instance as seen by the change hook.
pub trait EntityRecord {
    /// Current attribute values keyed by field name.
    fn to_serializable_dict(&self) -> Map<String, Value>;

    /// Current primary-key values, in primary-key field order.
    fn primary_key_value(&self) -> Vec<Value>;
}

impl<T: EntityRecord + ?Sized> EntityRecord for &T {
    fn to_serializable_dict(&self) -> Map<String, Value> {
        (**self).to_serializable_dict()
    }

    fn primary_key_value(&self) -> Vec<Value> {
        (**self).primary_key_value()
    }
}

/// Primary key of a hit, converted back to the key's declared types.
///
/// An integer key stored as `"3"` comes back as the JSON number `3`, a
/// string key `"3"` as the JSON string `"3"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityKey {
    /// Entity type name.
    pub entity: String,
    /// `(field, value)` per key component, in key order.
    pub fields: Vec<(String, Value)>,
}

impl EntityKey {
    /// Value of one key component.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }
}

/// Rehydrates source entities for `include_entity` searches.
pub trait EntityLoader: Send + Sync {
    /// Load the entity with the given key, `None` if it no longer exists.
    fn load(&self, key: &EntityKey) -> Result<Option<Value>>;
}

// ============================================================================
// Tests
// ============================================================================
