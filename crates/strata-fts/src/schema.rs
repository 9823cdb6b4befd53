//! Schema derivation.
//!
//! An entity type's declared fields, the caller's weighted fields and a field
//! options bag are turned into an [`IndexSpec`] once, at registration time.
//! Everything downstream (document conversion, query building, sorting)
//! dispatches on the closed [`FieldDefinition`] enum recorded here and never
//! re-inspects declared type names.
//!
//! # Derivation rules
//!
//! | declared field | definition |
//! |----------------|------------|
//! | relation | excluded |
//! | date / datetime / time | excluded (recorded in `temporal_fields`) |
//! | single primary key | `Identifier` (STRING, STORED, unique) |
//! | composite key component | `Identifier` |
//! | weighted `Int` / `Float` | `Numeric` with the options bag |
//! | weighted `Bool` | `Boolean` (always stored) |
//! | anything else | `Text` with the options bag |
//!
//! # Tokenizer
//!
//! Text fields use tantivy's `default` analyzer
//! (SimpleTokenizer → RemoveLongFilter → LowerCaser), identifiers the `raw`
//! analyzer, so identifiers only ever match exactly.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use strata_core::{Error, Result};
use tantivy::schema::{
    IndexRecordOption, NumericOptions, Schema, SchemaBuilder, TextFieldIndexing, TextOptions,
    STORED, STRING,
};

use crate::entity::{DeclaredType, EntityDescriptor};

/// Schema version, recorded in index metadata.
///
/// Increment this when the derivation rules change.
pub const SCHEMA_VERSION: u32 = 1;

/// Numeric storage width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericKind {
    /// Signed 64-bit integer.
    Int,
    /// 64-bit float.
    Float,
}

/// Semantic type of a field, resolved once from its declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    /// Free text.
    Text,
    /// Number.
    Numeric(NumericKind),
    /// Boolean.
    Boolean,
    /// Primary-key identifier.
    Identifier,
}

impl SemanticType {
    fn from_declared(declared: &DeclaredType) -> Self {
        match declared {
            DeclaredType::Int => Self::Numeric(NumericKind::Int),
            DeclaredType::Float => Self::Numeric(NumericKind::Float),
            DeclaredType::Bool => Self::Boolean,
            _ => Self::Text,
        }
    }
}

/// Options applied uniformly to generated text and numeric definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldOptions {
    /// Persist the raw value so hits can return it.
    #[serde(default)]
    pub stored: bool,
    /// Allow ordering results by this field. Implies `stored`.
    #[serde(default)]
    pub sortable: bool,
}

impl FieldOptions {
    /// Stored and sortable.
    pub fn stored_sortable() -> Self {
        Self {
            stored: true,
            sortable: true,
        }
    }
}

/// Concrete search-field definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldDefinition {
    /// Tokenized full-text field.
    Text {
        /// Value is stored.
        stored: bool,
        /// Hits can be ordered by this field.
        sortable: bool,
    },
    /// Numeric field matched by exact value.
    Numeric {
        /// Storage width.
        numeric: NumericKind,
        /// Value is stored.
        stored: bool,
        /// Hits can be ordered by this field.
        sortable: bool,
    },
    /// Boolean field, always stored.
    Boolean,
    /// Exact-match, unique, stored identifier.
    Identifier,
}

impl FieldDefinition {
    fn text(options: FieldOptions) -> Self {
        Self::Text {
            stored: options.stored || options.sortable,
            sortable: options.sortable,
        }
    }

    fn numeric(numeric: NumericKind, options: FieldOptions) -> Self {
        Self::Numeric {
            numeric,
            stored: options.stored || options.sortable,
            sortable: options.sortable,
        }
    }

    /// Whether hits carry this field's value.
    pub fn is_stored(&self) -> bool {
        match self {
            Self::Text { stored, .. } | Self::Numeric { stored, .. } => *stored,
            Self::Boolean | Self::Identifier => true,
        }
    }

    /// Whether hits can be ordered by this field.
    pub fn is_sortable(&self) -> bool {
        match self {
            Self::Text { sortable, .. } | Self::Numeric { sortable, .. } => *sortable,
            Self::Boolean | Self::Identifier => false,
        }
    }
}

/// One schema attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaAttr {
    /// Field name.
    pub name: String,
    /// Search-field definition.
    pub definition: FieldDefinition,
}

/// Temporal field left out of the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalField {
    /// Field name.
    pub name: String,
    /// Whether `stored` had been requested for it.
    pub stored_requested: bool,
}

/// Per-entity index configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name (table name, else type name).
    pub name: String,
    /// Entity type name.
    pub entity_type: String,
    /// Fields selected as weighted at registration.
    pub selected_fields: BTreeSet<String>,
    /// Base options bag.
    pub options: FieldOptions,
    /// Semantic type per schema field.
    pub field_types: BTreeMap<String, SemanticType>,
    /// Schema attributes in declaration order.
    pub schema_attrs: Vec<SchemaAttr>,
    /// Temporal fields skipped from the schema.
    pub temporal_fields: Vec<TemporalField>,
    /// Primary-key field names in order.
    pub primary_key: Vec<String>,
    /// Whether the key has more than one component.
    pub primary_key_composite: bool,
    /// Declared semantic type of the single key; `None` for composite keys.
    pub primary_key_type: Option<SemanticType>,
    /// Declared semantic type of each key component, in key order.
    ///
    /// Keys are always indexed as identifiers; this is what their stored
    /// text converts back to when a hit is rehydrated.
    pub key_types: Vec<SemanticType>,
}

impl IndexSpec {
    /// Definition of the named schema field.
    pub fn attr(&self, name: &str) -> Option<&FieldDefinition> {
        self.schema_attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.definition)
    }

    /// Whether the named field is in the schema.
    pub fn contains(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Schema field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.schema_attrs.iter().map(|a| a.name.as_str())
    }

    /// Build the tantivy schema for this spec.
    pub fn build_schema(&self) -> Schema {
        let mut builder = SchemaBuilder::new();

        for attr in &self.schema_attrs {
            match attr.definition {
                FieldDefinition::Text { stored, .. } => {
                    let mut options = TextOptions::default().set_indexing_options(
                        TextFieldIndexing::default()
                            .set_tokenizer("default")
                            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
                    );
                    if stored {
                        options = options.set_stored();
                    }
                    builder.add_text_field(&attr.name, options);
                }
                FieldDefinition::Numeric {
                    numeric, stored, ..
                } => {
                    let mut options = NumericOptions::default().set_indexed();
                    if stored {
                        options = options.set_stored();
                    }
                    match numeric {
                        NumericKind::Int => builder.add_i64_field(&attr.name, options),
                        NumericKind::Float => builder.add_f64_field(&attr.name, options),
                    };
                }
                FieldDefinition::Boolean => {
                    let options = NumericOptions::default().set_indexed().set_stored();
                    builder.add_bool_field(&attr.name, options);
                }
                FieldDefinition::Identifier => {
                    builder.add_text_field(&attr.name, STRING | STORED);
                }
            }
        }

        builder.build()
    }
}

/// Derive the index spec for an entity type.
///
/// `weighted` names the fields selected for typed (numeric/boolean)
/// searchability; `options` is the base options bag. Each field works on its
/// own copy of the options, so per-field overrides never leak.
///
/// # Errors
///
/// Returns `Error::Registration` when a field has no name or no declared
/// type, a field name repeats, a key component is a relation or temporal
/// field, or the entity has no primary key.
pub fn derive_index_spec(
    descriptor: &EntityDescriptor,
    weighted: &[&str],
    options: FieldOptions,
) -> Result<IndexSpec> {
    let name = descriptor.index_name().to_string();
    let entity = descriptor.type_name.clone();
    let primary_key = descriptor.primary_key();
    let composite = descriptor.primary_key_composite || primary_key.len() > 1;

    if primary_key.is_empty() {
        return Err(Error::registration(&entity, "entity has no primary key"));
    }

    let selected_fields: BTreeSet<String> = weighted.iter().map(|s| s.to_string()).collect();
    let mut seen = HashSet::new();
    let mut field_types = BTreeMap::new();
    let mut schema_attrs = Vec::new();
    let mut temporal_fields = Vec::new();
    let mut declared_key_types = BTreeMap::new();

    for field in &descriptor.fields {
        let Some(declared) = field.declared_type.as_ref().filter(|_| !field.name.is_empty())
        else {
            return Err(Error::registration(
                &entity,
                format!(
                    "field {:?} lacks a name or a declared storage type",
                    field.name
                ),
            ));
        };

        if !seen.insert(field.name.as_str()) {
            return Err(Error::registration(
                &entity,
                format!("duplicate field name '{}'", field.name),
            ));
        }

        let is_key = primary_key.contains(&field.name);

        if field.is_relation || declared.is_temporal() {
            if is_key {
                return Err(Error::registration(
                    &entity,
                    format!("primary key component '{}' cannot be indexed", field.name),
                ));
            }
            if !field.is_relation {
                temporal_fields.push(TemporalField {
                    name: field.name.clone(),
                    stored_requested: options.stored,
                });
            }
            continue;
        }

        let mut field_options = options;
        if is_key {
            field_options.stored = true;
        }

        let mut semantic = SemanticType::from_declared(declared);
        let mut definition = FieldDefinition::text(field_options);

        if is_key {
            declared_key_types.insert(field.name.as_str(), semantic);
            semantic = SemanticType::Identifier;
            definition = FieldDefinition::Identifier;
        } else if selected_fields.contains(&field.name) && !declared.is_string() {
            definition = match declared {
                DeclaredType::Int => FieldDefinition::numeric(NumericKind::Int, field_options),
                DeclaredType::Float => FieldDefinition::numeric(NumericKind::Float, field_options),
                DeclaredType::Bool => FieldDefinition::Boolean,
                _ => definition,
            };
        }

        field_types.insert(field.name.clone(), semantic);
        schema_attrs.push(SchemaAttr {
            name: field.name.clone(),
            definition,
        });
    }

    let key_types: Vec<SemanticType> = primary_key
        .iter()
        .map(|key| {
            declared_key_types
                .get(key.as_str())
                .copied()
                .unwrap_or(SemanticType::Text)
        })
        .collect();
    let primary_key_type = if composite { None } else { key_types.first().copied() };

    log::debug!(
        "Derived schema for '{name}': {} fields, {} temporal skipped",
        schema_attrs.len(),
        temporal_fields.len()
    );

    Ok(IndexSpec {
        name,
        entity_type: entity,
        selected_fields,
        options,
        field_types,
        schema_attrs,
        temporal_fields,
        primary_key,
        primary_key_composite: composite,
        primary_key_type,
        key_types,
    })
}

// ============================================================================
// Tests
// ============================================================================
