//! Entity-to-document conversion.
//!
//! An entity dict becomes a [`SearchDocument`]: every schema attribute that
//! has a non-null value, rendered as canonical text. The canonical form is
//! what hits return, so a write followed by a search reproduces it exactly:
//!
//! | value | canonical text |
//! |-------|----------------|
//! | integer | decimal (`42`) |
//! | float | nine fractional digits (`65.500000000`) |
//! | boolean | `true` / `false` |
//! | string | verbatim |
//! | array / object | compact JSON |
//!
//! Conversion to a tantivy document then parses the text back into the
//! typed value each [`FieldDefinition`] requires.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strata_core::{Error, Result};
use tantivy::schema::{Field, Schema, Value as _};
use tantivy::TantivyDocument;

use crate::schema::{FieldDefinition, IndexSpec, NumericKind, SemanticType};

/// Canonical text of a JSON value; `None` for null.
pub fn canonical_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(if let Some(i) = n.as_i64() {
            i.to_string()
        } else if let Some(u) = n.as_u64() {
            u.to_string()
        } else {
            format_float(n.as_f64().unwrap_or_default())
        }),
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Fixed nine-digit rendering used for all floating-point values.
pub fn format_float(value: f64) -> String {
    format!("{value:.9}")
}

/// Serialized entity: schema field name → canonical text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDocument {
    /// Field values in canonical text form.
    pub fields: BTreeMap<String, String>,
}

impl SearchDocument {
    /// Serialize an entity dict against a spec, dropping fields outside the
    /// schema and null values.
    pub fn from_entity(spec: &IndexSpec, dict: &Map<String, Value>) -> Self {
        let fields = dict
            .iter()
            .filter(|(name, _)| spec.contains(name))
            .filter_map(|(name, value)| canonical_text(value).map(|text| (name.clone(), text)))
            .collect();
        Self { fields }
    }

    /// Canonical text of one field.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Convert to a tantivy document.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidValue` when a value does not parse as its
    /// field's numeric or boolean type.
    pub fn to_tantivy(&self, spec: &IndexSpec, schema: &Schema) -> Result<TantivyDocument> {
        let mut doc = TantivyDocument::new();

        for attr in &spec.schema_attrs {
            let Some(text) = self.fields.get(&attr.name) else {
                continue;
            };
            let field = schema_field(schema, &attr.name)?;

            match attr.definition {
                FieldDefinition::Text { .. } | FieldDefinition::Identifier => {
                    doc.add_text(field, text);
                }
                FieldDefinition::Numeric {
                    numeric: NumericKind::Int,
                    ..
                } => {
                    doc.add_i64(field, parse_int(&attr.name, text)?);
                }
                FieldDefinition::Numeric {
                    numeric: NumericKind::Float,
                    ..
                } => {
                    doc.add_f64(field, parse_float(&attr.name, text)?);
                }
                FieldDefinition::Boolean => {
                    doc.add_bool(field, parse_bool(&attr.name, text)?);
                }
            }
        }

        Ok(doc)
    }

    /// Stored values of a retrieved tantivy document, in canonical text.
    pub fn from_stored(spec: &IndexSpec, schema: &Schema, doc: &TantivyDocument) -> Self {
        let mut fields = BTreeMap::new();

        for attr in spec.schema_attrs.iter().filter(|a| a.definition.is_stored()) {
            let Ok(field) = schema.get_field(&attr.name) else {
                continue;
            };
            let Some(value) = doc.get_first(field) else {
                continue;
            };
            let text = match attr.definition {
                FieldDefinition::Text { .. } | FieldDefinition::Identifier => {
                    value.as_str().map(str::to_string)
                }
                FieldDefinition::Numeric {
                    numeric: NumericKind::Int,
                    ..
                } => value.as_i64().map(|i| i.to_string()),
                FieldDefinition::Numeric {
                    numeric: NumericKind::Float,
                    ..
                } => value.as_f64().map(format_float),
                FieldDefinition::Boolean => value.as_bool().map(|b| b.to_string()),
            };
            if let Some(text) = text {
                fields.insert(attr.name.clone(), text);
            }
        }

        Self { fields }
    }
}

/// Look up a schema field by name.
pub(crate) fn schema_field(schema: &Schema, name: &str) -> Result<Field> {
    schema
        .get_field(name)
        .map_err(|e| Error::index(format!("Schema has no field '{name}': {e}")))
}

/// Convert a stored canonical text back to a JSON value of `semantic` type.
///
/// Text that does not parse as the declared type is returned as a string.
pub fn typed_value(semantic: SemanticType, text: &str) -> Value {
    let parsed = match semantic {
        SemanticType::Numeric(NumericKind::Int) => text.trim().parse::<i64>().ok().map(Value::from),
        SemanticType::Numeric(NumericKind::Float) => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        SemanticType::Boolean => parse_bool("", text).ok().map(Value::Bool),
        SemanticType::Text | SemanticType::Identifier => None,
    };
    parsed.unwrap_or_else(|| Value::String(text.to_string()))
}

pub(crate) fn parse_int(field: &str, text: &str) -> Result<i64> {
    text.trim()
        .parse()
        .map_err(|_| Error::invalid_value(field, text, "integer"))
}

pub(crate) fn parse_float(field: &str, text: &str) -> Result<f64> {
    text.trim()
        .parse()
        .map_err(|_| Error::invalid_value(field, text, "float"))
}

pub(crate) fn parse_bool(field: &str, text: &str) -> Result<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(Error::invalid_value(field, text, "boolean")),
    }
}

// ============================================================================
// Tests
// ============================================================================
