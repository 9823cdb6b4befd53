//! Common types for the write and read paths.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_core::Error;

use crate::entity::EntityDescriptor;

/// Kind of entity change reported by the ORM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A new entity was persisted.
    Inserted,
    /// An existing entity was modified.
    Updated,
    /// The entity was deleted.
    Deleted,
    /// The entity is scheduled for deletion.
    MarkedToDelete,
    /// The entity's creation was cancelled.
    Cancelled,
}

impl ChangeKind {
    /// Whether the change removes the entity's document.
    pub fn is_removal(&self) -> bool {
        matches!(self, Self::Deleted | Self::MarkedToDelete | Self::Cancelled)
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::MarkedToDelete => "marked_to_delete",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inserted" => Ok(Self::Inserted),
            "updated" => Ok(Self::Updated),
            "deleted" => Ok(Self::Deleted),
            "marked_to_delete" => Ok(Self::MarkedToDelete),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(Error::config(format!("unknown change kind '{other}'"))),
        }
    }
}

/// Reference to an entity type in a search's `models` option.
#[derive(Debug, Clone)]
pub enum ModelRef {
    /// Index name, or the entity type name it was registered from.
    /// Unknown names are dropped.
    Name(String),
    /// Entity type given directly.
    Descriptor(Arc<EntityDescriptor>),
}

impl ModelRef {
    /// Name the registry resolves this reference by: the given name, or the
    /// descriptor's index name.
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Descriptor(descriptor) => descriptor.index_name(),
        }
    }
}

impl From<&str> for ModelRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ModelRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<Arc<EntityDescriptor>> for ModelRef {
    fn from(descriptor: Arc<EntityDescriptor>) -> Self {
        Self::Descriptor(descriptor)
    }
}

/// Options bag for single-index and federated searches.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Entity types to search. When empty, or when none of them is
    /// registered, every registered entity is searched.
    pub models: Vec<ModelRef>,

    /// Restrict matching to these fields.
    pub fields: Option<Vec<String>>,

    /// Exclude these fields from matching (applied after `fields`).
    pub except_fields: Vec<String>,

    /// Substring matching (`*term*`).
    pub add_wildcards: bool,

    /// Fuzzy-prefix matching.
    pub something: bool,

    /// Attach the rehydrated source entity to each hit.
    pub include_entity: bool,

    /// Order hits by this sortable field instead of relevance.
    pub sorted_by: Option<String>,

    /// Descending order when `sorted_by` applies.
    pub reverse: bool,

    /// Cap on hits per index.
    pub limit: Option<usize>,
}

impl SearchOptions {
    /// Empty options: exact matching over all fields and models.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to the given models.
    pub fn models<I, M>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<ModelRef>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict matching to the given fields.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Exclude the given fields from matching.
    pub fn except_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.except_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Enable substring matching.
    pub fn add_wildcards(mut self) -> Self {
        self.add_wildcards = true;
        self
    }

    /// Enable fuzzy-prefix matching.
    pub fn something(mut self) -> Self {
        self.something = true;
        self
    }

    /// Rehydrate source entities.
    pub fn include_entity(mut self) -> Self {
        self.include_entity = true;
        self
    }

    /// Order by a sortable field.
    pub fn sorted_by(mut self, field: impl Into<String>) -> Self {
        self.sorted_by = Some(field.into());
        self
    }

    /// Reverse the `sorted_by` order.
    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Cap hits per index.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_kind_parse() {
        assert_eq!("inserted".parse::<ChangeKind>().unwrap(), ChangeKind::Inserted);
        assert_eq!(
            "marked_to_delete".parse::<ChangeKind>().unwrap(),
            ChangeKind::MarkedToDelete
        );
        assert!("archived".parse::<ChangeKind>().is_err());
    }

    #[test]
    fn test_change_kind_display_round_trips() {
        for kind in [
            ChangeKind::Inserted,
            ChangeKind::Updated,
            ChangeKind::Deleted,
            ChangeKind::MarkedToDelete,
            ChangeKind::Cancelled,
        ] {
            assert_eq!(kind.to_string().parse::<ChangeKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_change_kind_serialization() {
        let json = serde_json::to_string(&ChangeKind::MarkedToDelete).unwrap();
        assert_eq!(json, "\"marked_to_delete\"");
    }

    #[test]
    fn test_removal_kinds() {
        assert!(!ChangeKind::Inserted.is_removal());
        assert!(!ChangeKind::Updated.is_removal());
        assert!(ChangeKind::Deleted.is_removal());
        assert!(ChangeKind::MarkedToDelete.is_removal());
        assert!(ChangeKind::Cancelled.is_removal());
    }

    #[test]
    fn test_search_options_builder() {
        let options = SearchOptions::new()
            .models(["User"])
            .fields(["name"])
            .except_fields(["age"])
            .add_wildcards()
            .include_entity()
            .sorted_by("name")
            .limit(5);

        assert_eq!(options.models.len(), 1);
        assert_eq!(options.models[0].name(), "User");
        assert_eq!(options.fields, Some(vec!["name".to_string()]));
        assert_eq!(options.except_fields, vec!["age".to_string()]);
        assert!(options.add_wildcards);
        assert!(!options.something);
        assert!(options.include_entity);
        assert_eq!(options.sorted_by.as_deref(), Some("name"));
        assert!(!options.reverse);
        assert_eq!(options.limit, Some(5));
    }

    #[test]
    fn test_model_ref_from_descriptor() {
        let descriptor = Arc::new(EntityDescriptor::new("Attribute").with_table("attributes"));
        let model = ModelRef::from(descriptor);
        assert_eq!(model.name(), "attributes");
    }
}
