//! Federated full-text search over per-entity indexes.
//!
//! Every registered entity type gets its own tantivy index whose schema is
//! derived from the entity's declared fields. The ORM reports persisted
//! changes and the matching documents are kept in step; queries fan out to
//! any subset of the indexes and come back as one merged result.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      strata-fts                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SearchBackend trait (federated fan-out + merge)            │
//! │  └── IndexRegistry (handles + entity descriptors)           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  EntitySync (change propagation, ChangeObserver)            │
//! │  IndexBuilder (bulk reindex)                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  IndexHandle (index, reader, bounded-wait writer)           │
//! │  QueryBuilder (exact / substring / fuzzy-prefix terms)      │
//! │  SearchDocument (canonical text values)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  derive_index_spec → IndexSpec → tantivy Schema             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_core::StrataConfig;
//! use strata_fts::{ChangeKind, FieldOptions, IndexRegistry, SearchBackend, SearchOptions};
//!
//! let registry = IndexRegistry::new(StrataConfig::with_indexes_path("indexes"))?;
//! let users = registry.register_model(user_descriptor, &["name", "age"], FieldOptions::stored_sortable())?;
//!
//! // from the ORM's post-save hook
//! users.on_entity_change(&user, ChangeKind::Inserted)?;
//!
//! let results = registry
//!     .search("fel", &SearchOptions::new().add_wildcards())
//!     .await?;
//! for (index, hits) in &results.results {
//!     println!("{index}: {} hit(s)", hits.items.len());
//! }
//! ```

pub mod backend;
pub mod builder;
pub mod document;
pub mod entity;
pub mod handle;
pub mod metadata;
pub mod query;
pub mod registry;
pub mod schema;
pub mod search;
pub mod sync;
pub mod types;
pub mod writer;

// Re-exports
pub use backend::{full_search, AggregatedResult, IndexResults, SearchBackend};
pub use builder::{IndexBuilder, IndexStats};
pub use document::SearchDocument;
pub use entity::{
    DeclaredType, EntityDescriptor, EntityKey, EntityLoader, EntityRecord, FieldDescriptor,
};
pub use handle::IndexHandle;
pub use metadata::IndexMetadata;
pub use query::{MatchMode, QueryBuilder};
pub use registry::IndexRegistry;
pub use schema::{derive_index_spec, FieldDefinition, FieldOptions, IndexSpec, SemanticType};
pub use search::{SearchHit, SearchResult};
pub use sync::{ChangeObserver, EntitySync};
pub use types::{ChangeKind, ModelRef, SearchOptions};
pub use writer::WriterGuard;

pub use strata_core::{Error, Result, StrataConfig};
