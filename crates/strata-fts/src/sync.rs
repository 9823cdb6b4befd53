//! Entity change propagation.
//!
//! [`EntitySync`] is the write path: the ORM adapter reports every persisted
//! change through [`ChangeObserver::on_entity_change`] and the matching
//! document is added, replaced or removed in one writer transaction.
//!
//! | change | index operation |
//! |--------|-----------------|
//! | `inserted` | add |
//! | `updated` | delete by key, then add |
//! | `deleted`, `marked_to_delete`, `cancelled` | delete by key |

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use strata_core::{Error, Result};
use tantivy::{TantivyDocument, Term};

use crate::document::{canonical_text, typed_value, SearchDocument};
use crate::entity::{EntityKey, EntityLoader, EntityRecord};
use crate::handle::IndexHandle;
use crate::registry::IndexSlot;
use crate::search::SearchResult;
use crate::types::{ChangeKind, SearchOptions};

/// Observer the ORM adapter installs as its post-save hook.
pub trait ChangeObserver: Send + Sync {
    /// Propagate one persisted change.
    fn on_entity_change(&self, entity: &dyn EntityRecord, kind: ChangeKind) -> Result<()>;
}

/// Binding between one entity type and its index.
///
/// A binding obtained from the registry follows re-registrations of its
/// index name: every operation resolves the handle currently registered.
#[derive(Clone)]
pub struct EntitySync {
    slot: Arc<IndexSlot>,
    name: String,
    loader: Option<Arc<dyn EntityLoader>>,
    writer_timeout: Duration,
}

impl EntitySync {
    /// Bind a handle; `loader` serves `include_entity` searches.
    pub fn new(
        handle: Arc<IndexHandle>,
        loader: Option<Arc<dyn EntityLoader>>,
        writer_timeout: Duration,
    ) -> Self {
        Self::bound(Arc::new(IndexSlot::new(handle)), loader, writer_timeout)
    }

    pub(crate) fn bound(
        slot: Arc<IndexSlot>,
        loader: Option<Arc<dyn EntityLoader>>,
        writer_timeout: Duration,
    ) -> Self {
        let name = slot.current().name().to_string();
        Self {
            slot,
            name,
            loader,
            writer_timeout,
        }
    }

    /// The currently bound index.
    pub fn handle(&self) -> Arc<IndexHandle> {
        self.slot.current()
    }

    /// Index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bounded wait for the index writer.
    pub fn writer_timeout(&self) -> Duration {
        self.writer_timeout
    }

    /// Serialize an entity into a tantivy document for `handle`.
    pub fn document(
        &self,
        handle: &IndexHandle,
        entity: &dyn EntityRecord,
    ) -> Result<TantivyDocument> {
        let doc = SearchDocument::from_entity(handle.spec(), &entity.to_serializable_dict());
        handle.to_tantivy(&doc)
    }

    /// Index terms of the entity's current primary key in `handle`.
    pub fn key_terms(
        &self,
        handle: &IndexHandle,
        entity: &dyn EntityRecord,
    ) -> Result<Vec<Term>> {
        let values = entity
            .primary_key_value()
            .iter()
            .map(|value| {
                canonical_text(value).ok_or_else(|| {
                    Error::operation(format!("null primary key value for '{}'", self.name))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        handle.key_terms(&values)
    }

    /// Propagate one change: acquire, serialize, dispatch, commit.
    ///
    /// # Errors
    ///
    /// Returns `Error::WriterTimeout` when the writer stays busy past the
    /// bounded wait, `Error::InvalidValue` when a value does not fit its
    /// field, and `Error::Index` on engine failures. Nothing is committed on
    /// error.
    pub fn on_entity_change(&self, entity: &dyn EntityRecord, kind: ChangeKind) -> Result<()> {
        let handle = self.handle();
        let mut writer = handle.acquire_writer(self.writer_timeout)?;

        if kind.is_removal() {
            writer.delete_key(self.key_terms(&handle, entity)?)?;
        } else {
            let doc = self.document(&handle, entity)?;
            if kind == ChangeKind::Updated {
                writer.delete_key(self.key_terms(&handle, entity)?)?;
            }
            writer.add(doc)?;
        }

        writer.commit()?;
        log::debug!("Applied {kind} change to '{}'", self.name());
        Ok(())
    }

    /// Search the bound index, rehydrating entities when requested.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchResult> {
        let handle = self.handle();
        let mut result = handle.search(query, options)?;
        if options.include_entity {
            rehydrate(&handle, self.loader.as_deref(), &mut result)?;
        }
        Ok(result)
    }
}

impl ChangeObserver for EntitySync {
    fn on_entity_change(&self, entity: &dyn EntityRecord, kind: ChangeKind) -> Result<()> {
        EntitySync::on_entity_change(self, entity, kind)
    }
}

impl std::fmt::Debug for EntitySync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySync")
            .field("index", &self.name)
            .field("has_loader", &self.loader.is_some())
            .field("writer_timeout", &self.writer_timeout)
            .finish()
    }
}

/// Attach source entities to every hit of `result`.
///
/// Stored key texts are converted back to the key's declared types. Hits
/// whose stored key is incomplete are left without an entity.
pub(crate) fn rehydrate(
    handle: &IndexHandle,
    loader: Option<&dyn EntityLoader>,
    result: &mut SearchResult,
) -> Result<()> {
    let loader = loader
        .ok_or_else(|| Error::config("include_entity requires an entity loader"))?;
    let spec = handle.spec();

    for hit in &mut result.results {
        let fields: Option<Vec<(String, Value)>> = spec
            .primary_key
            .iter()
            .zip(&spec.key_types)
            .map(|(name, semantic)| {
                hit.get(name)
                    .map(|text| (name.clone(), typed_value(*semantic, text)))
            })
            .collect();
        let Some(fields) = fields else {
            continue;
        };

        let key = EntityKey {
            entity: spec.entity_type.clone(),
            fields,
        };
        hit.entity = loader.load(&key)?;
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
