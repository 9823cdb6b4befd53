//! Registry of per-entity indexes.
//!
//! The [`IndexRegistry`] is an explicit object the application constructs
//! once and shares (typically behind `Arc`). It owns every [`IndexHandle`]
//! and remembers the descriptor of each registered entity type, so the
//! federated search can map a `models` filter to handles.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use strata_core::{Error, Result, StrataConfig};

use crate::entity::{EntityDescriptor, EntityLoader, EntityRecord};
use crate::handle::IndexHandle;
use crate::schema::{derive_index_spec, FieldOptions, IndexSpec};
use crate::sync::EntitySync;
use crate::types::ChangeKind;

/// The handle currently registered under one name.
///
/// Shared between the registry and every [`EntitySync`] bound to the name,
/// so a re-registration is seen by existing bindings.
pub(crate) struct IndexSlot {
    handle: RwLock<Arc<IndexHandle>>,
}

impl IndexSlot {
    pub(crate) fn new(handle: Arc<IndexHandle>) -> Self {
        Self {
            handle: RwLock::new(handle),
        }
    }

    pub(crate) fn current(&self) -> Arc<IndexHandle> {
        Arc::clone(&self.handle.read())
    }
}

/// Owner of all index handles.
pub struct IndexRegistry {
    config: StrataConfig,
    loader: Option<Arc<dyn EntityLoader>>,
    handles: RwLock<BTreeMap<String, Arc<IndexSlot>>>,
    entities: RwLock<BTreeMap<String, Arc<EntityDescriptor>>>,
}

impl IndexRegistry {
    /// Create a registry, creating `config.indexes_path` if absent.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an invalid configuration and `Error::Io`
    /// if the storage root cannot be created.
    pub fn new(config: StrataConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.indexes_path)
            .map_err(|e| Error::io_with_path(e, &config.indexes_path))?;

        log::info!(
            "Index registry rooted at {}",
            config.indexes_path.display()
        );

        Ok(Self {
            config,
            loader: None,
            handles: RwLock::new(BTreeMap::new()),
            entities: RwLock::new(BTreeMap::new()),
        })
    }

    /// Attach the collaborator that rehydrates hits for `include_entity`.
    pub fn with_entity_loader(mut self, loader: Arc<dyn EntityLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Registry configuration.
    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    pub(crate) fn loader(&self) -> Option<Arc<dyn EntityLoader>> {
        self.loader.clone()
    }

    /// Open the index for `spec` and store it under `spec.name`.
    ///
    /// Re-registering a name replaces the stored handle, and bindings
    /// obtained earlier write through the replacement. The previous handle
    /// gives up its writer first; if the new index cannot be opened the
    /// previous handle keeps serving the name.
    ///
    /// # Errors
    ///
    /// Returns `Error::WriterTimeout` when the previous handle's writer stays
    /// busy past the bounded wait, otherwise whatever [`IndexHandle::open`]
    /// returns.
    pub fn register(&self, spec: IndexSpec) -> Result<Arc<IndexHandle>> {
        let name = spec.name.clone();
        let existing = self.handles.read().get(&name).cloned();

        let handle = match existing {
            Some(slot) => self.replace(&slot, spec)?,
            None => {
                let handle = Arc::new(IndexHandle::open(spec, &self.config)?);
                self.handles
                    .write()
                    .insert(name.clone(), Arc::new(IndexSlot::new(Arc::clone(&handle))));
                handle
            }
        };

        log::info!("Registered index '{name}'");
        Ok(handle)
    }

    fn replace(&self, slot: &IndexSlot, spec: IndexSpec) -> Result<Arc<IndexHandle>> {
        let mut current = slot.handle.write();
        // tantivy's directory lock belongs to the current writer
        current.release_writer(self.config.writer_timeout())?;

        match IndexHandle::open(spec, &self.config) {
            Ok(handle) => {
                let handle = Arc::new(handle);
                *current = Arc::clone(&handle);
                Ok(handle)
            }
            Err(e) => {
                if let Err(restore) = current.restore_writer(&self.config) {
                    log::warn!(
                        "Index '{}' lost its writer after a failed re-registration: {restore}",
                        current.name()
                    );
                }
                Err(e)
            }
        }
    }

    /// Derive, register and bind an entity type.
    ///
    /// Returns the [`EntitySync`] the ORM adapter installs as its post-save
    /// observer.
    pub fn register_model(
        &self,
        descriptor: EntityDescriptor,
        weighted: &[&str],
        options: FieldOptions,
    ) -> Result<EntitySync> {
        let spec = derive_index_spec(&descriptor, weighted, options)?;
        let name = spec.name.clone();
        self.register(spec)?;
        self.entities.write().insert(name.clone(), Arc::new(descriptor));
        self.sync(&name).ok_or_else(|| Error::not_found(&name, "index"))
    }

    /// Handle registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<Arc<IndexHandle>> {
        self.handles.read().get(name).map(|slot| slot.current())
    }

    /// Sync binding for the index registered under `name`.
    pub fn sync(&self, name: &str) -> Option<EntitySync> {
        let slot = self.handles.read().get(name).cloned()?;
        Some(EntitySync::bound(
            slot,
            self.loader.clone(),
            self.config.writer_timeout(),
        ))
    }

    /// All handles, sorted by name.
    pub fn all(&self) -> Vec<Arc<IndexHandle>> {
        self.handles
            .read()
            .values()
            .map(|slot| slot.current())
            .collect()
    }

    /// Descriptor of the entity registered under `name`.
    ///
    /// `name` is an index name or, failing that, an entity type name.
    pub fn entity(&self, name: &str) -> Option<Arc<EntityDescriptor>> {
        let entities = self.entities.read();
        entities
            .get(name)
            .or_else(|| entities.values().find(|d| d.type_name == name))
            .cloned()
    }

    /// All registered entity descriptors, sorted by index name.
    pub fn entities(&self) -> Vec<Arc<EntityDescriptor>> {
        self.entities.read().values().cloned().collect()
    }

    /// Forget every handle and entity. On-disk indexes are left in place.
    pub fn clear(&self) {
        let count = {
            let mut handles = self.handles.write();
            let count = handles.len();
            handles.clear();
            count
        };
        self.entities.write().clear();
        log::info!("Cleared {count} index handle(s)");
    }

    /// Propagate a change to the index registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown name, otherwise whatever
    /// [`EntitySync::on_entity_change`] returns.
    pub fn on_entity_change(
        &self,
        name: &str,
        entity: &dyn EntityRecord,
        kind: ChangeKind,
    ) -> Result<()> {
        let sync = self
            .sync(name)
            .ok_or_else(|| Error::not_found(name, "index"))?;
        sync.on_entity_change(entity, kind)
    }
}

impl std::fmt::Debug for IndexRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexRegistry")
            .field("indexes_path", &self.config.indexes_path)
            .field("indexes", &self.handles.read().keys().collect::<Vec<_>>())
            .field("has_loader", &self.loader.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
