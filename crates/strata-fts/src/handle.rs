//! Index handles.
//!
//! An [`IndexHandle`] owns one entity's tantivy index: the derived spec, the
//! physical location, the open `Index`, a manually reloaded reader and the
//! index's single writer behind a bounded-wait lock.
//!
//! The writer holds tantivy's directory lock. A handle that is being replaced
//! by a re-registration releases its writer first; afterwards every write
//! through the old handle fails with `Error::Index`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use strata_fts::{derive_index_spec, FieldOptions, IndexHandle};
//!
//! let spec = derive_index_spec(&descriptor, &["name"], FieldOptions::default())?;
//! let handle = IndexHandle::open(spec, &config)?;
//!
//! let mut writer = handle.acquire_writer(config.writer_timeout())?;
//! writer.add(doc)?;
//! writer.commit()?;
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use strata_core::{Error, Result, SchemaMismatchPolicy, StrataConfig};
use tantivy::schema::Schema;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Term};

use crate::document::{parse_bool, parse_float, parse_int, schema_field, SearchDocument};
use crate::metadata::{schema_fingerprint, IndexMetadata};
use crate::schema::{FieldDefinition, IndexSpec, NumericKind};
use crate::search::{self, SearchResult};
use crate::types::SearchOptions;
use crate::writer::WriterGuard;

/// Search settings copied from the configuration at open time.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SearchSettings {
    pub(crate) min_len: usize,
    pub(crate) fuzzy_distance: u8,
    pub(crate) default_limit: Option<usize>,
}

impl From<&StrataConfig> for SearchSettings {
    fn from(config: &StrataConfig) -> Self {
        Self {
            min_len: config.search_string_min_len,
            fuzzy_distance: config.fuzzy_distance,
            default_limit: config.default_limit,
        }
    }
}

/// Owned binding to one open full-text index.
pub struct IndexHandle {
    spec: IndexSpec,
    path: Option<PathBuf>,
    index: Index,
    schema: Schema,
    reader: IndexReader,
    writer: Mutex<Option<IndexWriter>>,
    settings: SearchSettings,
}

impl IndexHandle {
    /// Open the index at `indexes_path/spec.name`, creating it if needed.
    ///
    /// An existing index is reopened and its schema compared with the one
    /// derived from `spec`; a difference is handled per
    /// `config.schema_mismatch`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the directory cannot be created,
    /// `Error::SchemaMismatch` under the `reject` policy, and `Error::Index`
    /// for engine failures (surfaced unchanged).
    pub fn open(spec: IndexSpec, config: &StrataConfig) -> Result<Self> {
        let path = config.index_path(&spec.name);
        let schema = spec.build_schema();
        let expected = schema_fingerprint(&schema)?;

        let index = if path.join("meta.json").exists() {
            let index = Index::open_in_dir(&path)
                .map_err(|e| Error::index(format!("Failed to open index: {e}")))?;
            let found = schema_fingerprint(&index.schema())?;

            if found == expected {
                log::info!("Opened index '{}' at {}", spec.name, path.display());
                index
            } else {
                match config.schema_mismatch {
                    SchemaMismatchPolicy::Reject => {
                        return Err(Error::SchemaMismatch {
                            index: spec.name.clone(),
                            expected,
                            found,
                        });
                    }
                    SchemaMismatchPolicy::Ignore => {
                        log::warn!(
                            "Index '{}' schema {found} differs from derived {expected}; keeping stored schema",
                            spec.name
                        );
                        index
                    }
                    SchemaMismatchPolicy::Recreate => {
                        log::warn!(
                            "Index '{}' schema {found} differs from derived {expected}; recreating",
                            spec.name
                        );
                        drop(index);
                        std::fs::remove_dir_all(&path).map_err(|e| Error::io_with_path(e, &path))?;
                        create_on_disk(&spec, &path, schema, expected)?
                    }
                }
            }
        } else {
            create_on_disk(&spec, &path, schema, expected)?
        };

        Self::from_index(spec, Some(path), index, config)
    }

    /// Build a handle over an in-memory index.
    pub fn open_in_memory(spec: IndexSpec, config: &StrataConfig) -> Result<Self> {
        let index = Index::create_in_ram(spec.build_schema());
        Self::from_index(spec, None, index, config)
    }

    fn from_index(
        spec: IndexSpec,
        path: Option<PathBuf>,
        index: Index,
        config: &StrataConfig,
    ) -> Result<Self> {
        let writer = new_writer(&index, config)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| Error::index(format!("Failed to create index reader: {e}")))?;

        let schema = index.schema();

        Ok(Self {
            spec,
            path,
            index,
            schema,
            reader,
            writer: Mutex::new(Some(writer)),
            settings: SearchSettings::from(config),
        })
    }

    /// Index name.
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// The derived spec.
    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    /// On-disk location; `None` for in-memory indexes.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The tantivy schema in use.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Underlying tantivy index.
    pub fn index(&self) -> &Index {
        &self.index
    }

    pub(crate) fn reader(&self) -> &IndexReader {
        &self.reader
    }

    pub(crate) fn settings(&self) -> SearchSettings {
        self.settings
    }

    /// Number of searchable documents as of the last commit.
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Acquire the writer, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `Error::WriterTimeout` if another transaction still holds the
    /// writer when the wait elapses, and `Error::Index` if the writer was
    /// released because the handle has been replaced.
    pub fn acquire_writer(&self, timeout: Duration) -> Result<WriterGuard<'_>> {
        let guard = self
            .writer
            .try_lock_for(timeout)
            .ok_or_else(|| Error::writer_timeout(&self.spec.name, timeout))?;
        let writer = MutexGuard::try_map(guard, Option::as_mut).map_err(|_| {
            Error::index(format!("Index '{}' has been replaced", self.spec.name))
        })?;
        Ok(WriterGuard::new(&self.spec.name, writer, &self.reader))
    }

    /// Whether this handle can still write. Blocks while a transaction is
    /// open.
    pub fn is_writable(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// Drop the writer, releasing tantivy's directory lock.
    ///
    /// Waits at most `timeout` for an in-flight transaction.
    pub(crate) fn release_writer(&self, timeout: Duration) -> Result<()> {
        let mut guard = self
            .writer
            .try_lock_for(timeout)
            .ok_or_else(|| Error::writer_timeout(&self.spec.name, timeout))?;
        if guard.take().is_some() {
            log::debug!("Released writer of '{}'", self.spec.name);
        }
        Ok(())
    }

    /// Recreate a writer dropped by [`IndexHandle::release_writer`].
    pub(crate) fn restore_writer(&self, config: &StrataConfig) -> Result<()> {
        let mut guard = self.writer.lock();
        if guard.is_none() {
            *guard = Some(new_writer(&self.index, config)?);
            log::debug!("Restored writer of '{}'", self.spec.name);
        }
        Ok(())
    }

    /// Convert a serialized entity to a tantivy document.
    pub fn to_tantivy(&self, doc: &SearchDocument) -> Result<tantivy::TantivyDocument> {
        doc.to_tantivy(&self.spec, &self.schema)
    }

    /// Index terms identifying the document with the given key values.
    ///
    /// `values` are canonical texts in primary-key order.
    pub fn key_terms(&self, values: &[String]) -> Result<Vec<Term>> {
        if values.len() != self.spec.primary_key.len() {
            return Err(Error::operation(format!(
                "index '{}' expects {} key value(s), got {}",
                self.spec.name,
                self.spec.primary_key.len(),
                values.len()
            )));
        }

        self.spec
            .primary_key
            .iter()
            .zip(values)
            .map(|(name, text)| {
                let field = schema_field(&self.schema, name)?;
                let definition = self.spec.attr(name).copied().unwrap_or(FieldDefinition::Identifier);
                Ok(match definition {
                    FieldDefinition::Text { .. } | FieldDefinition::Identifier => {
                        Term::from_field_text(field, text)
                    }
                    FieldDefinition::Numeric {
                        numeric: NumericKind::Int,
                        ..
                    } => Term::from_field_i64(field, parse_int(name, text)?),
                    FieldDefinition::Numeric {
                        numeric: NumericKind::Float,
                        ..
                    } => Term::from_field_f64(field, parse_float(name, text)?),
                    FieldDefinition::Boolean => Term::from_field_bool(field, parse_bool(name, text)?),
                })
            })
            .collect()
    }

    /// Search this index alone.
    ///
    /// Honors the minimum length gate, wildcard/fuzzy translation, field
    /// include/exclude, sorting and limit. Entity rehydration is done by the
    /// callers that hold an entity loader.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchResult> {
        search::execute(self, query, options)
    }
}

fn new_writer(index: &Index, config: &StrataConfig) -> Result<IndexWriter> {
    let threads = config.writer_threads.max(1);
    index
        .writer_with_num_threads(threads, config.writer_memory_bytes * threads)
        .map_err(|e| Error::index(format!("Failed to create index writer: {e}")))
}

fn create_on_disk(spec: &IndexSpec, path: &Path, schema: Schema, fingerprint: String) -> Result<Index> {
    std::fs::create_dir_all(path).map_err(|e| Error::io_with_path(e, path))?;
    let index = Index::create_in_dir(path, schema)
        .map_err(|e| Error::index(format!("Failed to create index: {e}")))?;
    IndexMetadata::new(spec, fingerprint).save(path)?;
    log::info!("Created index '{}' at {}", spec.name, path.display());
    Ok(index)
}

impl std::fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle")
            .field("name", &self.spec.name)
            .field("path", &self.path)
            .field("fields", &self.spec.schema_attrs.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{DeclaredType, EntityDescriptor, FieldDescriptor};
    use crate::metadata::METADATA_FILE;
    use crate::schema::{derive_index_spec, FieldOptions};
    use serde_json::json;
    use tempfile::TempDir;

    fn spec(weighted: &[&str]) -> IndexSpec {
        let descriptor = EntityDescriptor::new("User")
            .with_field(FieldDescriptor::primary_key("id", DeclaredType::Int))
            .with_field(FieldDescriptor::new("name", DeclaredType::Str))
            .with_field(FieldDescriptor::new("age", DeclaredType::Int));
        derive_index_spec(&descriptor, weighted, FieldOptions::stored_sortable()).unwrap()
    }

    fn doc(handle: &IndexHandle, value: serde_json::Value) -> tantivy::TantivyDocument {
        let dict = value.as_object().cloned().unwrap();
        handle
            .to_tantivy(&SearchDocument::from_entity(handle.spec(), &dict))
            .unwrap()
    }

    #[test]
    fn test_open_creates_directory_and_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let config = StrataConfig::with_indexes_path(temp_dir.path().join("nested"));

        let handle = IndexHandle::open(spec(&[]), &config).unwrap();

        let path = temp_dir.path().join("nested").join("User");
        assert_eq!(handle.path(), Some(path.as_path()));
        assert!(path.join("meta.json").exists());
        assert!(path.join(METADATA_FILE).exists());
        assert_eq!(handle.num_docs(), 0);
    }

    #[test]
    fn test_reopen_keeps_documents() {
        let temp_dir = TempDir::new().unwrap();
        let config = StrataConfig::with_indexes_path(temp_dir.path());

        {
            let handle = IndexHandle::open(spec(&[]), &config).unwrap();
            let mut writer = handle.acquire_writer(config.writer_timeout()).unwrap();
            writer.add(doc(&handle, json!({"id": 1, "name": "harol"}))).unwrap();
            writer.commit().unwrap();
            // handle is dropped here, releasing the directory lock
        }

        let handle = IndexHandle::open(spec(&[]), &config).unwrap();
        assert_eq!(handle.num_docs(), 1);
    }

    #[test]
    fn test_reopen_with_changed_schema_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config = StrataConfig::with_indexes_path(temp_dir.path());

        drop(IndexHandle::open(spec(&[]), &config).unwrap());
        let result = IndexHandle::open(spec(&["age"]), &config);

        assert!(matches!(result, Err(Error::SchemaMismatch { .. })));
    }

    #[test]
    fn test_reopen_with_changed_schema_recreates() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = StrataConfig::with_indexes_path(temp_dir.path());

        {
            let handle = IndexHandle::open(spec(&[]), &config).unwrap();
            let mut writer = handle.acquire_writer(config.writer_timeout()).unwrap();
            writer.add(doc(&handle, json!({"id": 1, "name": "harol"}))).unwrap();
            writer.commit().unwrap();
        }

        config.schema_mismatch = SchemaMismatchPolicy::Recreate;
        let handle = IndexHandle::open(spec(&["age"]), &config).unwrap();

        assert_eq!(handle.num_docs(), 0);
        assert_eq!(
            schema_fingerprint(handle.schema()).unwrap(),
            schema_fingerprint(&spec(&["age"]).build_schema()).unwrap()
        );
    }

    #[test]
    fn test_reopen_with_changed_schema_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = StrataConfig::with_indexes_path(temp_dir.path());

        drop(IndexHandle::open(spec(&[]), &config).unwrap());
        config.schema_mismatch = SchemaMismatchPolicy::Ignore;
        let handle = IndexHandle::open(spec(&["age"]), &config).unwrap();

        assert_eq!(
            schema_fingerprint(handle.schema()).unwrap(),
            schema_fingerprint(&spec(&[]).build_schema()).unwrap()
        );
    }

    #[test]
    fn test_writer_timeout() {
        let config = StrataConfig::default();
        let handle = IndexHandle::open_in_memory(spec(&[]), &config).unwrap();

        let _held = handle.acquire_writer(Duration::from_millis(10)).unwrap();
        let result = handle.acquire_writer(Duration::from_millis(20));

        assert!(matches!(result, Err(Error::WriterTimeout { .. })));
    }

    #[test]
    fn test_writer_released_after_commit() {
        let config = StrataConfig::default();
        let handle = IndexHandle::open_in_memory(spec(&[]), &config).unwrap();

        let writer = handle.acquire_writer(Duration::from_millis(10)).unwrap();
        writer.commit().unwrap();

        assert!(handle.acquire_writer(Duration::from_millis(10)).is_ok());
    }

    #[test]
    fn test_dropped_writer_rolls_back() {
        let config = StrataConfig::default();
        let handle = IndexHandle::open_in_memory(spec(&[]), &config).unwrap();

        {
            let mut writer = handle.acquire_writer(Duration::from_millis(10)).unwrap();
            writer.add(doc(&handle, json!({"id": 1, "name": "harol"}))).unwrap();
            // dropped without commit
        }

        let writer = handle.acquire_writer(Duration::from_millis(10)).unwrap();
        writer.commit().unwrap();
        assert_eq!(handle.num_docs(), 0);
    }

    #[test]
    fn test_delete_key() {
        let config = StrataConfig::default();
        let handle = IndexHandle::open_in_memory(spec(&[]), &config).unwrap();

        let mut writer = handle.acquire_writer(Duration::from_millis(10)).unwrap();
        writer.add(doc(&handle, json!({"id": 1, "name": "a"}))).unwrap();
        writer.add(doc(&handle, json!({"id": 2, "name": "b"}))).unwrap();
        writer.commit().unwrap();
        assert_eq!(handle.num_docs(), 2);

        let mut writer = handle.acquire_writer(Duration::from_millis(10)).unwrap();
        writer.delete_key(handle.key_terms(&["1".to_string()]).unwrap()).unwrap();
        writer.commit().unwrap();
        assert_eq!(handle.num_docs(), 1);
    }

    #[test]
    fn test_key_terms_arity() {
        let config = StrataConfig::default();
        let handle = IndexHandle::open_in_memory(spec(&[]), &config).unwrap();
        assert!(handle.key_terms(&[]).is_err());
        assert!(handle.key_terms(&["1".into(), "2".into()]).is_err());
    }

    #[test]
    fn test_released_writer_frees_directory_lock() {
        let temp_dir = TempDir::new().unwrap();
        let config = StrataConfig::with_indexes_path(temp_dir.path());
        let first = IndexHandle::open(spec(&[]), &config).unwrap();

        // a second writer on the same directory is refused while the first lives
        assert!(IndexHandle::open(spec(&[]), &config).is_err());

        first.release_writer(Duration::from_millis(10)).unwrap();
        assert!(!first.is_writable());
        let second = IndexHandle::open(spec(&[]), &config).unwrap();
        assert!(second.is_writable());

        let result = first.acquire_writer(Duration::from_millis(10));
        assert!(matches!(result, Err(Error::Index { .. })));
    }

    #[test]
    fn test_restore_writer() {
        let config = StrataConfig::default();
        let handle = IndexHandle::open_in_memory(spec(&[]), &config).unwrap();

        handle.release_writer(Duration::from_millis(10)).unwrap();
        handle.restore_writer(&config).unwrap();

        let mut writer = handle.acquire_writer(Duration::from_millis(10)).unwrap();
        writer.add(doc(&handle, json!({"id": 1, "name": "harol"}))).unwrap();
        writer.commit().unwrap();
        assert_eq!(handle.num_docs(), 1);
    }

    #[test]
    fn test_release_waits_for_transaction() {
        let config = StrataConfig::default();
        let handle = IndexHandle::open_in_memory(spec(&[]), &config).unwrap();

        let _held = handle.acquire_writer(Duration::from_millis(10)).unwrap();
        let result = handle.release_writer(Duration::from_millis(20));
        assert!(matches!(result, Err(Error::WriterTimeout { .. })));
    }

    #[test]
    fn test_handle_debug() {
        let handle = IndexHandle::open_in_memory(spec(&[]), &StrataConfig::default()).unwrap();
        let debug = format!("{:?}", handle);
        assert!(debug.contains("IndexHandle"));
        assert!(debug.contains("User"));
    }
}
