//! Bulk reindexing.
//!
//! `IndexBuilder` rebuilds an entity's index from rows that already exist in
//! the relational store, for example after a schema change recreated the
//! index empty. The whole rebuild runs under one writer lock; documents are
//! committed in batches.
//!
//! # Usage
//!
//! ```rust,ignore
//! use strata_fts::IndexBuilder;
//!
//! let sync = registry.register_model(descriptor, &["name"], options)?;
//! let stats = IndexBuilder::new()
//!     .with_batch_size(500)
//!     .build(&sync, users.iter())?;
//! println!("Indexed {} documents", stats.documents_indexed);
//! ```

use strata_core::Result;

use crate::entity::EntityRecord;
use crate::sync::EntitySync;

/// Statistics about a reindex.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Number of documents successfully indexed.
    pub documents_indexed: usize,
    /// Number of commits, including the final one.
    pub batches_committed: usize,
    /// Number of records skipped because they could not be serialized.
    pub errors: usize,
}

/// Batch index builder.
pub struct IndexBuilder {
    batch_size: usize,
}

impl IndexBuilder {
    /// Create a builder committing every 100 documents.
    pub fn new() -> Self {
        Self { batch_size: 100 }
    }

    /// Set the batch size for commits.
    ///
    /// Documents are committed in batches to balance memory usage and I/O.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Replace the index content with `records`.
    ///
    /// This method:
    /// 1. Acquires the index writer with the sync's bounded wait
    /// 2. Deletes every existing document
    /// 3. Adds one document per record, committing every batch
    /// 4. Commits the remainder
    ///
    /// # Errors
    ///
    /// Returns an error if the writer cannot be acquired or a commit fails.
    /// Records that fail to serialize are logged, counted and skipped.
    pub fn build<I, R>(&self, sync: &EntitySync, records: I) -> Result<IndexStats>
    where
        I: IntoIterator<Item = R>,
        R: EntityRecord,
    {
        log::info!("Rebuilding index '{}'", sync.name());

        let handle = sync.handle();
        let mut writer = handle.acquire_writer(sync.writer_timeout())?;
        writer.delete_all()?;

        let mut stats = IndexStats::default();
        let mut batch_count = 0;

        for record in records {
            let doc = match sync.document(&handle, &record) {
                Ok(doc) => doc,
                Err(e) => {
                    log::warn!("Skipped record for '{}': {e}", sync.name());
                    stats.errors += 1;
                    continue;
                }
            };

            writer.add(doc)?;
            stats.documents_indexed += 1;
            batch_count += 1;

            if batch_count >= self.batch_size {
                writer.commit_batch()?;
                stats.batches_committed += 1;
                batch_count = 0;
            }
        }

        // Final commit, also publishes the delete of an empty rebuild
        writer.commit()?;
        stats.batches_committed += 1;

        log::info!(
            "Indexed {} documents into '{}' ({} batches, {} errors)",
            stats.documents_indexed,
            sync.name(),
            stats.batches_committed,
            stats.errors
        );

        Ok(stats)
    }
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IndexBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexBuilder")
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
