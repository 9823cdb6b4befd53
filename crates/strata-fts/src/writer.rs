//! Scoped writer transactions.
//!
//! [`WriterGuard`] is the only way to mutate an index. It holds the handle's
//! writer lock for its whole lifetime and ends in exactly one of two ways:
//!
//! - [`WriterGuard::commit`] commits staged operations and reloads the reader,
//!   making them visible to the next search;
//! - dropping the guard uncommitted rolls staged operations back.

use parking_lot::MappedMutexGuard;
use strata_core::{Error, Result};
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::{IndexReader, IndexWriter, TantivyDocument, Term};

/// Exclusive writer transaction on one index.
pub struct WriterGuard<'a> {
    index_name: &'a str,
    writer: MappedMutexGuard<'a, IndexWriter>,
    reader: &'a IndexReader,
    staged: usize,
    committed: bool,
}

impl<'a> WriterGuard<'a> {
    pub(crate) fn new(
        index_name: &'a str,
        writer: MappedMutexGuard<'a, IndexWriter>,
        reader: &'a IndexReader,
    ) -> Self {
        Self {
            index_name,
            writer,
            reader,
            staged: 0,
            committed: false,
        }
    }

    /// Stage a new document.
    pub fn add(&mut self, doc: TantivyDocument) -> Result<()> {
        self.writer
            .add_document(doc)
            .map_err(|e| Error::index(format!("Failed to add document: {e}")))?;
        self.staged += 1;
        Ok(())
    }

    /// Stage removal of the documents matching every `(term)` of a key.
    ///
    /// A single-term key is a plain term delete; a composite key deletes the
    /// conjunction of its components.
    pub fn delete_key(&mut self, mut key: Vec<Term>) -> Result<()> {
        match key.len() {
            0 => return Err(Error::operation("cannot delete by an empty key")),
            1 => {
                if let Some(term) = key.pop() {
                    self.writer.delete_term(term);
                }
            }
            _ => {
                let clauses: Vec<(Occur, Box<dyn Query>)> = key
                    .into_iter()
                    .map(|term| {
                        (
                            Occur::Must,
                            Box::new(TermQuery::new(term, IndexRecordOption::Basic))
                                as Box<dyn Query>,
                        )
                    })
                    .collect();
                self.writer
                    .delete_query(Box::new(BooleanQuery::new(clauses)))
                    .map_err(|e| Error::index(format!("Failed to delete document: {e}")))?;
            }
        }
        self.staged += 1;
        Ok(())
    }

    /// Stage removal of every document.
    pub fn delete_all(&mut self) -> Result<()> {
        self.writer
            .delete_all_documents()
            .map_err(|e| Error::index(format!("Failed to clear index: {e}")))?;
        self.staged += 1;
        Ok(())
    }

    /// Commit staged operations without releasing the lock.
    pub fn commit_batch(&mut self) -> Result<()> {
        self.writer
            .commit()
            .map_err(|e| Error::index(format!("Failed to commit index: {e}")))?;
        self.reader
            .reload()
            .map_err(|e| Error::index(format!("Failed to reload reader: {e}")))?;
        self.staged = 0;
        Ok(())
    }

    /// Commit and release the writer.
    pub fn commit(mut self) -> Result<()> {
        self.commit_batch()?;
        self.committed = true;
        log::debug!("Committed writer transaction on '{}'", self.index_name);
        Ok(())
    }
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        if self.committed || self.staged == 0 {
            return;
        }
        log::warn!(
            "Rolling back {} uncommitted operation(s) on '{}'",
            self.staged,
            self.index_name
        );
        if let Err(e) = self.writer.rollback() {
            log::warn!("Rollback failed on '{}': {e}", self.index_name);
        }
    }
}

impl std::fmt::Debug for WriterGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterGuard")
            .field("index", &self.index_name)
            .field("staged", &self.staged)
            .field("committed", &self.committed)
            .finish()
    }
}
