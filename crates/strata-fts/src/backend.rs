//! Federated search backend.
//!
//! This module defines the `SearchBackend` trait and the federated result
//! types. The registry implementation fans a query out to every selected
//! index on tokio's blocking pool and merges the per-index results.
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_fts::{full_search, SearchBackend, SearchOptions};
//!
//! let options = SearchOptions::new().models(["User"]).add_wildcards();
//! let results = registry.search("fel", &options).await?;
//! println!("Found {} results in {:.3}s", results.count_results, results.runtime);
//!
//! // same thing, as a free function
//! let results = full_search(&registry, "fel", &options).await?;
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use strata_core::{Error, Result};

use crate::entity::EntityLoader;
use crate::handle::IndexHandle;
use crate::registry::IndexRegistry;
use crate::search::{SearchHit, SearchResult};
use crate::sync::rehydrate;
use crate::types::{ModelRef, SearchOptions};

/// Hits and matched terms of one index within a federated result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexResults {
    /// Hits of this index.
    pub items: Vec<SearchHit>,

    /// Matched terms per field for this index.
    pub matched_terms: BTreeMap<String, BTreeSet<String>>,
}

/// Merged result of a federated search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    /// Sum of per-index runtimes, in seconds.
    pub runtime: f64,

    /// Per-index results; indexes without hits are omitted.
    pub results: BTreeMap<String, IndexResults>,

    /// Union of matched terms per field, sorted.
    pub matched_terms: BTreeMap<String, Vec<String>>,

    /// Total hits across indexes.
    pub count_results: usize,
}

impl AggregatedResult {
    /// Zero-valued result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fold one index's result in.
    fn merge(&mut self, index: String, result: SearchResult) {
        self.runtime += result.runtime;
        self.count_results += result.count_results;

        let mut union: BTreeMap<String, BTreeSet<String>> = std::mem::take(&mut self.matched_terms)
            .into_iter()
            .map(|(field, terms)| (field, terms.into_iter().collect()))
            .collect();
        for (field, terms) in &result.matched_terms {
            union.entry(field.clone()).or_default().extend(terms.iter().cloned());
        }
        self.matched_terms = union
            .into_iter()
            .map(|(field, terms)| (field, terms.into_iter().collect()))
            .collect();

        if !result.results.is_empty() {
            self.results.insert(
                index,
                IndexResults {
                    items: result.results,
                    matched_terms: result.matched_terms,
                },
            );
        }
    }
}

/// Abstract federated search backend.
///
/// # Async
///
/// `search` is async so callers on an async runtime never block on index
/// I/O; implementations move the blocking work off the runtime threads.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Search every selected index and merge the results.
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<AggregatedResult>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

#[async_trait]
impl SearchBackend for IndexRegistry {
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<AggregatedResult> {
        let query = query.trim();
        let min_len = self.config().search_string_min_len;
        if query.chars().count() < min_len {
            log::debug!("Query {query:?} shorter than {min_len} chars, skipping");
            return Ok(AggregatedResult::empty());
        }

        let handles = select_handles(self, options);
        if handles.is_empty() {
            log::debug!("No index selected for {query:?}");
            return Ok(AggregatedResult::empty());
        }
        let loader = self.loader();
        if options.include_entity && loader.is_none() {
            return Err(Error::config("include_entity requires an entity loader"));
        }

        let tasks = handles.into_iter().map(|handle| {
            let query = query.to_string();
            let options = options.clone();
            let loader = loader.clone();
            async move {
                tokio::task::spawn_blocking(move || search_one(&handle, &query, &options, loader))
                    .await
                    .map_err(|e| Error::operation(format!("Search task failed: {e}")))
                    .and_then(|result| result)
            }
        });

        let mut aggregated = AggregatedResult::empty();
        for (name, result) in try_join_all(tasks).await? {
            aggregated.merge(name, result);
        }

        log::debug!(
            "Federated search {query:?}: {} hit(s) in {} index(es)",
            aggregated.count_results,
            aggregated.results.len()
        );
        Ok(aggregated)
    }

    fn name(&self) -> &str {
        "tantivy"
    }
}

/// Federated search over `registry`.
pub async fn full_search(
    registry: &IndexRegistry,
    query: &str,
    options: &SearchOptions,
) -> Result<AggregatedResult> {
    registry.search(query, options).await
}

/// Handles for the requested models.
///
/// Unknown models are dropped; when none of the requested models resolves
/// (or none was requested) every registered entity is searched.
fn select_handles(registry: &IndexRegistry, options: &SearchOptions) -> Vec<Arc<IndexHandle>> {
    let mut names: BTreeSet<String> = options
        .models
        .iter()
        .filter_map(|model| resolve_model(registry, model))
        .collect();

    if names.is_empty() {
        if !options.models.is_empty() {
            log::debug!("No requested model is registered, searching all indexes");
        }
        names = registry
            .entities()
            .iter()
            .map(|descriptor| descriptor.index_name().to_string())
            .collect();
    }

    names.iter().filter_map(|name| registry.lookup(name)).collect()
}

fn resolve_model(registry: &IndexRegistry, model: &ModelRef) -> Option<String> {
    registry
        .entity(model.name())
        .map(|descriptor| descriptor.index_name().to_string())
}

fn search_one(
    handle: &IndexHandle,
    query: &str,
    options: &SearchOptions,
    loader: Option<Arc<dyn EntityLoader>>,
) -> Result<(String, SearchResult)> {
    let mut result = handle.search(query, options)?;
    if options.include_entity {
        rehydrate(handle, loader.as_deref(), &mut result)?;
    }
    Ok((handle.name().to_string(), result))
}

// ============================================================================
// Tests
// ============================================================================
