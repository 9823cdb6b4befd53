//! Single-index search execution.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_core::{Error, Result};
use tantivy::collector::TopDocs;
use tantivy::{DocAddress, TantivyDocument};

use crate::document::SearchDocument;
use crate::handle::IndexHandle;
use crate::query::{matched_terms, MatchMode, QueryBuilder};
use crate::schema::FieldDefinition;
use crate::types::SearchOptions;

/// One hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Relevance score.
    pub score: f32,
    /// Stored field values in canonical text.
    pub fields: BTreeMap<String, String>,
    /// Rehydrated source entity, when requested and found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<Value>,
}

impl SearchHit {
    /// Canonical text of one stored field.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

/// Result of searching a single index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Wall time of the search in seconds.
    pub runtime: f64,
    /// Hits, by relevance or by the sort field.
    pub results: Vec<SearchHit>,
    /// Matched terms per field.
    pub matched_terms: BTreeMap<String, BTreeSet<String>>,
    /// Number of hits returned.
    pub count_results: usize,
}

impl SearchResult {
    /// Zero-valued result.
    pub fn empty() -> Self {
        Self::default()
    }
}

pub(crate) fn execute(handle: &IndexHandle, query: &str, options: &SearchOptions) -> Result<SearchResult> {
    let started = Instant::now();
    let settings = handle.settings();
    let query = query.trim();

    if query.chars().count() < settings.min_len {
        log::debug!("Query {query:?} shorter than {} chars, skipping", settings.min_len);
        return Ok(SearchResult::empty());
    }

    let spec = handle.spec();
    let searcher = handle.reader().searcher();
    let plan = QueryBuilder::new(spec, handle.index(), &searcher)
        .mode(MatchMode::from_options(options, settings.fuzzy_distance))
        .fields(options.fields.as_deref(), &options.except_fields)
        .build(query)?;

    let Some(plan) = plan else {
        return Ok(SearchResult {
            runtime: started.elapsed().as_secs_f64(),
            ..SearchResult::empty()
        });
    };

    let sort_field = options
        .sorted_by
        .as_deref()
        .and_then(|name| spec.attr(name).map(|definition| (name, *definition)))
        .filter(|(_, definition)| definition.is_sortable());
    let limit = options.limit.or(settings.default_limit);

    let fetch = match (sort_field, limit) {
        (None, Some(limit)) => limit,
        _ => usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX),
    }
    .max(1);

    let top_docs = searcher
        .search(&plan.query, &TopDocs::with_limit(fetch).order_by_score())
        .map_err(|e| Error::index(format!("Search failed: {e}")))?;

    let mut hits: Vec<(DocAddress, SearchHit)> = Vec::with_capacity(top_docs.len());
    for (score, address) in top_docs {
        let doc: TantivyDocument = searcher
            .doc(address)
            .map_err(|e| Error::index(format!("Failed to retrieve document: {e}")))?;
        let stored = SearchDocument::from_stored(spec, handle.schema(), &doc);
        hits.push((
            address,
            SearchHit {
                score,
                fields: stored.fields,
                entity: None,
            },
        ));
    }

    if let Some((name, definition)) = sort_field {
        hits.sort_by(|(_, a), (_, b)| compare_field(definition, a.get(name), b.get(name)));
        if options.reverse {
            hits.reverse();
        }
    }
    if let Some(limit) = limit {
        hits.truncate(limit);
    }

    let addresses: Vec<DocAddress> = hits.iter().map(|(address, _)| *address).collect();
    let matched_terms = matched_terms(&searcher, &plan.terms, &addresses)?;
    let results: Vec<SearchHit> = hits.into_iter().map(|(_, hit)| hit).collect();

    log::debug!(
        "Search {query:?} on '{}' returned {} hit(s)",
        spec.name,
        results.len()
    );

    Ok(SearchResult {
        runtime: started.elapsed().as_secs_f64(),
        count_results: results.len(),
        results,
        matched_terms,
    })
}

/// Natural order of two stored values; missing values sort last.
fn compare_field(definition: FieldDefinition, a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match definition {
            FieldDefinition::Numeric { .. } => {
                match (a.parse::<f64>(), b.parse::<f64>()) {
                    (Ok(x), Ok(y)) => x.total_cmp(&y),
                    _ => a.cmp(b),
                }
            }
            _ => a.cmp(b),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{DeclaredType, EntityDescriptor, FieldDescriptor};
    use crate::schema::{derive_index_spec, FieldOptions, NumericKind};
    use serde_json::json;
    use std::time::Duration;
    use strata_core::StrataConfig;

    fn handle(config: &StrataConfig) -> IndexHandle {
        let descriptor = EntityDescriptor::new("User")
            .with_field(FieldDescriptor::primary_key("id", DeclaredType::Int))
            .with_field(FieldDescriptor::new("name", DeclaredType::Str))
            .with_field(FieldDescriptor::new("age", DeclaredType::Int));
        let spec =
            derive_index_spec(&descriptor, &["name", "age"], FieldOptions::stored_sortable()).unwrap();
        let handle = IndexHandle::open_in_memory(spec, config).unwrap();

        let mut writer = handle.acquire_writer(Duration::from_secs(1)).unwrap();
        for value in [
            json!({"id": 1, "name": "jonathan", "age": 15}),
            json!({"id": 2, "name": "felipe", "age": 19}),
            json!({"id": 3, "name": "harol", "age": 16}),
            json!({"id": 4, "name": "felun", "age": 9}),
        ] {
            let dict = value.as_object().cloned().unwrap();
            let doc = SearchDocument::from_entity(handle.spec(), &dict);
            writer.add(handle.to_tantivy(&doc).unwrap()).unwrap();
        }
        writer.commit().unwrap();
        handle
    }

    fn ids(result: &SearchResult) -> Vec<&str> {
        result.results.iter().filter_map(|h| h.get("id")).collect()
    }

    #[test]
    fn test_exact_search() {
        let handle = handle(&StrataConfig::default());
        let result = handle.search("harol", &SearchOptions::new()).unwrap();

        assert_eq!(result.count_results, 1);
        assert_eq!(ids(&result), vec!["3"]);
        assert_eq!(result.results[0].get("name"), Some("harol"));
        assert_eq!(result.results[0].get("age"), Some("16"));
        assert!(result.matched_terms["name"].contains("harol"));
        assert!(result.runtime >= 0.0);
    }

    #[test]
    fn test_short_query_is_empty() {
        let handle = handle(&StrataConfig::default());
        let result = handle.search(" h ", &SearchOptions::new()).unwrap();
        assert_eq!(result, SearchResult::empty());
    }

    #[test]
    fn test_exact_misses_prefix() {
        let handle = handle(&StrataConfig::default());
        let result = handle.search("fel", &SearchOptions::new()).unwrap();
        assert_eq!(result.count_results, 0);
        assert!(result.matched_terms.is_empty());
    }

    #[test]
    fn test_wildcards_and_fuzzy() {
        let handle = handle(&StrataConfig::default());

        let wildcard = handle.search("fel", &SearchOptions::new().add_wildcards()).unwrap();
        assert_eq!(wildcard.count_results, 2);

        let fuzzy = handle.search("har", &SearchOptions::new().something()).unwrap();
        assert_eq!(ids(&fuzzy), vec!["3"]);
    }

    #[test]
    fn test_sorted_by_numeric_field() {
        let handle = handle(&StrataConfig::default());
        let options = SearchOptions::new().add_wildcards().sorted_by("age");

        // "a" appears in jonathan and harol; "e" in felipe; "u" in felun
        let result = handle.search("a e u", &options).unwrap();
        assert_eq!(ids(&result), vec!["4", "1", "3", "2"]);

        let reversed = handle.search("a e u", &options.clone().reverse()).unwrap();
        assert_eq!(ids(&reversed), vec!["2", "3", "1", "4"]);
    }

    #[test]
    fn test_sorted_by_unknown_field_is_ignored() {
        let handle = handle(&StrataConfig::default());
        let options = SearchOptions::new().add_wildcards().sorted_by("missing");
        let result = handle.search("fel", &options).unwrap();
        assert_eq!(result.count_results, 2);
    }

    #[test]
    fn test_limit_applies_after_sort() {
        let handle = handle(&StrataConfig::default());
        let options = SearchOptions::new()
            .add_wildcards()
            .sorted_by("age")
            .limit(2);
        let result = handle.search("a e u", &options).unwrap();
        assert_eq!(ids(&result), vec!["4", "1"]);
        assert_eq!(result.count_results, 2);
    }

    #[test]
    fn test_default_limit_from_config() {
        let config = StrataConfig {
            default_limit: Some(1),
            ..StrataConfig::default()
        };
        let handle = handle(&config);
        let result = handle.search("fel", &SearchOptions::new().add_wildcards()).unwrap();
        assert_eq!(result.count_results, 1);
    }

    #[test]
    fn test_numeric_literal_search() {
        let handle = handle(&StrataConfig::default());
        let result = handle
            .search("19", &SearchOptions::new().fields(["age"]))
            .unwrap();
        assert_eq!(ids(&result), vec!["2"]);
        assert!(result.matched_terms["age"].contains("19"));
    }

    #[test]
    fn test_matched_terms_limited_to_returned_hits() {
        let handle = handle(&StrataConfig::default());
        let options = SearchOptions::new().add_wildcards().fields(["name"]);
        let result = handle.search("fel", &options).unwrap();

        let names = &result.matched_terms["name"];
        assert_eq!(
            names.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["felipe", "felun"]
        );
    }

    #[test]
    fn test_compare_field() {
        let numeric = FieldDefinition::Numeric {
            numeric: NumericKind::Int,
            stored: true,
            sortable: true,
        };
        let text = FieldDefinition::Text {
            stored: true,
            sortable: true,
        };
        assert_eq!(compare_field(numeric, Some("9"), Some("15")), Ordering::Less);
        assert_eq!(compare_field(text, Some("9"), Some("15")), Ordering::Greater);
        assert_eq!(compare_field(text, Some("a"), None), Ordering::Less);
    }
}
