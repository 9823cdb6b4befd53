//! Query construction.
//!
//! A search string is never parsed as a query language. It is split on
//! whitespace and each word is analyzed with every target field's own
//! tokenizer, then turned into concrete index terms:
//!
//! | field kind | exact | `add_wildcards` | `something` |
//! |------------|-------|-----------------|-------------|
//! | text / identifier | the token | every dictionary term containing it | every dictionary term whose prefix is within the edit distance |
//! | numeric / boolean | the parsed literal | same as exact | same as exact |
//!
//! All terms are OR-ed into one `BooleanQuery`. The planned terms are kept
//! so the caller can report which of them matched the returned hits.

use std::collections::{BTreeMap, BTreeSet};

use strata_core::{Error, Result};
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::tokenizer::TokenStream;
use tantivy::{DocAddress, DocSet, Index, Searcher, Term, TERMINATED};

use crate::document::{format_float, schema_field};
use crate::schema::{FieldDefinition, IndexSpec, NumericKind};
use crate::types::SearchOptions;

/// How query tokens are matched against indexed terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Token equals the term.
    Exact,
    /// Term contains the token.
    Substring,
    /// Term prefix within the given Levenshtein distance of the token.
    FuzzyPrefix(u8),
}

impl MatchMode {
    /// Mode selected by the search options; wildcards win over fuzzy.
    pub fn from_options(options: &SearchOptions, fuzzy_distance: u8) -> Self {
        if options.add_wildcards {
            Self::Substring
        } else if options.something {
            Self::FuzzyPrefix(fuzzy_distance)
        } else {
            Self::Exact
        }
    }

    /// Whether an indexed term is matched by a query token.
    pub fn matches(&self, token: &str, term: &str) -> bool {
        match self {
            Self::Exact => token == term,
            Self::Substring => term.contains(token),
            Self::FuzzyPrefix(distance) => {
                let prefix: String = term.chars().take(token.chars().count()).collect();
                strsim::levenshtein(token, &prefix) <= usize::from(*distance)
            }
        }
    }
}

/// One concrete index term the query searches for.
#[derive(Debug, Clone)]
pub struct PlannedTerm {
    /// Schema field name.
    pub field_name: String,
    /// Schema field.
    pub field: Field,
    /// Index term.
    pub term: Term,
    /// Term text as reported in matched terms.
    pub text: String,
}

/// Built query plus the terms it is made of.
pub struct PlannedQuery {
    /// OR of all planned terms.
    pub query: BooleanQuery,
    /// Planned terms, without duplicates.
    pub terms: Vec<PlannedTerm>,
}

impl std::fmt::Debug for PlannedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannedQuery")
            .field("terms", &self.terms.len())
            .finish()
    }
}

/// Builds a [`PlannedQuery`] for one index.
pub struct QueryBuilder<'a> {
    spec: &'a IndexSpec,
    index: &'a Index,
    searcher: &'a Searcher,
    mode: MatchMode,
    fields: Option<&'a [String]>,
    except_fields: &'a [String],
}

impl<'a> QueryBuilder<'a> {
    /// Start a builder over all schema fields in exact mode.
    pub fn new(spec: &'a IndexSpec, index: &'a Index, searcher: &'a Searcher) -> Self {
        Self {
            spec,
            index,
            searcher,
            mode: MatchMode::Exact,
            fields: None,
            except_fields: &[],
        }
    }

    /// Set the match mode.
    pub fn mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Restrict to `fields` (when given), minus `except_fields`.
    pub fn fields(mut self, fields: Option<&'a [String]>, except_fields: &'a [String]) -> Self {
        self.fields = fields;
        self.except_fields = except_fields;
        self
    }

    /// Schema fields matching is done against, in declaration order.
    pub fn target_fields(&self) -> Vec<(&'a str, FieldDefinition)> {
        self.spec
            .schema_attrs
            .iter()
            .filter(|a| {
                self.fields
                    .is_none_or(|fields| fields.iter().any(|f| f == &a.name))
            })
            .filter(|a| !self.except_fields.iter().any(|f| f == &a.name))
            .map(|a| (a.name.as_str(), a.definition))
            .collect()
    }

    /// Plan the query; `None` when no field can contribute a term.
    pub fn build(&self, query: &str) -> Result<Option<PlannedQuery>> {
        let words: Vec<&str> = query.split_whitespace().collect();
        let mut seen = BTreeSet::new();
        let mut terms = Vec::new();
        let schema = self.index.schema();

        for (name, definition) in self.target_fields() {
            let field = schema_field(&schema, name)?;
            for planned in self.field_terms(name, field, definition, &words)? {
                if seen.insert((planned.field_name.clone(), planned.text.clone())) {
                    terms.push(planned);
                }
            }
        }

        if terms.is_empty() {
            return Ok(None);
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .iter()
            .map(|planned| {
                let record = match self.spec.attr(&planned.field_name) {
                    Some(FieldDefinition::Text { .. }) => IndexRecordOption::WithFreqs,
                    _ => IndexRecordOption::Basic,
                };
                (
                    Occur::Should,
                    Box::new(TermQuery::new(planned.term.clone(), record)) as Box<dyn Query>,
                )
            })
            .collect();

        log::debug!(
            "Planned {} term(s) on '{}' for {query:?} ({:?})",
            terms.len(),
            self.spec.name,
            self.mode
        );

        Ok(Some(PlannedQuery {
            query: BooleanQuery::new(clauses),
            terms,
        }))
    }

    fn field_terms(
        &self,
        name: &str,
        field: Field,
        definition: FieldDefinition,
        words: &[&str],
    ) -> Result<Vec<PlannedTerm>> {
        let planned = |term: Term, text: String| PlannedTerm {
            field_name: name.to_string(),
            field,
            term,
            text,
        };

        let planned_terms = match definition {
            FieldDefinition::Text { .. } | FieldDefinition::Identifier => {
                let tokens = self.tokenize(field, words)?;
                let texts = match self.mode {
                    MatchMode::Exact => tokens.into_iter().collect(),
                    mode => {
                        let dictionary = self.dictionary(field)?;
                        dictionary
                            .into_iter()
                            .filter(|term| tokens.iter().any(|token| mode.matches(token, term)))
                            .collect::<Vec<_>>()
                    }
                };
                texts
                    .into_iter()
                    .map(|text| planned(Term::from_field_text(field, &text), text))
                    .collect()
            }
            FieldDefinition::Numeric {
                numeric: NumericKind::Int,
                ..
            } => words
                .iter()
                .filter_map(|w| w.parse::<i64>().ok())
                .map(|v| planned(Term::from_field_i64(field, v), v.to_string()))
                .collect(),
            FieldDefinition::Numeric {
                numeric: NumericKind::Float,
                ..
            } => words
                .iter()
                .filter_map(|w| w.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .map(|v| planned(Term::from_field_f64(field, v), format_float(v)))
                .collect(),
            FieldDefinition::Boolean => words
                .iter()
                .filter_map(|w| w.to_ascii_lowercase().parse::<bool>().ok())
                .map(|v| planned(Term::from_field_bool(field, v), v.to_string()))
                .collect(),
        };

        Ok(planned_terms)
    }

    fn tokenize(&self, field: Field, words: &[&str]) -> Result<BTreeSet<String>> {
        let mut analyzer = self
            .index
            .tokenizer_for_field(field)
            .map_err(|e| Error::index(format!("No tokenizer for field: {e}")))?;

        let mut tokens = BTreeSet::new();
        for word in words {
            let mut stream = analyzer.token_stream(word);
            stream.process(&mut |token| {
                if !token.text.is_empty() {
                    tokens.insert(token.text.clone());
                }
            });
        }
        Ok(tokens)
    }

    /// Every term indexed for `field` across all segments.
    fn dictionary(&self, field: Field) -> Result<BTreeSet<String>> {
        let mut terms = BTreeSet::new();

        for segment_reader in self.searcher.segment_readers() {
            let inverted_index = segment_reader
                .inverted_index(field)
                .map_err(|e| Error::index(format!("Failed to open inverted index: {e}")))?;
            let mut stream = inverted_index
                .terms()
                .stream()
                .map_err(|e| Error::index(format!("Failed to stream terms: {e}")))?;

            while stream.advance() {
                if let Ok(text) = std::str::from_utf8(stream.key()) {
                    terms.insert(text.to_string());
                }
            }
        }

        Ok(terms)
    }
}

/// Planned terms whose postings contain at least one of `hits`, as
/// field name → term texts.
pub fn matched_terms(
    searcher: &Searcher,
    terms: &[PlannedTerm],
    hits: &[DocAddress],
) -> Result<BTreeMap<String, BTreeSet<String>>> {
    let mut by_segment: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for hit in hits {
        by_segment.entry(hit.segment_ord).or_default().push(hit.doc_id);
    }
    for docs in by_segment.values_mut() {
        docs.sort_unstable();
    }

    let mut matched: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for planned in terms {
        let found = by_segment.iter().try_fold(false, |found, (segment, docs)| {
            if found {
                return Ok::<_, Error>(true);
            }
            let inverted_index = searcher
                .segment_reader(*segment)
                .inverted_index(planned.field)
                .map_err(|e| Error::index(format!("Failed to open inverted index: {e}")))?;
            let postings = inverted_index
                .read_postings(&planned.term, IndexRecordOption::Basic)
                .map_err(|e| Error::index(format!("Failed to read postings: {e}")))?;

            let Some(mut postings) = postings else {
                return Ok(false);
            };
            for &doc in docs {
                let mut current = postings.doc();
                if current == TERMINATED {
                    break;
                }
                if current < doc {
                    current = postings.seek(doc);
                }
                if current == doc {
                    return Ok(true);
                }
            }
            Ok(false)
        })?;

        if found {
            matched
                .entry(planned.field_name.clone())
                .or_default()
                .insert(planned.text.clone());
        }
    }

    Ok(matched)
}

// ============================================================================
// Tests
// ============================================================================
