//! Query execution: parsed query -> scored documents -> projected results.
//!
//! A query runs against one acquired searcher snapshot for its whole
//! lifetime. Results come back as a lazy, finite, non-restartable iterator
//! that holds the searcher guard until dropped.

mod highlight;
mod operation;
mod parser;
mod spatial;

pub use operation::{QueryOperation, QueryResults};
pub use spatial::{SpatialIndexQuery, SpatialShape, SpatialStrategy};

pub(crate) use parser::{parse_clause, split_intersect};

use crate::definition::IndexDefinition;
use crate::error::Result;

/// Full query validation: every field referenced by the query text or the
/// sort specification must be indexed (or covered by the catch-all).
pub(crate) fn validate(query: &IndexQuery, definition: &IndexDefinition) -> Result<()> {
    parser::validate_fields(&query.query, definition)?;
    for sort in &query.sort_fields {
        if !definition.is_field_queryable(&sort.field) {
            return Err(crate::error::Error::FieldNotIndexed {
                field: sort.field.clone(),
            });
        }
    }
    Ok(())
}

use std::fmt;
use std::sync::Arc;

/// Separator splitting a raw query string into intersection sub-queries.
pub const INTERSECT_SEPARATOR: &str = " INTERSECT ";

/// Structured (field -> value) view of a hit's stored fields, possibly
/// rewritten by highlighting. Compared structurally for `distinct`.
pub type Projection = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    pub descending: bool,
}

impl SortField {
    pub fn ascending(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: false,
        }
    }

    pub fn descending(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HighlightedField {
    pub field: String,
    /// Maximum characters per fragment.
    pub fragment_length: usize,
    pub fragment_count: usize,
    /// Projection key receiving the fragments for projection and
    /// map/reduce results; defaults to `<field>_Fragments`.
    pub fragments_field: Option<String>,
}

impl HighlightedField {
    pub fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            fragment_length: 150,
            fragment_count: 3,
            fragments_field: None,
        }
    }
}

/// Predicate applied to each hit before it is returned; rejected hits are
/// skipped and counted.
pub type ResultPredicate = Arc<dyn Fn(&str, &Projection) -> bool + Send + Sync>;

/// One query as received from the caller.
#[derive(Clone, Default)]
pub struct IndexQuery {
    /// Raw query text; may contain ` INTERSECT ` separators. Empty or
    /// whitespace parses as match-all.
    pub query: String,
    pub start: usize,
    pub page_size: usize,
    /// Projection fields; empty fetches the whole stored entry.
    pub fields_to_fetch: Vec<String>,
    /// Sort order; a field may be `__distance` when a spatial query is set.
    pub sort_fields: Vec<SortField>,
    pub highlighted_fields: Vec<HighlightedField>,
    pub highlighter_pre_tags: Vec<String>,
    pub highlighter_post_tags: Vec<String>,
    pub explain_scores: bool,
    pub distinct: bool,
    pub skip_duplicate_checking: bool,
    pub spatial: Option<SpatialIndexQuery>,
    pub predicate: Option<ResultPredicate>,
}

impl IndexQuery {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            page_size: 128,
            ..Self::default()
        }
    }

    pub fn page(mut self, start: usize, page_size: usize) -> Self {
        self.start = start;
        self.page_size = page_size;
        self
    }

    pub fn sorted_by(mut self, field: SortField) -> Self {
        self.sort_fields.push(field);
        self
    }

    pub fn is_projection(&self) -> bool {
        !self.fields_to_fetch.is_empty()
    }
}

impl fmt::Debug for IndexQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexQuery")
            .field("query", &self.query)
            .field("start", &self.start)
            .field("page_size", &self.page_size)
            .field("fields_to_fetch", &self.fields_to_fetch)
            .field("sort_fields", &self.sort_fields)
            .field("distinct", &self.distinct)
            .field("skip_duplicate_checking", &self.skip_duplicate_checking)
            .finish_non_exhaustive()
    }
}

/// One returned hit.
#[derive(Debug, Clone)]
pub struct IndexQueryResult {
    pub key: Option<String>,
    pub projection: Projection,
    pub score: f32,
    /// Per-field highlight fragments for non-projection results.
    pub highlightings: std::collections::HashMap<String, Vec<String>>,
    pub score_explanation: Option<String>,
}
