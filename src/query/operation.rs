//! The per-request query operation.
//!
//! Executes a parsed query against one searcher snapshot and yields results
//! as a pull-based iterator. Fan-out indexes can emit several entries per
//! source document, so pages are filled with an over-fetching loop that
//! suppresses keys already returned on earlier pages.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tantivy::collector::{Count, DocSetCollector, TopDocs};
use tantivy::query::Query;
use tantivy::{DocAddress, TantivyDocument};
use tracing::{debug, warn};

use crate::context::CancellationToken;
use crate::definition::{IndexDefinition, SchemaFields};
use crate::entry::{
    is_reserved_marker_name, CATCH_ALL_FIELD, CONVERT_TO_JSON_SUFFIX, DISTANCE_FIELD,
    DOCUMENT_ID_FIELD, IS_ARRAY_SUFFIX, RANGE_SUFFIX, REDUCE_KEY_FIELD,
};
use crate::error::Result;
use crate::index::holder::SearcherGuard;
use crate::query::highlight::FieldHighlighter;
use crate::query::{IndexQuery, IndexQueryResult, Projection};

#[derive(Debug)]
pub(crate) struct CapturedSearch {
    pub hits: Vec<(f32, DocAddress)>,
    pub total_hits: usize,
}

/// One in-flight query over one searcher snapshot.
pub struct QueryOperation {
    guard: SearcherGuard,
    definition: Arc<IndexDefinition>,
    query: IndexQuery,
    main_query: Box<dyn Query>,
    /// INTERSECT clauses beyond the first.
    intersect_rest: Vec<Box<dyn Query>>,
    highlighters: Vec<FieldHighlighter>,
    fan_out_factor: usize,
    token: CancellationToken,
}

impl std::fmt::Debug for QueryOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOperation")
            .field("fan_out_factor", &self.fan_out_factor)
            .finish_non_exhaustive()
    }
}

impl QueryOperation {
    pub(crate) fn new(
        guard: SearcherGuard,
        definition: Arc<IndexDefinition>,
        schema_fields: &SchemaFields,
        query: IndexQuery,
        mut clauses: Vec<Box<dyn Query>>,
        fan_out_factor: usize,
        token: CancellationToken,
    ) -> Result<QueryOperation> {
        let main_query = clauses.remove(0);

        let mut highlight_fields = Vec::new();
        for config in &query.highlighted_fields {
            match schema_fields.text_field(&config.field) {
                Some(field) => highlight_fields.push((config.clone(), field)),
                None => warn!(field = %config.field, "highlighted field not in schema, skipped"),
            }
        }
        let highlighters = FieldHighlighter::build_all(
            guard.searcher(),
            main_query.as_ref(),
            &highlight_fields,
            &query.highlighter_pre_tags,
            &query.highlighter_post_tags,
        )?;

        Ok(QueryOperation {
            guard,
            definition,
            query,
            main_query,
            intersect_rest: clauses,
            highlighters,
            fan_out_factor: fan_out_factor.max(1),
            token,
        })
    }

    /// Run the initial search and wrap everything into the result iterator.
    pub(crate) fn into_results(self) -> Result<QueryResults> {
        let search = if self.intersect_rest.is_empty() {
            self.execute_search(self.query.page_size.max(1))?
        } else {
            self.execute_intersect()?
        };
        QueryResults::seeded(self, search)
    }

    fn execute_search(&self, docs_to_get: usize) -> Result<CapturedSearch> {
        let searcher = self.guard.searcher();
        if self.query.sort_fields.is_empty() {
            let limit = (self.query.start + docs_to_get).max(1);
            let (hits, total_hits) = searcher.search(
                self.main_query.as_ref(),
                &(TopDocs::with_limit(limit), Count),
            )?;
            return Ok(CapturedSearch { hits, total_hits });
        }

        // Sorted queries gather every match and order by the sort keys; the
        // captured list is the complete result set, so refills never rerun.
        let addresses = searcher.search(self.main_query.as_ref(), &DocSetCollector)?;
        let mut keyed: Vec<(Vec<SortValue>, DocAddress)> = addresses
            .into_iter()
            .map(|address| (self.sort_key(address), address))
            .collect();
        keyed.sort_by(|a, b| {
            compare_sort_keys(&a.0, &b.0, &self.query.sort_fields)
                .then_with(|| a.1.cmp(&b.1))
        });
        let total_hits = keyed.len();
        let hits = keyed.into_iter().map(|(_, address)| (1.0, address)).collect();
        Ok(CapturedSearch { hits, total_hits })
    }

    /// The first clause ran as the base query; every further clause
    /// contributes a doc-set that hits must also belong to. The base page
    /// size doubles until the intersection fills the requested page or the
    /// base query runs dry.
    fn execute_intersect(&self) -> Result<CapturedSearch> {
        let searcher = self.guard.searcher();
        let mut match_counts: HashMap<DocAddress, usize> = HashMap::new();
        for clause in &self.intersect_rest {
            for address in searcher.search(clause.as_ref(), &DocSetCollector)? {
                *match_counts.entry(address).or_insert(0) += 1;
            }
        }
        let required = self.intersect_rest.len();
        let needed = self.query.start + self.query.page_size.max(1);

        let mut docs_to_get = self.query.page_size.max(1);
        let mut previous_hit_count = 0usize;
        loop {
            let base = self.execute_search(docs_to_get)?;
            let intersected: Vec<(f32, DocAddress)> = base
                .hits
                .iter()
                .filter(|(_, address)| match_counts.get(address) == Some(&required))
                .cloned()
                .collect();

            let base_exhausted = base.hits.len() >= base.total_hits;
            let base_grew = base.hits.len() > previous_hit_count;
            if intersected.len() >= needed || base_exhausted || !base_grew {
                debug!(
                    intersected = intersected.len(),
                    base_hits = base.hits.len(),
                    "intersection complete"
                );
                return Ok(CapturedSearch {
                    total_hits: intersected.len(),
                    hits: intersected,
                });
            }
            previous_hit_count = base.hits.len();
            docs_to_get *= 2;
        }
    }

    fn sort_key(&self, address: DocAddress) -> Vec<SortValue> {
        self.query
            .sort_fields
            .iter()
            .map(|sort| self.sort_value(address, &sort.field))
            .collect()
    }

    fn sort_value(&self, address: DocAddress, field: &str) -> SortValue {
        if field == DISTANCE_FIELD {
            return match (&self.query.spatial, self.guard.stored_for(address)) {
                (Some(spatial), Some(stored)) => spatial
                    .distance_km(stored)
                    .map(SortValue::Number)
                    .unwrap_or(SortValue::Null),
                _ => SortValue::Null,
            };
        }
        let Some(stored) = self.guard.stored_for(address) else {
            return SortValue::Null;
        };
        let range_name = if field.ends_with(RANGE_SUFFIX) {
            field.to_string()
        } else {
            format!("{field}{RANGE_SUFFIX}")
        };
        for (name, value) in stored {
            if *name == range_name {
                if let Some(number) = value.as_f64() {
                    return SortValue::Number(number);
                }
            }
        }
        for (name, value) in stored {
            if name == field {
                if let Some(text) = value.as_str() {
                    return SortValue::Text(text.to_string());
                }
            }
        }
        SortValue::Null
    }

    fn spatial_matches(&self, address: DocAddress) -> bool {
        match &self.query.spatial {
            None => true,
            Some(spatial) => self
                .guard
                .stored_for(address)
                .map(|stored| spatial.matches(stored))
                .unwrap_or(false),
        }
    }

    /// Rebuild the stored projection of one hit, filtering the reserved
    /// marker fields and applying the `_IsArray` / `_ConvertToJson` hints.
    fn project(&self, address: DocAddress) -> (Option<String>, Projection) {
        let stored = self.guard.stored_for(address).cloned().unwrap_or_default();

        let mut flat: Vec<(String, serde_json::Value)> = Vec::new();
        for (name, value) in stored {
            if name == CATCH_ALL_FIELD {
                if let serde_json::Value::Object(map) = value {
                    flat.extend(map.into_iter());
                }
            } else {
                flat.push((name, value));
            }
        }

        let key = flat.iter().find_map(|(name, value)| {
            (name == DOCUMENT_ID_FIELD)
                .then(|| value.as_str().map(str::to_string))
                .flatten()
        });

        let mut projection = Projection::new();
        if self.query.is_projection() {
            for wanted in &self.query.fields_to_fetch {
                if wanted == DOCUMENT_ID_FIELD {
                    if let Some(key) = &key {
                        projection.insert(wanted.clone(), serde_json::json!(key));
                    }
                    continue;
                }
                if let Some(value) = reconstruct_field(&flat, wanted) {
                    projection.insert(wanted.clone(), value);
                }
            }
        } else {
            let mut seen_names = HashSet::new();
            for (name, _) in &flat {
                if name == DOCUMENT_ID_FIELD
                    || name == REDUCE_KEY_FIELD
                    || is_reserved_marker_name(name)
                    || !seen_names.insert(name.clone())
                {
                    continue;
                }
                if let Some(value) = reconstruct_field(&flat, name) {
                    projection.insert(name.clone(), value);
                }
            }
        }
        (key, projection)
    }

    fn highlight(&self, address: DocAddress, projection: &mut Projection) -> HashMap<String, Vec<String>> {
        let mut highlightings = HashMap::new();
        if self.highlighters.is_empty() {
            return highlightings;
        }
        let doc: TantivyDocument = match self.guard.searcher().doc(address) {
            Ok(doc) => doc,
            Err(err) => {
                warn!("failed to load document for highlighting: {err}");
                return highlightings;
            }
        };
        let into_projection = self.query.is_projection() || self.definition.is_map_reduce;
        for highlighter in &self.highlighters {
            let fragments = highlighter.fragments(&doc);
            if fragments.is_empty() {
                continue;
            }
            if into_projection {
                projection.insert(highlighter.fragments_key(), serde_json::json!(fragments));
            } else {
                highlightings.insert(highlighter.config.field.clone(), fragments);
            }
        }
        highlightings
    }

    fn explain(&self, address: DocAddress) -> Option<String> {
        self.main_query
            .explain(self.guard.searcher(), address)
            .ok()
            .map(|explanation| explanation.to_pretty_json())
    }

    fn should_dedupe_keys(&self) -> bool {
        if self.query.skip_duplicate_checking {
            return false;
        }
        // A pure projection over a map-only index cannot repeat keys.
        !(self.query.is_projection() && !self.definition.is_map_reduce)
    }
}

fn reconstruct_field(flat: &[(String, serde_json::Value)], name: &str) -> Option<serde_json::Value> {
    let convert_marker = format!("{name}{CONVERT_TO_JSON_SUFFIX}");
    let array_marker = format!("{name}{IS_ARRAY_SUFFIX}");
    let convert = flat.iter().any(|(n, _)| *n == convert_marker);
    let is_array = flat.iter().any(|(n, _)| *n == array_marker);

    let mut values: Vec<serde_json::Value> = flat
        .iter()
        .filter(|(n, _)| n == name)
        .map(|(_, value)| {
            if convert {
                value
                    .as_str()
                    .and_then(|text| serde_json::from_str(text).ok())
                    .unwrap_or_else(|| value.clone())
            } else {
                value.clone()
            }
        })
        .collect();

    if values.is_empty() {
        None
    } else if is_array || values.len() > 1 {
        Some(serde_json::Value::Array(values))
    } else {
        Some(values.pop().unwrap())
    }
}

fn canonical(projection: &Projection) -> String {
    serde_json::to_string(&serde_json::Value::Object(projection.clone())).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq)]
enum SortValue {
    Null,
    Number(f64),
    Text(String),
}

fn compare_sort_values(a: &SortValue, b: &SortValue) -> Ordering {
    match (a, b) {
        (SortValue::Number(x), SortValue::Number(y)) => x.total_cmp(y),
        (SortValue::Text(x), SortValue::Text(y)) => x.cmp(y),
        (SortValue::Null, SortValue::Null) => Ordering::Equal,
        // Missing values sort last regardless of direction.
        (SortValue::Null, _) => Ordering::Greater,
        (_, SortValue::Null) => Ordering::Less,
        (SortValue::Number(_), SortValue::Text(_)) => Ordering::Less,
        (SortValue::Text(_), SortValue::Number(_)) => Ordering::Greater,
    }
}

fn compare_sort_keys(
    a: &[SortValue],
    b: &[SortValue],
    fields: &[crate::query::SortField],
) -> Ordering {
    for (index, sort) in fields.iter().enumerate() {
        let ordering = compare_sort_values(&a[index], &b[index]);
        let ordering = if sort.descending && !matches!((&a[index], &b[index]), (SortValue::Null, _) | (_, SortValue::Null)) {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Lazy, finite, non-restartable result sequence. Holds the searcher guard
/// for its lifetime; dropping the iterator releases the snapshot.
#[derive(Debug)]
pub struct QueryResults {
    op: QueryOperation,
    search: CapturedSearch,
    position: usize,
    returned: usize,
    skipped: usize,
    docs_to_get: usize,
    dedupe_keys: bool,
    seen_keys: HashSet<String>,
    seen_projections: HashSet<String>,
    finished: bool,
}

impl QueryResults {
    fn seeded(op: QueryOperation, search: CapturedSearch) -> Result<QueryResults> {
        let start = op.query.start;
        let dedupe_keys = op.should_dedupe_keys();

        let mut seen_keys = HashSet::new();
        if dedupe_keys && start > 0 {
            if !op.query.sort_fields.is_empty() {
                for (_, address) in search.hits.iter().take(start) {
                    let (key, _) = op.project(*address);
                    if let Some(key) = key {
                        seen_keys.insert(key.to_lowercase());
                    }
                }
            } else if let Some((_, address)) = search.hits.get(start - 1) {
                let (key, _) = op.project(*address);
                if let Some(key) = key {
                    seen_keys.insert(key.to_lowercase());
                }
            }
        }

        let mut seen_projections = HashSet::new();
        if op.query.distinct {
            let mut index = 0;
            while seen_projections.len() < start && index < search.hits.len() {
                let (_, projection) = op.project(search.hits[index].1);
                if !projection.is_empty() {
                    seen_projections.insert(canonical(&projection));
                }
                index += 1;
            }
        }

        let docs_to_get = op.query.page_size.max(1);
        Ok(QueryResults {
            position: start,
            returned: 0,
            skipped: 0,
            docs_to_get,
            dedupe_keys,
            seen_keys,
            seen_projections,
            finished: false,
            op,
            search,
        })
    }

    /// Total matching entries reported by the last executed search.
    pub fn total_hits(&self) -> usize {
        self.search.total_hits
    }

    /// Hits skipped so far: predicate rejections plus duplicate and
    /// distinct suppression. Callers paging an unsorted fan-out query add
    /// this to the next page's `start`.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for QueryResults {
    type Item = Result<IndexQueryResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.returned >= self.op.query.page_size {
            return None;
        }
        loop {
            if self.op.token.is_cancelled() {
                self.finished = true;
                return None;
            }

            if self.position >= self.search.hits.len() {
                // Out of captured hits: refill with a larger over-fetch or
                // stop when the index has no more matches to offer.
                if self.search.hits.len() >= self.search.total_hits {
                    self.finished = true;
                    return None;
                }
                let deficit = self.op.query.page_size - self.returned;
                self.docs_to_get += deficit * self.op.fan_out_factor;
                match self.op.execute_search(self.docs_to_get) {
                    Ok(search) => {
                        self.search = search;
                        continue;
                    }
                    Err(err) => {
                        self.finished = true;
                        return Some(Err(err));
                    }
                }
            }

            let (score, address) = self.search.hits[self.position];
            self.position += 1;

            if !self.op.spatial_matches(address) {
                continue;
            }

            let (key, mut projection) = self.op.project(address);

            if let Some(predicate) = &self.op.query.predicate {
                let key_ref = key.as_deref().unwrap_or("");
                if !predicate(key_ref, &projection) {
                    self.skipped += 1;
                    continue;
                }
            }

            if self.dedupe_keys {
                if let Some(key) = &key {
                    if !self.seen_keys.insert(key.to_lowercase()) {
                        self.skipped += 1;
                        continue;
                    }
                }
            }

            if self.op.query.distinct
                && !projection.is_empty()
                && !self.seen_projections.insert(canonical(&projection))
            {
                self.skipped += 1;
                continue;
            }

            let highlightings = self.op.highlight(address, &mut projection);
            let score_explanation = self
                .op
                .query
                .explain_scores
                .then(|| self.op.explain(address))
                .flatten();

            self.returned += 1;
            return Some(Ok(IndexQueryResult {
                key,
                projection,
                score,
                highlightings,
                score_explanation,
            }));
        }
    }
}
