//! Query-text handling: field validation, catch-all rewriting, INTERSECT
//! splitting, and parsing into library queries with query-time analyzers.

use std::sync::OnceLock;

use regex::Regex;
use tantivy::query::{AllQuery, Query, QueryParser};
use tantivy::schema::{Field, Schema};
use tantivy::tokenizer::TokenizerManager;

use crate::definition::IndexDefinition;
use crate::entry::CATCH_ALL_FIELD;
use crate::error::{Error, Result};
use crate::query::INTERSECT_SEPARATOR;

fn field_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_.]*)\s*:").unwrap())
}

/// Field names referenced as `name:` in the raw query text.
pub fn referenced_fields(query: &str) -> Vec<String> {
    field_reference_regex()
        .captures_iter(query)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Reject queries referencing fields the index does not cover, unless the
/// definition declares the catch-all. `_Range` is stripped before lookup;
/// score and random-ordering pseudo-fields are ignored.
pub fn validate_fields(query: &str, definition: &IndexDefinition) -> Result<()> {
    for field in referenced_fields(query) {
        if !definition.is_field_queryable(&field) {
            return Err(Error::FieldNotIndexed { field });
        }
    }
    Ok(())
}

/// Split an INTERSECT query into its sub-queries. `None` when the query is
/// not an intersection; fewer than two non-empty clauses is malformed.
pub fn split_intersect(query: &str) -> Result<Option<Vec<String>>> {
    if !query.contains(INTERSECT_SEPARATOR) {
        return Ok(None);
    }
    let clauses: Vec<String> = query
        .split(INTERSECT_SEPARATOR)
        .map(|clause| clause.trim().to_string())
        .filter(|clause| !clause.is_empty())
        .collect();
    if clauses.len() < 2 {
        return Err(Error::IntersectMalformed);
    }
    Ok(Some(clauses))
}

/// Route references to undeclared fields into the catch-all JSON field, so
/// `color:blue` over a dynamic index parses as `_.color:blue`.
pub fn rewrite_for_catch_all(query: &str, definition: &IndexDefinition, schema: &Schema) -> String {
    if !definition.declares_catch_all() {
        return query.to_string();
    }
    field_reference_regex()
        .replace_all(query, |caps: &regex::Captures<'_>| {
            let field = &caps[1];
            if schema.get_field(field).is_ok() || field.starts_with("_.") {
                caps[0].to_string()
            } else {
                format!("{CATCH_ALL_FIELD}.{field}:")
            }
        })
        .into_owned()
}

/// Parse one clause. Empty or whitespace text becomes match-all.
pub fn parse_clause(
    text: &str,
    definition: &IndexDefinition,
    schema: &Schema,
    default_fields: &[Field],
    tokenizers: &TokenizerManager,
) -> Result<Box<dyn Query>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Box::new(AllQuery));
    }
    let rewritten = rewrite_for_catch_all(trimmed, definition, schema);
    let parser = QueryParser::new(schema.clone(), default_fields.to_vec(), tokenizers.clone());
    parser
        .parse_query(&rewritten)
        .map_err(|e| Error::QueryParse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalyzerMode, AnalyzerRegistry, AnalyzerStack};
    use crate::definition::build_schema;
    use crate::entry::{RANDOM_FIELD_PREFIX, TEMP_SCORE_FIELD};

    fn definition() -> IndexDefinition {
        IndexDefinition::new("items", 1).with_field("title")
    }

    #[test]
    fn referenced_fields_are_extracted() {
        assert_eq!(
            referenced_fields("title:hello AND price_Range:[1 TO 3]"),
            vec!["title".to_string(), "price_Range".to_string()]
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = validate_fields("missing:x", &definition()).unwrap_err();
        assert!(matches!(err, Error::FieldNotIndexed { field } if field == "missing"));
    }

    #[test]
    fn pseudo_fields_pass_validation() {
        let query = format!("{TEMP_SCORE_FIELD}:1 {RANDOM_FIELD_PREFIX}7:2 title:x");
        validate_fields(&query, &definition()).unwrap();
    }

    #[test]
    fn range_suffix_is_stripped_before_lookup() {
        validate_fields("title_Range:[1 TO 2]", &definition()).unwrap();
    }

    #[test]
    fn intersect_needs_two_clauses() {
        assert!(split_intersect("a:1").unwrap().is_none());
        assert_eq!(
            split_intersect("a:1 INTERSECT b:2").unwrap().unwrap(),
            vec!["a:1".to_string(), "b:2".to_string()]
        );
        assert!(matches!(
            split_intersect("a:1 INTERSECT ").unwrap_err(),
            Error::IntersectMalformed
        ));
    }

    #[test]
    fn catch_all_rewrites_unknown_fields_only() {
        let definition = IndexDefinition::new("open", 2)
            .with_field("title")
            .with_field(crate::entry::CATCH_ALL_FIELD);
        let stack = AnalyzerStack::build(
            &definition,
            &AnalyzerRegistry::default(),
            &[],
            AnalyzerMode::Indexing,
        )
        .unwrap();
        let (schema, _) = build_schema(&definition, &stack);
        let rewritten = rewrite_for_catch_all("title:a color:blue", &definition, &schema);
        assert_eq!(rewritten, "title:a _.color:blue");
    }
}
