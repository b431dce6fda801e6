//! Highlighting, score explanation, spatial filtering, catch-all fields
//! and predicate skip accounting.

mod common;

use std::sync::Arc;

use aerie::query::SpatialIndexQuery;
use aerie::{
    CancellationToken, FieldIndexing, HighlightedField, Index, IndexDefinition, IndexEntry,
    IndexQuery, SortField, SourceDocument,
};
use common::*;
use serde_json::json;

#[test]
fn highlighting_wraps_matches_with_custom_tags() {
    let dir = tempfile::tempdir().unwrap();
    let definition =
        IndexDefinition::new("articles", 1).with_index("body", FieldIndexing::Analyzed);
    let index = Index::create(dir.path(), definition, generic_indexing_fn(), disk_options()).unwrap();
    put(
        &index,
        vec![
            ("articles/1".to_string(), json!({ "body": "the quick brown fox" })),
            ("articles/2".to_string(), json!({ "body": "a lazy dog" })),
        ],
        1,
    );

    let mut query = IndexQuery::new("body:fox").page(0, 10);
    query.highlighted_fields = vec![HighlightedField::new("body")];
    query.highlighter_pre_tags = vec!["<em>".to_string()];
    query.highlighter_post_tags = vec!["</em>".to_string()];

    let results = run_query(&index, query);
    assert_eq!(results.len(), 1);
    let fragments = &results[0].highlightings["body"];
    assert!(fragments[0].contains("<em>fox</em>"), "got {fragments:?}");
}

#[test]
fn explain_scores_attaches_an_explanation() {
    let dir = tempfile::tempdir().unwrap();
    let index = open_items_index(dir.path(), "items", 1);
    put(&index, vec![("items/1".to_string(), json!({ "value": "alpha" }))], 1);

    let mut query = IndexQuery::new("value:alpha").page(0, 10);
    query.explain_scores = true;
    let results = run_query(&index, query);
    assert_eq!(results.len(), 1);
    let explanation = results[0].score_explanation.as_ref().unwrap();
    assert!(!explanation.is_empty());
}

#[test]
fn spatial_circle_filters_and_distance_sorts() {
    let dir = tempfile::tempdir().unwrap();
    let definition = IndexDefinition::new("places", 2)
        .with_index("name", FieldIndexing::NotAnalyzed)
        .with_spatial_field("where");

    let map = |doc: &SourceDocument| -> aerie::Result<Vec<IndexEntry>> {
        let mut entry = IndexEntry::new(&doc.key);
        entry.add_text("name", doc.data["name"].as_str().unwrap_or(""));
        entry.add_spatial(
            "where",
            doc.data["lat"].as_f64().unwrap_or(f64::NAN),
            doc.data["lng"].as_f64().unwrap_or(f64::NAN),
        )?;
        Ok(vec![entry])
    };
    let index = Index::create(dir.path(), definition, Arc::new(map), disk_options()).unwrap();

    put(
        &index,
        vec![
            (
                "places/paris".to_string(),
                json!({ "name": "paris", "lat": 48.8566, "lng": 2.3522 }),
            ),
            (
                "places/versailles".to_string(),
                json!({ "name": "versailles", "lat": 48.8049, "lng": 2.1204 }),
            ),
            (
                "places/london".to_string(),
                json!({ "name": "london", "lat": 51.5074, "lng": -0.1278 }),
            ),
            (
                "places/broken".to_string(),
                json!({ "name": "broken", "lat": 200.0, "lng": 0.0 }),
            ),
        ],
        1,
    );

    // The invalid shape was recorded and the document skipped, without
    // failing the batch.
    let errors = index.errors();
    assert!(errors
        .iter()
        .any(|error| error.document_key.as_deref() == Some("places/broken")));

    let mut query = IndexQuery::new("")
        .page(0, 10)
        .sorted_by(SortField::ascending("__distance"));
    query.spatial = Some(SpatialIndexQuery::within_radius("where", 48.8566, 2.3522, 50.0));
    let results = run_query(&index, query);

    let keys = result_keys(&results);
    assert_eq!(keys, vec!["places/paris".to_string(), "places/versailles".to_string()]);
}

#[test]
fn catch_all_indexes_dynamic_fields() {
    let dir = tempfile::tempdir().unwrap();
    let definition = IndexDefinition::new("dynamic", 3)
        .with_index("title", FieldIndexing::NotAnalyzed)
        .with_field("_");
    let index = Index::create(dir.path(), definition, generic_indexing_fn(), disk_options()).unwrap();
    put(
        &index,
        vec![
            (
                "docs/1".to_string(),
                json!({ "title": "first", "color": "blue" }),
            ),
            (
                "docs/2".to_string(),
                json!({ "title": "second", "color": "red" }),
            ),
        ],
        1,
    );

    // A field the definition never declared parses and matches through the
    // catch-all, and the unknown-field guard is waived.
    let results = run_query(&index, IndexQuery::new("color:blue").page(0, 10));
    assert_eq!(result_keys(&results), vec!["docs/1".to_string()]);
    assert_eq!(results[0].projection["color"], json!("blue"));
}

#[test]
fn unknown_fields_are_rejected_without_catch_all() {
    let dir = tempfile::tempdir().unwrap();
    let index = open_items_index(dir.path(), "items", 1);
    put(&index, vec![("items/1".to_string(), json!({ "value": "x" }))], 1);

    let err = index
        .query(IndexQuery::new("missing:x"), &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, aerie::Error::FieldNotIndexed { field } if field == "missing"));
}

#[test]
fn predicate_rejections_are_counted_as_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let index = open_items_index(dir.path(), "items", 1);
    put(
        &index,
        (0..6).map(|i| (format!("items/{i}"), json!({ "value": "x" }))).collect(),
        1,
    );

    let mut query = IndexQuery::new("").page(0, 10);
    query.predicate = Some(Arc::new(|key: &str, _projection: &aerie::query::Projection| {
        !key.ends_with('0')
    }));
    let mut results = index.query(query, &CancellationToken::new()).unwrap();
    let collected: Vec<_> = (&mut results).collect::<aerie::Result<Vec<_>>>().unwrap();
    assert_eq!(collected.len(), 5);
    assert_eq!(results.skipped(), 1);
}
