//! Write-error quarantine behavior and concurrent access smoke tests.

mod common;

use std::sync::Arc;

use aerie::{CancellationToken, Etag, IndexQuery, IndexingBatch, SourceDocument};
use common::*;
use serde_json::json;

fn one_doc_batch(key: &str, etag: u128) -> IndexingBatch {
    IndexingBatch::new(vec![SourceDocument::new(
        key.to_string(),
        Etag::from_u128(etag),
        json!({ "value": "x" }),
    )])
}

#[test]
fn error_priority_is_not_demoted_by_later_successes() {
    let dir = tempfile::tempdir().unwrap();
    let index = open_items_index(dir.path(), "items", 1);
    put(&index, vec![("items/0".to_string(), json!({ "value": "x" }))], 1);

    let lock_path = dir.path().join("writing-to-index.lock");
    std::fs::write(&lock_path, "held\n").unwrap();
    for attempt in 0..10 {
        index
            .index_documents(&one_doc_batch("items/1", 10 + attempt), &CancellationToken::new())
            .unwrap_err();
    }
    assert_eq!(index.priority(), aerie::IndexingPriority::Error);
    std::fs::remove_file(&lock_path).unwrap();

    // Writes are still permitted and succeed, but the quarantine holds.
    index
        .index_documents(&one_doc_batch("items/2", 50), &CancellationToken::new())
        .unwrap();
    assert_eq!(index.write_error_count(), 0);
    assert_eq!(index.priority(), aerie::IndexingPriority::Error);
    assert!(matches!(
        index.query(IndexQuery::new(""), &CancellationToken::new()),
        Err(aerie::Error::IndexDisabled)
    ));
}

#[test]
fn write_error_counter_resets_below_the_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let index = open_items_index(dir.path(), "items", 1);
    put(&index, vec![("items/0".to_string(), json!({ "value": "x" }))], 1);

    let lock_path = dir.path().join("writing-to-index.lock");
    std::fs::write(&lock_path, "held\n").unwrap();
    for attempt in 0..3 {
        index
            .index_documents(&one_doc_batch("items/1", 10 + attempt), &CancellationToken::new())
            .unwrap_err();
    }
    assert_eq!(index.write_error_count(), 3);
    std::fs::remove_file(&lock_path).unwrap();

    index
        .index_documents(&one_doc_batch("items/1", 20), &CancellationToken::new())
        .unwrap();
    assert_eq!(index.write_error_count(), 0);
    assert_eq!(index.priority(), aerie::IndexingPriority::Normal);

    let errors = index.errors();
    assert_eq!(errors.len(), 3);
    assert!(errors.iter().all(|error| error.source == "write"));
}

#[test]
fn cancelled_queries_stop_between_results() {
    let dir = tempfile::tempdir().unwrap();
    let index = open_items_index(dir.path(), "items", 1);
    put(
        &index,
        (0..10).map(|i| (format!("items/{i}"), json!({ "value": "x" }))).collect(),
        1,
    );

    let token = CancellationToken::new();
    let mut results = index.query(IndexQuery::new("").page(0, 100), &token).unwrap();
    assert!(results.next().is_some());
    token.cancel();
    assert!(results.next().is_none(), "cancellation must stop iteration");
}

#[test]
fn queries_proceed_while_a_writer_thread_commits() {
    let dir = tempfile::tempdir().unwrap();
    let index = Arc::new(open_items_index(dir.path(), "items", 1));
    put(&index, vec![("items/seed".to_string(), json!({ "value": "x" }))], 1);

    std::thread::scope(|scope| {
        let writer_index = Arc::clone(&index);
        scope.spawn(move || {
            for batch in 0u128..5 {
                let docs = (0..20)
                    .map(|i| {
                        SourceDocument::new(
                            format!("items/{batch}-{i}"),
                            Etag::from_u128(100 + batch * 20 + i as u128),
                            json!({ "value": "y" }),
                        )
                    })
                    .collect();
                writer_index
                    .index_documents(&IndexingBatch::new(docs), &CancellationToken::new())
                    .unwrap();
            }
        });

        let reader_index = Arc::clone(&index);
        scope.spawn(move || {
            let mut last_count = 0;
            for _ in 0..50 {
                let count = match_all(&reader_index, 0, 1000).len();
                assert!(count >= last_count, "published views must not go backwards");
                last_count = count;
            }
        });
    });

    assert_eq!(match_all(&index, 0, 1000).len(), 101);
}
