//! Shared helpers for the end-to-end scenarios.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use aerie::{
    CancellationToken, EngineConfig, Etag, FieldIndexing, Index, IndexDefinition, IndexEntry,
    IndexOptions, IndexQuery, IndexQueryResult, IndexingBatch, IndexingFn, SortField,
    SourceDocument,
};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Definition with one exact-match `value` field, as used by the storage
/// round-trip scenarios.
pub fn items_definition(name: &str, id: u32) -> IndexDefinition {
    IndexDefinition::new(name, id).with_index("value", FieldIndexing::NotAnalyzed)
}

/// Indexing function mapping every top-level JSON property of the source
/// document onto one entry.
pub fn generic_indexing_fn() -> Arc<dyn IndexingFn> {
    let map = |doc: &SourceDocument| -> aerie::Result<Vec<IndexEntry>> {
        let mut entry = IndexEntry::new(&doc.key);
        if let Some(object) = doc.data.as_object() {
            for (name, value) in object {
                match value {
                    serde_json::Value::String(text) => entry.add_text(name, text),
                    serde_json::Value::Number(number) => {
                        entry.add_number(name, number.as_f64().unwrap_or_default())
                    }
                    other => entry.add_json(name, other)?,
                }
            }
        }
        Ok(vec![entry])
    };
    Arc::new(map)
}

pub fn disk_options() -> IndexOptions {
    IndexOptions {
        config: EngineConfig {
            writer_heap_bytes: 15_000_000,
            ..EngineConfig::default()
        },
        ..IndexOptions::default()
    }
}

/// Route engine logs into the test harness output.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn open_items_index(path: &Path, name: &str, id: u32) -> Index {
    init_test_logging();
    Index::open_or_create(path, items_definition(name, id), generic_indexing_fn(), disk_options())
        .expect("index should open")
}

/// Index a batch of (key, document) pairs with sequential etags.
pub fn put(index: &Index, docs: Vec<(String, serde_json::Value)>, first_etag: u128) {
    let documents = docs
        .into_iter()
        .enumerate()
        .map(|(offset, (key, data))| {
            SourceDocument::new(key, Etag::from_u128(first_etag + offset as u128), data)
        })
        .collect();
    index
        .index_documents(&IndexingBatch::new(documents), &CancellationToken::new())
        .expect("batch should index");
}

pub fn run_query(index: &Index, query: IndexQuery) -> Vec<IndexQueryResult> {
    index
        .query(query, &CancellationToken::new())
        .expect("query should start")
        .collect::<aerie::Result<Vec<_>>>()
        .expect("query should iterate")
}

pub fn match_all(index: &Index, start: usize, page_size: usize) -> Vec<IndexQueryResult> {
    run_query(index, IndexQuery::new("").page(start, page_size))
}

pub fn match_all_by_key(index: &Index, start: usize, page_size: usize) -> Vec<IndexQueryResult> {
    run_query(
        index,
        IndexQuery::new("")
            .page(start, page_size)
            .sorted_by(SortField::ascending("__document_id")),
    )
}

pub fn result_keys(results: &[IndexQueryResult]) -> Vec<String> {
    results
        .iter()
        .map(|result| result.key.clone().expect("result should carry a key"))
        .collect()
}

/// Deterministic pseudo-random payload, hex-encoded so it survives text
/// storage byte for byte.
pub fn seeded_hex(seed: u64, byte_len: usize) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bytes = vec![0u8; byte_len];
    rng.fill_bytes(&mut bytes);
    let mut hex = String::with_capacity(byte_len * 2);
    for byte in bytes {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}
