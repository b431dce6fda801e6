//! The per-index write pipeline.
//!
//! One writer exists per index and every call into it is serialized by the
//! index write lock. Batches are applied document by document: superseded
//! entries are deleted, the indexing function fans each source document out
//! into entries, and per-document failures are recorded without aborting
//! the batch. Commits carry the highest applied etag as library commit
//! user-data so restart recovery knows where to resume.

use dashmap::DashMap;
use tantivy::schema::OwnedValue;
use tantivy::{IndexWriter as TantivyIndexWriter, Index as TantivyIndex, TantivyDocument, Term};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::context::{CancellationToken, Clock};
use crate::definition::{IndexDefinition, SchemaFields, SchemaTarget};
use crate::directory::{SegmentDirectory, SnapshotRetention, WriteLockFile};
use crate::entry::{Etag, FieldValue, IndexEntry, IndexedItemsInfo, IndexingBatch, IndexingFn, SourceDocument};
use crate::error::{Error, Result};
use crate::extensions::IndexUpdateTrigger;
use crate::index::stats::{ErrorLog, IndexingError};
use std::sync::Arc;

/// Everything `apply` needs from the owning index besides the batch.
pub(crate) struct ApplyContext<'a> {
    pub error_log: &'a ErrorLog,
    pub update_triggers: &'a [Box<dyn IndexUpdateTrigger>],
    pub currently_indexing: &'a DashMap<String, Etag>,
    pub clock: &'a dyn Clock,
    pub token: &'a CancellationToken,
}

/// Clears the currently-indexing map on every exit path of one apply.
struct CurrentlyIndexingClear<'a>(&'a DashMap<String, Etag>);

impl Drop for CurrentlyIndexingClear<'_> {
    fn drop(&mut self) {
        self.0.clear();
    }
}

pub(crate) struct IndexWriter {
    index: TantivyIndex,
    writer: Option<TantivyIndexWriter>,
    definition: Arc<IndexDefinition>,
    schema_fields: SchemaFields,
    config: Arc<EngineConfig>,
    max_outputs: i32,
    /// Approximate bytes buffered since the library writer was opened;
    /// drives the post-commit flush threshold.
    bytes_written: u64,
    writes_since_open: usize,
}

impl IndexWriter {
    pub fn open(
        index: TantivyIndex,
        definition: Arc<IndexDefinition>,
        schema_fields: SchemaFields,
        config: Arc<EngineConfig>,
    ) -> Result<IndexWriter> {
        let writer = index.writer(config.writer_heap_bytes)?;
        let max_outputs = definition.effective_max_outputs(&config);
        Ok(IndexWriter {
            index,
            writer: Some(writer),
            definition,
            schema_fields,
            config,
            max_outputs,
            bytes_written: 0,
            writes_since_open: 0,
        })
    }

    fn writer(&mut self) -> &mut TantivyIndexWriter {
        self.writer.as_mut().unwrap()
    }

    /// Apply one batch. Per-document failures are recorded into the error
    /// log and skipped; writer-level failures abort the batch and surface
    /// to the caller, which wraps them as `IndexWriteFailed`.
    pub fn apply(
        &mut self,
        batch: &IndexingBatch,
        indexing_fn: &dyn IndexingFn,
        ctx: &ApplyContext<'_>,
    ) -> Result<IndexedItemsInfo> {
        let _lock_file = WriteLockFile::acquire(&self.index)?;
        let _clear = CurrentlyIndexingClear(ctx.currently_indexing);

        let mut changed_docs = 0usize;

        for key in &batch.deletions {
            self.delete_key(key);
            for trigger in ctx.update_triggers {
                trigger.on_entry_deleted(key);
            }
            changed_docs += 1;
        }

        for doc in &batch.documents {
            if ctx.token.is_cancelled() {
                debug!(index = %self.definition.name, "batch application cancelled");
                break;
            }
            ctx.currently_indexing.insert(doc.key.clone(), doc.etag);
            self.delete_key(&doc.key);

            match indexing_fn.map(doc) {
                Err(err) => {
                    self.record_document_error(ctx, doc, "map", &err);
                }
                Ok(mut entries) => {
                    if self.max_outputs >= 0 && entries.len() > self.max_outputs as usize {
                        self.record_document_error(
                            ctx,
                            doc,
                            "map",
                            &Error::Indexing(format!(
                                "indexing function produced {} outputs, cap is {}",
                                entries.len(),
                                self.max_outputs
                            )),
                        );
                        entries.truncate(self.max_outputs as usize);
                    }
                    for entry in &entries {
                        let document = match self.entry_to_document(entry) {
                            Ok(document) => document,
                            Err(err) => {
                                self.record_document_error(ctx, doc, "write", &err);
                                continue;
                            }
                        };
                        self.bytes_written += entry_size(entry);
                        self.writes_since_open += 1;
                        self.writer().add_document(document)?;
                        for trigger in ctx.update_triggers {
                            trigger.on_entry_created(&doc.key, entry);
                        }
                    }
                    changed_docs += 1;
                }
            }
            ctx.currently_indexing.remove(&doc.key);
        }

        Ok(IndexedItemsInfo {
            changed_docs,
            highest_etag: batch.highest_etag(),
        })
    }

    fn record_document_error(
        &self,
        ctx: &ApplyContext<'_>,
        doc: &SourceDocument,
        source: &str,
        err: &Error,
    ) {
        warn!(index = %self.definition.name, key = %doc.key, "{source} error: {err}");
        ctx.error_log.record(IndexingError {
            index_id: self.definition.index_id,
            document_key: Some(doc.key.clone()),
            message: err.to_string(),
            source: source.to_string(),
            timestamp: ctx.clock.utc_now(),
        });
    }

    fn delete_key(&mut self, key: &str) {
        let term = Term::from_field_text(self.schema_fields.document_id, key);
        self.writer().delete_term(term);
    }

    fn entry_to_document(&self, entry: &IndexEntry) -> Result<TantivyDocument> {
        let mut document = TantivyDocument::new();
        let mut dynamic: serde_json::Map<String, serde_json::Value> = serde_json::Map::new();

        for (name, value) in entry.fields() {
            match self.schema_fields.resolve(name) {
                Some(
                    SchemaTarget::DocumentId(field)
                    | SchemaTarget::ReduceKey(field)
                    | SchemaTarget::Text(field)
                    | SchemaTarget::Marker(field),
                ) => match value {
                    FieldValue::Text(text) => document.add_text(field, text),
                    FieldValue::Number(number) => document.add_text(field, number.to_string()),
                },
                Some(SchemaTarget::Range(field)) => match value {
                    FieldValue::Number(number) => document.add_f64(field, *number),
                    FieldValue::Text(text) => {
                        let number: f64 = text.parse().map_err(|_| {
                            Error::Indexing(format!("non-numeric value for range field '{name}'"))
                        })?;
                        document.add_f64(field, number);
                    }
                },
                Some(SchemaTarget::CatchAll(_)) => {
                    let json_value = match value {
                        FieldValue::Text(text) => serde_json::Value::String(text.clone()),
                        FieldValue::Number(number) => serde_json::json!(number),
                    };
                    match dynamic.get_mut(name) {
                        None => {
                            dynamic.insert(name.to_string(), json_value);
                        }
                        Some(serde_json::Value::Array(values)) => values.push(json_value),
                        Some(existing) => {
                            let first = existing.take();
                            *existing = serde_json::Value::Array(vec![first, json_value]);
                        }
                    }
                }
                None => {
                    return Err(Error::FieldNotIndexed {
                        field: name.to_string(),
                    })
                }
            }
        }

        if !dynamic.is_empty() {
            let field = self.schema_fields.catch_all.unwrap();
            document.add_field_value(field, OwnedValue::from(serde_json::Value::Object(dynamic)));
        }

        Ok(document)
    }

    /// Flush buffered segments, recording `highest_etag` into the commit's
    /// user-data. Stale-file collection is skipped while a backup snapshot
    /// pins the previous commit, and caught up afterwards.
    pub fn commit(&mut self, highest_etag: Etag, retention: &SnapshotRetention) -> Result<()> {
        let mut prepared = self.writer().prepare_commit()?;
        prepared.set_payload(&highest_etag.to_hex());
        prepared.commit()?;

        if self.bytes_written >= self.config.flush_threshold_bytes()
            || retention.take_pending_gc()
        {
            if retention.is_pinned() {
                retention.defer_gc();
            } else {
                self.writer().garbage_collect_files().wait()?;
                self.bytes_written = 0;
            }
        }

        if self.writes_since_open >= self.config.max_index_writes_before_recreate {
            self.recreate_writer()?;
        }
        Ok(())
    }

    /// Drop every entry; used by the external reset operation.
    pub fn delete_all(&mut self) -> Result<()> {
        self.writer().delete_all_documents()?;
        Ok(())
    }

    /// Merge all searchable segments into one. Long-running; runs under the
    /// index write lock like every other mutation.
    pub fn optimize(&mut self) -> Result<()> {
        let segment_ids = self.index.searchable_segment_ids()?;
        if segment_ids.len() <= 1 {
            return Ok(());
        }
        info!(
            index = %self.definition.name,
            segments = segment_ids.len(),
            "merging segments"
        );
        self.writer().merge(&segment_ids).wait()?;
        Ok(())
    }

    /// Whether a memory-backed directory should move to disk now.
    pub fn should_materialize(
        &self,
        directory: &SegmentDirectory,
        force_write_to_disk: bool,
        index_is_current: bool,
    ) -> Result<bool> {
        if !directory.is_memory() {
            return Ok(false);
        }
        if force_write_to_disk || index_is_current {
            return Ok(true);
        }
        Ok(crate::directory::directory_size(&self.index)? > self.config.new_index_in_memory_max_bytes)
    }

    /// The library writer accumulates internal buffers; recreating it after
    /// a configured number of writes bounds that growth.
    fn recreate_writer(&mut self) -> Result<()> {
        debug!(index = %self.definition.name, writes = self.writes_since_open, "recreating library writer");
        if let Some(writer) = self.writer.take() {
            writer.wait_merging_threads()?;
        }
        self.writer = Some(self.index.writer(self.config.writer_heap_bytes)?);
        self.writes_since_open = 0;
        self.bytes_written = 0;
        Ok(())
    }

    /// Orderly shutdown: waits for in-flight merges.
    pub fn dispose(mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.wait_merging_threads()?;
        }
        Ok(())
    }
}

fn entry_size(entry: &IndexEntry) -> u64 {
    entry
        .fields()
        .map(|(name, value)| {
            name.len() as u64
                + match value {
                    FieldValue::Text(text) => text.len() as u64,
                    FieldValue::Number(_) => 8,
                }
        })
        .sum()
}
