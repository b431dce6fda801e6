//! The index façade.
//!
//! One `Index` owns a library index over a segment directory, the single
//! writer for it, the searcher holder and the analyzer stacks. All
//! state-mutating operations are serialized by one write lock; queries
//! acquire a published searcher snapshot and never touch that lock.

pub mod holder;
pub mod stats;
pub(crate) mod writer;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use tantivy::schema::Schema;
use tantivy::{Index as TantivyIndex, IndexReader};
use tracing::{debug, info, warn};

use crate::analysis::{AnalyzerMode, AnalyzerRegistry, AnalyzerStack};
use crate::config::EngineConfig;
use crate::context::{update_stats_with_retry, CancellationToken, IndexContext, StatsUpdate};
use crate::definition::{build_schema, IndexDefinition, SchemaFields};
use crate::directory::{self, SegmentDirectory, SnapshotRetention};
use crate::entry::{Etag, IndexedItemsInfo, IndexingBatch, IndexingFn};
use crate::error::{Error, Result};
use crate::extensions::ExtensionsRegistry;
use crate::query::{IndexQuery, QueryOperation, QueryResults};

pub use holder::{ReleaseHandle, SearcherGuard, SearcherHolder, SearcherState, StoredDoc};
pub use stats::{
    AtomicPriority, BatchOperation, ErrorLog, IndexingError, IndexingPerformanceStats,
    IndexingPriority, PerformanceStatsQueue, WriteErrorCounter, WRITE_ERROR_THRESHOLD,
};

use self::stats::{IndexingError as ErrorRecord};
use self::writer::ApplyContext;

/// Bounded wait for outstanding searcher readers at shutdown.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
/// Trylock slice used while reporting who holds the write lock.
const WRITE_LOCK_SLICE: Duration = Duration::from_millis(100);

/// Everything injectable at index construction.
pub struct IndexOptions {
    pub config: EngineConfig,
    pub context: IndexContext,
    pub analyzers: AnalyzerRegistry,
    pub extensions: ExtensionsRegistry,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            context: IndexContext::default(),
            analyzers: AnalyzerRegistry::default(),
            extensions: ExtensionsRegistry::default(),
        }
    }
}

/// The swappable library-index half of an `Index`; replaced wholesale when
/// a memory-backed directory materializes to disk.
struct IndexBackend {
    tantivy: TantivyIndex,
    directory: SegmentDirectory,
    reader: IndexReader,
    schema: Schema,
    schema_fields: SchemaFields,
}

pub struct Index {
    definition: Arc<IndexDefinition>,
    config: Arc<EngineConfig>,
    context: IndexContext,
    analyzers: AnalyzerRegistry,
    extensions: ExtensionsRegistry,
    indexing_fn: Arc<dyn IndexingFn>,

    backend: ArcSwap<IndexBackend>,
    holder: SearcherHolder,
    retention: Arc<SnapshotRetention>,
    /// THE write lock: owns the writer and serializes every mutation.
    write_lock: Mutex<Option<writer::IndexWriter>>,
    wait_reason: Mutex<Option<&'static str>>,

    priority: AtomicPriority,
    write_errors: WriteErrorCounter,
    error_log: ErrorLog,
    performance: PerformanceStatsQueue,
    currently_indexing: DashMap<String, Etag>,

    indexing_attempts: AtomicU64,
    indexing_errors: AtomicU64,
    reduce_attempts: AtomicU64,
    reduce_errors: AtomicU64,

    last_index_time_ms: AtomicI64,
    last_query_time_ms: AtomicI64,
    is_map_indexing_in_progress: AtomicBool,
    force_to_disk: AtomicBool,
    index_is_current: AtomicBool,
    disposed: AtomicBool,

    /// On-disk home of this index; also the materialization target while
    /// the directory is memory-backed.
    disk_path: PathBuf,
}

struct WriteGuard<'a> {
    index: &'a Index,
    guard: MutexGuard<'a, Option<writer::IndexWriter>>,
}

impl<'a> WriteGuard<'a> {
    fn writer(&mut self) -> &mut writer::IndexWriter {
        self.guard.as_mut().unwrap()
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        *self.index.wait_reason.lock() = None;
    }
}

impl Index {
    /// Create a fresh index at `path`. With `run_in_memory` the directory
    /// starts memory-backed and `path` becomes the materialization target.
    pub fn create(
        path: &Path,
        definition: IndexDefinition,
        indexing_fn: Arc<dyn IndexingFn>,
        options: IndexOptions,
    ) -> Result<Index> {
        let definition = Arc::new(definition);
        let indexing_stack = AnalyzerStack::build(
            &definition,
            &options.analyzers,
            &options.extensions.analyzer_generators,
            AnalyzerMode::Indexing,
        )?;
        let (schema, schema_fields) = build_schema(&definition, &indexing_stack);

        let (tantivy, segment_directory) = if options.config.run_in_memory {
            (
                TantivyIndex::create_in_ram(schema.clone()),
                SegmentDirectory::memory(),
            )
        } else {
            std::fs::create_dir_all(path)?;
            (
                TantivyIndex::create_in_dir(path, schema.clone())?,
                SegmentDirectory::disk(path.to_path_buf()),
            )
        };
        indexing_stack.register_into(tantivy.tokenizers());
        directory::write_version(&tantivy)?;

        Self::assemble(
            path.to_path_buf(),
            definition,
            indexing_fn,
            options,
            tantivy,
            segment_directory,
            schema,
            schema_fields,
        )
    }

    /// Open an existing on-disk index, verifying the engine version sidecar.
    pub fn open(
        path: &Path,
        definition: IndexDefinition,
        indexing_fn: Arc<dyn IndexingFn>,
        options: IndexOptions,
    ) -> Result<Index> {
        let definition = Arc::new(definition);
        let tantivy = TantivyIndex::open_in_dir(path)?;
        directory::verify_version(&tantivy)?;

        let indexing_stack = AnalyzerStack::build(
            &definition,
            &options.analyzers,
            &options.extensions.analyzer_generators,
            AnalyzerMode::Indexing,
        )?;
        indexing_stack.register_into(tantivy.tokenizers());

        let schema = tantivy.schema();
        let schema_fields = SchemaFields::from_schema(&definition, &schema)?;

        Self::assemble(
            path.to_path_buf(),
            definition,
            indexing_fn,
            options,
            tantivy,
            SegmentDirectory::disk(path.to_path_buf()),
            schema,
            schema_fields,
        )
    }

    pub fn open_or_create(
        path: &Path,
        definition: IndexDefinition,
        indexing_fn: Arc<dyn IndexingFn>,
        options: IndexOptions,
    ) -> Result<Index> {
        if path.join(directory::META_FILENAME).exists() {
            Self::open(path, definition, indexing_fn, options)
        } else {
            Self::create(path, definition, indexing_fn, options)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        disk_path: PathBuf,
        definition: Arc<IndexDefinition>,
        indexing_fn: Arc<dyn IndexingFn>,
        options: IndexOptions,
        tantivy: TantivyIndex,
        segment_directory: SegmentDirectory,
        schema: Schema,
        schema_fields: SchemaFields,
    ) -> Result<Index> {
        let config = Arc::new(options.config);
        let index_writer = writer::IndexWriter::open(
            tantivy.clone(),
            Arc::clone(&definition),
            schema_fields.clone(),
            Arc::clone(&config),
        )?;
        let reader = tantivy.reader()?;
        let holder = SearcherHolder::new(reader.searcher())?;

        let backend = IndexBackend {
            tantivy,
            directory: segment_directory,
            reader,
            schema,
            schema_fields,
        };

        info!(index = %definition.name, id = definition.index_id, "index opened");
        Ok(Index {
            definition,
            config,
            context: options.context,
            analyzers: options.analyzers,
            extensions: options.extensions,
            indexing_fn,
            backend: ArcSwap::from_pointee(backend),
            holder,
            retention: SnapshotRetention::new(),
            write_lock: Mutex::new(Some(index_writer)),
            wait_reason: Mutex::new(None),
            priority: AtomicPriority::new(IndexingPriority::Normal),
            write_errors: WriteErrorCounter::default(),
            error_log: ErrorLog::default(),
            performance: PerformanceStatsQueue::default(),
            currently_indexing: DashMap::new(),
            indexing_attempts: AtomicU64::new(0),
            indexing_errors: AtomicU64::new(0),
            reduce_attempts: AtomicU64::new(0),
            reduce_errors: AtomicU64::new(0),
            last_index_time_ms: AtomicI64::new(0),
            last_query_time_ms: AtomicI64::new(0),
            is_map_indexing_in_progress: AtomicBool::new(false),
            force_to_disk: AtomicBool::new(false),
            index_is_current: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            disk_path,
        })
    }

    // --- Accessors ---

    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    pub fn priority(&self) -> IndexingPriority {
        self.priority.get()
    }

    pub fn set_priority(&self, priority: IndexingPriority) {
        self.priority.set(priority);
    }

    pub fn errors(&self) -> Vec<IndexingError> {
        self.error_log.snapshot()
    }

    pub fn performance_stats(&self) -> Vec<IndexingPerformanceStats> {
        self.performance.snapshot()
    }

    pub fn write_error_count(&self) -> u32 {
        self.write_errors.current()
    }

    pub fn last_index_time(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.last_index_time_ms.load(Ordering::SeqCst))
            .single()
            .unwrap_or_default()
    }

    pub fn last_query_time(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.last_query_time_ms.load(Ordering::SeqCst))
            .single()
            .unwrap_or_default()
    }

    pub fn is_map_indexing_in_progress(&self) -> bool {
        self.is_map_indexing_in_progress.load(Ordering::SeqCst)
    }

    pub fn is_on_disk(&self) -> bool {
        !self.backend.load().directory.is_memory()
    }

    /// Entries visible through the published searcher.
    pub fn num_entries(&self) -> u64 {
        self.holder.acquire().searcher().num_docs()
    }

    /// Etag recorded by the most recent commit, from commit user-data.
    pub fn last_committed_etag(&self) -> Result<Option<Etag>> {
        let backend = self.backend.load();
        let metas = backend.tantivy.load_metas()?;
        match metas.payload {
            None => Ok(None),
            Some(payload) => Etag::from_hex(&payload).map(Some),
        }
    }

    /// Ask for the memory-to-disk transition at the next commit.
    pub fn force_write_to_disk(&self) {
        self.force_to_disk.store(true, Ordering::SeqCst);
    }

    /// Hint from the external scheduler that the index has caught up with
    /// the document store; an up-to-date memory-backed index moves to disk.
    pub fn set_index_is_current(&self, current: bool) {
        self.index_is_current.store(current, Ordering::SeqCst);
    }

    // --- Mutations (all serialized by the write lock) ---

    /// Apply one batch: route through the writer, commit with the highest
    /// etag, republish the searcher when anything changed, and evaluate the
    /// memory-to-disk transition.
    pub fn index_documents(
        &self,
        batch: &IndexingBatch,
        token: &CancellationToken,
    ) -> Result<IndexedItemsInfo> {
        self.ensure_not_disposed()?;
        if batch.len() > self.config.max_number_of_items_to_process_in_single_batch {
            return Err(Error::Indexing(format!(
                "batch of {} documents exceeds the configured maximum of {}",
                batch.len(),
                self.config.max_number_of_items_to_process_in_single_batch
            )));
        }

        self.touch_last_index_time();
        let started = self.context.clock.utc_now();
        let timer = Instant::now();
        let errors_before = self.error_log.len();

        let mut guard = self.lock_write("indexing batch");
        self.is_map_indexing_in_progress.store(true, Ordering::SeqCst);

        let result = {
            let ctx = ApplyContext {
                error_log: &self.error_log,
                update_triggers: &self.extensions.update_triggers,
                currently_indexing: &self.currently_indexing,
                clock: &*self.context.clock,
                token,
            };
            let writer = guard.writer();
            writer.apply(batch, &*self.indexing_fn, &ctx).and_then(|info| {
                let commit_etag = self.commit_etag(info.highest_etag)?;
                writer.commit(commit_etag, &self.retention)?;
                Ok(info)
            })
        };
        self.is_map_indexing_in_progress.store(false, Ordering::SeqCst);

        let info = match result {
            Err(err) => {
                let wrapped = Error::write_failed(err);
                self.record_write_failure(&wrapped);
                return Err(wrapped);
            }
            Ok(info) => info,
        };
        self.write_errors.record_success();

        if info.changed_docs > 0 {
            self.republish()?;
        }
        self.maybe_materialize(&mut guard)?;
        drop(guard);

        self.touch_last_index_time();
        let errors_after = self.error_log.len();
        self.record_batch_stats(batch, started, timer, errors_after.saturating_sub(errors_before))?;
        debug!(
            index = %self.definition.name,
            docs = batch.len(),
            changed = info.changed_docs,
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "batch indexed"
        );
        Ok(info)
    }

    /// Delete entries for the given document keys.
    pub fn remove(&self, keys: &[String], token: &CancellationToken) -> Result<IndexedItemsInfo> {
        let batch = IndexingBatch {
            documents: Vec::new(),
            deletions: keys.to_vec(),
        };
        self.index_documents(&batch, token)
    }

    /// Commit pending work, stamping `etag` into commit user-data.
    pub fn flush(&self, etag: Etag) -> Result<()> {
        self.ensure_not_disposed()?;
        let mut guard = self.lock_write("flushing index");
        let commit_etag = self.commit_etag(etag)?;
        guard.writer().commit(commit_etag, &self.retention)
    }

    /// Merge all segments into one; long-running.
    pub fn merge_segments(&self) -> Result<()> {
        self.ensure_not_disposed()?;
        let mut guard = self.lock_write("merging segments");
        guard.writer().optimize()?;
        drop(guard);
        self.republish()
    }

    /// Drop every entry and republish an empty view.
    pub fn reset(&self) -> Result<()> {
        self.ensure_not_disposed()?;
        let mut guard = self.lock_write("resetting index");
        let etag = self.last_committed_etag()?.unwrap_or_else(Etag::zero);
        guard.writer().delete_all()?;
        guard.writer().commit(etag, &self.retention)?;
        drop(guard);
        self.republish()
    }

    /// Orderly shutdown: final commit, bounded wait for outstanding
    /// searcher readers, then writer teardown.
    pub fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut guard = self.lock_write("disposing index");
        if self.priority.get() != IndexingPriority::Error {
            let etag = self.last_committed_etag()?.unwrap_or_else(Etag::zero);
            if let Err(err) = guard.writer().commit(etag, &self.retention) {
                warn!(index = %self.definition.name, "final commit failed: {err}");
            }
        }

        let backend = self.backend.load();
        if let Some(handle) = self.holder.publish(backend.reader.searcher(), true)? {
            if !handle.wait(SHUTDOWN_DRAIN_TIMEOUT) {
                warn!(
                    index = %self.definition.name,
                    "timed out waiting for searcher readers at shutdown"
                );
            }
        }

        if let Some(index_writer) = guard.guard.take() {
            index_writer.dispose()?;
        }
        info!(index = %self.definition.name, "index disposed");
        Ok(())
    }

    // --- Queries (never take the write lock) ---

    /// Execute a query against the currently published snapshot. The
    /// returned iterator holds that snapshot until dropped.
    pub fn query(&self, query: IndexQuery, token: &CancellationToken) -> Result<QueryResults> {
        self.ensure_not_disposed()?;

        crate::query::validate(&query, &self.definition)?;

        if self.priority.get() == IndexingPriority::Error {
            return Err(Error::IndexDisabled);
        }

        let backend = self.backend.load();
        let querying_stack = AnalyzerStack::build(
            &self.definition,
            &self.analyzers,
            &self.extensions.analyzer_generators,
            AnalyzerMode::Querying,
        )?;
        let tokenizers = querying_stack.tokenizer_manager();
        let default_fields = backend.schema_fields.default_search_fields();

        let clause_texts = match crate::query::split_intersect(&query.query)? {
            Some(clauses) => clauses,
            None => vec![query.query.clone()],
        };
        let mut clauses = Vec::with_capacity(clause_texts.len());
        for text in &clause_texts {
            let mut parsed = crate::query::parse_clause(
                text,
                &self.definition,
                &backend.schema,
                &default_fields,
                &tokenizers,
            )?;
            for trigger in &self.extensions.query_triggers {
                parsed = trigger.rewrite(parsed);
            }
            clauses.push(parsed);
        }

        self.last_query_time_ms
            .store(self.context.clock.utc_now().timestamp_millis(), Ordering::SeqCst);

        let fan_out = self.fan_out_factor();
        let guard = self.holder.acquire();
        let operation = QueryOperation::new(
            guard,
            Arc::clone(&self.definition),
            &backend.schema_fields,
            query,
            clauses,
            fan_out,
            token.clone(),
        )?;
        operation.into_results()
    }

    // --- Backup plumbing ---

    pub(crate) fn retention(&self) -> &Arc<SnapshotRetention> {
        &self.retention
    }

    pub(crate) fn backend_index(&self) -> TantivyIndex {
        self.backend.load().tantivy.clone()
    }

    pub(crate) fn disk_path(&self) -> &Path {
        &self.disk_path
    }

    /// Backup setup: materialize a memory-backed directory, then, under the
    /// write lock with an empty commit, let `f` capture the commit-identity
    /// files and pin the snapshot before the lock is released.
    pub(crate) fn backup_setup<F>(&self, f: F) -> Result<directory::IndexSnapshot>
    where
        F: FnOnce(&TantivyIndex) -> Result<()>,
    {
        {
            let mut guard = self.lock_write("preparing backup");
            let backend = self.backend.load();
            if backend.directory.is_memory() {
                self.materialize(&mut guard)?;
            }
        }
        let mut guard = self.lock_write("backing up commit point");
        let etag = self.last_committed_etag()?.unwrap_or_else(Etag::zero);
        guard.writer().commit(etag, &self.retention)?;
        let backend = self.backend.load();
        f(&backend.tantivy)?;
        Ok(self.retention.snapshot(directory::live_files(&backend.tantivy)?))
    }

    // --- Private helpers ---

    fn ensure_not_disposed(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(Error::Disposed);
        }
        Ok(())
    }

    /// Acquire the write lock in 100 ms slices, logging who holds it while
    /// we wait.
    fn lock_write(&self, reason: &'static str) -> WriteGuard<'_> {
        loop {
            if let Some(guard) = self.write_lock.try_lock_for(WRITE_LOCK_SLICE) {
                *self.wait_reason.lock() = Some(reason);
                return WriteGuard { index: self, guard };
            }
            let held_for = *self.wait_reason.lock();
            debug!(
                index = %self.definition.name,
                wanted = reason,
                held_for = held_for.unwrap_or("unknown"),
                "waiting for index write lock"
            );
        }
    }

    /// Commits must never regress the recorded etag, even for batches that
    /// only delete.
    fn commit_etag(&self, batch_etag: Etag) -> Result<Etag> {
        let last = self.last_committed_etag()?.unwrap_or_else(Etag::zero);
        Ok(batch_etag.max(last))
    }

    fn touch_last_index_time(&self) {
        let now = self.context.clock.utc_now().timestamp_millis();
        self.last_index_time_ms.fetch_max(now, Ordering::SeqCst);
    }

    fn republish(&self) -> Result<()> {
        let backend = self.backend.load();
        backend.reader.reload()?;
        self.holder.publish(backend.reader.searcher(), false)?;
        Ok(())
    }

    fn record_write_failure(&self, err: &Error) {
        self.error_log.record(ErrorRecord {
            index_id: self.definition.index_id,
            document_key: None,
            message: err.to_string(),
            source: "write".to_string(),
            timestamp: self.context.clock.utc_now(),
        });
        if self.write_errors.record_failure() {
            self.priority.set(IndexingPriority::Error);
            self.context.alerts.alert(
                "Index quarantined",
                &format!(
                    "index '{}' was moved to the Error priority after {} consecutive write failures",
                    self.definition.name, WRITE_ERROR_THRESHOLD
                ),
            );
        }
    }

    fn record_batch_stats(
        &self,
        batch: &IndexingBatch,
        started: DateTime<Utc>,
        timer: Instant,
        new_errors: usize,
    ) -> Result<()> {
        let operation = if batch.is_empty() {
            BatchOperation::Ignore
        } else if self.definition.is_map_reduce {
            BatchOperation::Reduce
        } else {
            BatchOperation::Map
        };
        self.performance.push(IndexingPerformanceStats {
            input_count: batch.len(),
            output_count: batch.len(),
            operation,
            started,
            duration: timer.elapsed(),
        });

        let attempts = batch.len() as u64;
        let errors = new_errors as u64;
        if self.definition.is_map_reduce {
            self.reduce_attempts.fetch_add(attempts, Ordering::SeqCst);
            self.reduce_errors.fetch_add(errors, Ordering::SeqCst);
        } else {
            self.indexing_attempts.fetch_add(attempts, Ordering::SeqCst);
            self.indexing_errors.fetch_add(errors, Ordering::SeqCst);
        }

        if let Some(store) = &self.context.stats_store {
            update_stats_with_retry(
                store.as_ref(),
                &StatsUpdate {
                    index_id: self.definition.index_id,
                    indexing_attempts: self.indexing_attempts.load(Ordering::SeqCst),
                    indexing_errors: self.indexing_errors.load(Ordering::SeqCst),
                    reduce_attempts: self.reduce_attempts.load(Ordering::SeqCst),
                    reduce_errors: self.reduce_errors.load(Ordering::SeqCst),
                },
            )?;
        }
        Ok(())
    }

    fn fan_out_factor(&self) -> usize {
        if !self.definition.is_map_reduce && self.definition.max_index_outputs_per_document.is_none()
        {
            return 1;
        }
        let cap = self.definition.effective_max_outputs(&self.config);
        if cap < 0 {
            50
        } else {
            cap.max(1) as usize
        }
    }

    fn maybe_materialize(&self, guard: &mut WriteGuard<'_>) -> Result<()> {
        let backend = self.backend.load();
        let force = self.force_to_disk.load(Ordering::SeqCst);
        let current = self.index_is_current.load(Ordering::SeqCst);
        if !guard
            .writer()
            .should_materialize(&backend.directory, force, current)?
        {
            return Ok(());
        }
        self.materialize(guard)
    }

    /// Copy the memory directory to disk, then reopen writer, reader and
    /// searcher on the new file-backed directory.
    fn materialize(&self, guard: &mut WriteGuard<'_>) -> Result<()> {
        let backend = self.backend.load();
        if !backend.directory.is_memory() {
            return Ok(());
        }
        info!(index = %self.definition.name, path = %self.disk_path.display(), "writing memory index to disk");
        directory::materialize_to_disk(&backend.tantivy, &self.disk_path)?;

        let old_writer = guard.guard.take().unwrap();
        old_writer.dispose()?;

        let tantivy = TantivyIndex::open_in_dir(&self.disk_path)?;
        let indexing_stack = AnalyzerStack::build(
            &self.definition,
            &self.analyzers,
            &self.extensions.analyzer_generators,
            AnalyzerMode::Indexing,
        )?;
        indexing_stack.register_into(tantivy.tokenizers());

        let schema = tantivy.schema();
        let schema_fields = SchemaFields::from_schema(&self.definition, &schema)?;
        let new_writer = writer::IndexWriter::open(
            tantivy.clone(),
            Arc::clone(&self.definition),
            schema_fields.clone(),
            Arc::clone(&self.config),
        )?;
        let reader = tantivy.reader()?;

        *guard.guard = Some(new_writer);
        self.backend.store(Arc::new(IndexBackend {
            tantivy,
            directory: SegmentDirectory::disk(self.disk_path.clone()),
            reader,
            schema,
            schema_fields,
        }));
        self.force_to_disk.store(false, Ordering::SeqCst);
        self.republish()
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if !self.disposed.load(Ordering::SeqCst) {
            if let Err(err) = self.dispose() {
                warn!(index = %self.definition.name, "dispose during drop failed: {err}");
            }
        }
    }
}
