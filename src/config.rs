//! Engine configuration consumed by indexes and their writers.

use serde::{Deserialize, Serialize};

/// Tuning knobs for one engine instance. All indexes opened through the
/// same engine share a configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Keep new indexes entirely in memory until they grow past
    /// `new_index_in_memory_max_bytes` or are forced to disk.
    pub run_in_memory: bool,

    /// After a commit, once this many megabytes have been written since the
    /// writer was opened, stale segment files are collected and the
    /// memory-to-disk transition is evaluated.
    pub flush_index_to_disk_size_mb: usize,

    /// Recreate the underlying library writer after this many writes to
    /// bound its internal buffers.
    pub max_index_writes_before_recreate: usize,

    /// Size threshold at which a memory-backed index is materialized to disk.
    pub new_index_in_memory_max_bytes: u64,

    /// Upper bound on documents accepted into a single batch.
    pub max_number_of_items_to_process_in_single_batch: usize,

    /// Fan-out cap for map/reduce indexes; -1 disables the check.
    pub max_map_reduce_index_outputs_per_document: i32,

    /// Fan-out cap for plain map indexes; -1 disables the check.
    pub max_simple_index_outputs_per_document: i32,

    /// Heap handed to the library writer.
    pub writer_heap_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_in_memory: false,
            flush_index_to_disk_size_mb: 5,
            max_index_writes_before_recreate: 256 * 1024,
            new_index_in_memory_max_bytes: 64 * 1024 * 1024,
            max_number_of_items_to_process_in_single_batch: 128 * 1024,
            max_map_reduce_index_outputs_per_document: 50,
            max_simple_index_outputs_per_document: 15,
            writer_heap_bytes: 50_000_000,
        }
    }
}

impl EngineConfig {
    /// Configuration for tests: memory-backed with a small writer heap.
    pub fn in_memory() -> Self {
        Self {
            run_in_memory: true,
            writer_heap_bytes: 15_000_000,
            ..Self::default()
        }
    }

    pub fn flush_threshold_bytes(&self) -> u64 {
        (self.flush_index_to_disk_size_mb as u64) * 1024 * 1024
    }
}
