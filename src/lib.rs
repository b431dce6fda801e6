// Aerie - Secondary-Index Engine Library
//!
//! Aerie maintains tantivy-backed inverted indexes for a stream of document
//! changes coming out of a document store: one writer per index, versioned
//! searcher snapshots for queries running concurrently with writes, and hot
//! point-in-time backups with incremental manifests.

pub mod analysis;
pub mod backup;
pub mod config;
pub mod context;
pub mod definition;
pub mod directory;
pub mod entry;
pub mod error;
pub mod extensions;
pub mod index;
pub mod query;

// Re-export common types
pub use config::EngineConfig;
pub use context::{AlertSink, CancellationToken, Clock, IndexContext, StatsStore, SystemClock};
pub use definition::{FieldIndexing, IndexDefinition};
pub use entry::{Etag, IndexEntry, IndexedItemsInfo, IndexingBatch, IndexingFn, SourceDocument};
pub use error::{Error, Result};
pub use index::{Index, IndexOptions, IndexingPriority};
pub use query::{
    HighlightedField, IndexQuery, IndexQueryResult, QueryResults, SortField, SpatialIndexQuery,
};
