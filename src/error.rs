use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("index is disabled after repeated write failures")]
    IndexDisabled,

    #[error("index write failed: {0}")]
    IndexWriteFailed(#[source] Box<Error>),

    #[error("invalid spatial shape on document '{document_id}'")]
    InvalidSpatialShape { document_id: String },

    #[error("field '{field}' is not indexed")]
    FieldNotIndexed { field: String },

    #[error("INTERSECT query requires at least two sub-queries")]
    IntersectMalformed,

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("concurrency conflict while updating index stats")]
    ConcurrencyConflict,

    #[error("analyzer '{name}' is not registered")]
    AnalyzerNotFound { name: String },

    #[error("could not obtain '{0}' for index mutation")]
    WriteLockHeld(String),

    #[error("query parse error: {0}")]
    QueryParse(String),

    #[error("indexing error: {0}")]
    Indexing(String),

    #[error("index has been disposed")]
    Disposed,

    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a writer-level failure so callers can distinguish it from
    /// per-document errors, which are logged and skipped instead.
    pub fn write_failed(inner: Error) -> Error {
        Error::IndexWriteFailed(Box::new(inner))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
