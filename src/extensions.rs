//! Extension registries: ordered collections of trait objects initialized
//! by the host before an index is opened.

use tantivy::query::Query;
use tantivy::tokenizer::TextAnalyzer;

use crate::entry::IndexEntry;

/// May replace the analyzer chosen for a field. Invoked last during
/// analyzer-stack assembly, once per field (the pseudo-field
/// `__all_fields` stands for the stack default).
pub trait AnalyzerGenerator: Send + Sync {
    fn generate(&self, field: &str, current: &TextAnalyzer) -> Option<TextAnalyzer>;
}

/// May rewrite a parsed query before execution. Triggers run in
/// registration order; each sees the previous trigger's output.
pub trait QueryTrigger: Send + Sync {
    fn rewrite(&self, query: Box<dyn Query>) -> Box<dyn Query>;
}

/// Observes entry creation and deletion during batch application.
pub trait IndexUpdateTrigger: Send + Sync {
    fn on_entry_created(&self, document_key: &str, entry: &IndexEntry);
    fn on_entry_deleted(&self, document_key: &str);
}

/// All extension points of one index.
#[derive(Default)]
pub struct ExtensionsRegistry {
    pub analyzer_generators: Vec<Box<dyn AnalyzerGenerator>>,
    pub query_triggers: Vec<Box<dyn QueryTrigger>>,
    pub update_triggers: Vec<Box<dyn IndexUpdateTrigger>>,
}

impl ExtensionsRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}
