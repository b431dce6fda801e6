//! Per-field analyzer assembly.
//!
//! An index definition names analyzers per field; the stack resolves those
//! names against a registry of analyzer factories and produces the
//! per-field tokenizer set for either indexing or querying. The querying
//! variant skips analyzers marked not-for-querying and may be transformed
//! by registered analyzer generators.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use tantivy::tokenizer::{
    LowerCaser, RawTokenizer, SimpleTokenizer, TextAnalyzer, TokenizerManager,
    WhitespaceTokenizer,
};

use crate::definition::{FieldIndexing, IndexDefinition};
use crate::error::{Error, Result};
use crate::extensions::AnalyzerGenerator;

/// Name of the built-in default analyzer: keyword tokenization, lowercased.
pub const DEFAULT_ANALYZER_NAME: &str = "LowercaseKeyword";
pub const KEYWORD_ANALYZER_NAME: &str = "Keyword";
pub const STANDARD_ANALYZER_NAME: &str = "Standard";
pub const WHITESPACE_ANALYZER_NAME: &str = "Whitespace";

/// Definition key that replaces the default analyzer for every field.
pub const ALL_FIELDS_KEY: &str = "__all_fields";

/// Tokenizer name the schema uses for fields without a dedicated analyzer.
pub const DEFAULT_TOKENIZER: &str = "lowercase_keyword";

type AnalyzerFactory = Arc<dyn Fn() -> TextAnalyzer + Send + Sync>;

#[derive(Clone)]
struct AnalyzerRegistration {
    factory: AnalyzerFactory,
    for_querying: bool,
}

/// Named analyzer factories available to index definitions.
#[derive(Clone)]
pub struct AnalyzerRegistry {
    entries: HashMap<String, AnalyzerRegistration>,
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        let mut registry = Self {
            entries: HashMap::new(),
        };
        registry.register(DEFAULT_ANALYZER_NAME, true, || {
            TextAnalyzer::builder(RawTokenizer::default())
                .filter(LowerCaser)
                .build()
        });
        registry.register(KEYWORD_ANALYZER_NAME, true, || {
            TextAnalyzer::builder(RawTokenizer::default()).build()
        });
        registry.register(STANDARD_ANALYZER_NAME, true, || {
            TextAnalyzer::builder(SimpleTokenizer::default())
                .filter(LowerCaser)
                .build()
        });
        registry.register(WHITESPACE_ANALYZER_NAME, true, || {
            TextAnalyzer::builder(WhitespaceTokenizer::default()).build()
        });
        registry
    }
}

impl AnalyzerRegistry {
    /// Register a named analyzer. `for_querying: false` marks analyzers
    /// that only make sense at indexing time (e.g. ngram expansion); the
    /// querying stack falls back to the default for their fields.
    pub fn register<F>(&mut self, name: &str, for_querying: bool, factory: F)
    where
        F: Fn() -> TextAnalyzer + Send + Sync + 'static,
    {
        self.entries.insert(
            name.to_string(),
            AnalyzerRegistration {
                factory: Arc::new(factory),
                for_querying,
            },
        );
    }

    pub fn create(&self, name: &str) -> Result<TextAnalyzer> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| Error::AnalyzerNotFound {
                name: name.to_string(),
            })?;
        Ok((entry.factory)())
    }

    pub fn is_for_querying(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .map(|entry| entry.for_querying)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerMode {
    Indexing,
    Querying,
}

struct FieldAnalyzer {
    field: String,
    tokenizer_name: String,
    analyzer: TextAnalyzer,
}

/// The assembled per-field analyzer set for one mode.
pub struct AnalyzerStack {
    mode: AnalyzerMode,
    default: TextAnalyzer,
    per_field: Vec<FieldAnalyzer>,
}

impl std::fmt::Debug for AnalyzerStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerStack")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl AnalyzerStack {
    /// Assemble the stack for `definition`, applying the resolution rules
    /// in order (later rules override earlier ones for the same field):
    /// caller default, `__all_fields` override, named per-field analyzers,
    /// indexing-mode fallbacks, then the registered generators.
    pub fn build(
        definition: &IndexDefinition,
        registry: &AnalyzerRegistry,
        generators: &[Box<dyn AnalyzerGenerator>],
        mode: AnalyzerMode,
    ) -> Result<AnalyzerStack> {
        let mut default_name = DEFAULT_ANALYZER_NAME;
        if let Some(name) = definition.analyzers.get(ALL_FIELDS_KEY) {
            if mode == AnalyzerMode::Indexing || registry.is_for_querying(name) {
                default_name = name.as_str();
            }
        }
        let mut default = registry.create(default_name)?;

        let mut assignments: BTreeMap<&str, TextAnalyzer> = BTreeMap::new();

        for (field, name) in ordered(&definition.analyzers) {
            if field == ALL_FIELDS_KEY {
                continue;
            }
            // An analyzer marked not-for-querying is skipped at query time,
            // but the field keeps an entry so its tokenizer name resolves:
            // the stack default stands in.
            if mode == AnalyzerMode::Querying && !registry.is_for_querying(name) {
                assignments.insert(field, default.clone());
                continue;
            }
            assignments.insert(field, registry.create(name)?);
        }

        for (field, indexing) in ordered(&definition.indexes) {
            match indexing {
                FieldIndexing::NotAnalyzed => {
                    assignments.insert(field, registry.create(KEYWORD_ANALYZER_NAME)?);
                }
                FieldIndexing::Analyzed => {
                    if !definition.analyzers.contains_key(field) {
                        assignments.insert(field, registry.create(STANDARD_ANALYZER_NAME)?);
                    }
                }
                FieldIndexing::NotIndexed => {
                    assignments.remove(field);
                }
            }
        }

        for generator in generators {
            if let Some(replacement) = generator.generate(ALL_FIELDS_KEY, &default) {
                default = replacement;
            }
            for (field, analyzer) in assignments.iter_mut() {
                if let Some(replacement) = generator.generate(field, analyzer) {
                    *analyzer = replacement;
                }
            }
        }

        let per_field = assignments
            .into_iter()
            .map(|(field, analyzer)| FieldAnalyzer {
                tokenizer_name: field_tokenizer_name(field),
                field: field.to_string(),
                analyzer,
            })
            .collect();

        Ok(AnalyzerStack {
            mode,
            default,
            per_field,
        })
    }

    pub fn mode(&self) -> AnalyzerMode {
        self.mode
    }

    /// Tokenizer name the schema must reference for `field`.
    pub fn tokenizer_name_for(&self, field: &str) -> &str {
        self.per_field
            .iter()
            .find(|fa| fa.field == field)
            .map(|fa| fa.tokenizer_name.as_str())
            .unwrap_or(DEFAULT_TOKENIZER)
    }

    pub fn analyzer_for(&self, field: &str) -> &TextAnalyzer {
        self.per_field
            .iter()
            .find(|fa| fa.field == field)
            .map(|fa| &fa.analyzer)
            .unwrap_or(&self.default)
    }

    /// Register every analyzer of this stack into `manager` under the names
    /// the schema references.
    pub fn register_into(&self, manager: &TokenizerManager) {
        manager.register(DEFAULT_TOKENIZER, self.default.clone());
        for fa in &self.per_field {
            manager.register(&fa.tokenizer_name, fa.analyzer.clone());
        }
    }

    /// Fresh tokenizer manager carrying this stack; handed to the query
    /// parser so query-time analysis can differ from indexing-time.
    pub fn tokenizer_manager(&self) -> TokenizerManager {
        let manager = TokenizerManager::default();
        self.register_into(&manager);
        manager
    }
}

/// Deterministic tokenizer name for a field, shared by the indexing and
/// querying stacks so the schema resolves to the right analyzer in both.
pub fn field_tokenizer_name(field: &str) -> String {
    let sanitized: String = field
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("field_{sanitized}")
}

fn ordered<V>(map: &HashMap<String, V>) -> impl Iterator<Item = (&str, &V)> {
    let mut entries: Vec<(&str, &V)> = map.iter().map(|(k, v)| (k.as_str(), v)).collect();
    entries.sort_by_key(|(k, _)| *k);
    entries.into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::IndexDefinition;

    fn analyze(analyzer: &TextAnalyzer, text: &str) -> Vec<String> {
        let mut analyzer = analyzer.clone();
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while stream.advance() {
            tokens.push(stream.token().text.clone());
        }
        tokens
    }

    #[test]
    fn default_is_lowercase_keyword() {
        let definition = IndexDefinition::new("test", 1);
        let stack = AnalyzerStack::build(
            &definition,
            &AnalyzerRegistry::default(),
            &[],
            AnalyzerMode::Indexing,
        )
        .unwrap();
        assert_eq!(analyze(stack.analyzer_for("anything"), "Hello World"), vec!["hello world"]);
    }

    #[test]
    fn not_analyzed_fields_get_keyword() {
        let mut definition = IndexDefinition::new("test", 1);
        definition
            .indexes
            .insert("tag".to_string(), FieldIndexing::NotAnalyzed);
        let stack = AnalyzerStack::build(
            &definition,
            &AnalyzerRegistry::default(),
            &[],
            AnalyzerMode::Indexing,
        )
        .unwrap();
        assert_eq!(analyze(stack.analyzer_for("tag"), "Hello World"), vec!["Hello World"]);
    }

    #[test]
    fn analyzed_fields_without_explicit_analyzer_get_standard() {
        let mut definition = IndexDefinition::new("test", 1);
        definition
            .indexes
            .insert("body".to_string(), FieldIndexing::Analyzed);
        let stack = AnalyzerStack::build(
            &definition,
            &AnalyzerRegistry::default(),
            &[],
            AnalyzerMode::Indexing,
        )
        .unwrap();
        assert_eq!(
            analyze(stack.analyzer_for("body"), "Hello World"),
            vec!["hello", "world"]
        );
    }

    #[test]
    fn explicit_analyzer_wins_over_analyzed_fallback() {
        let mut definition = IndexDefinition::new("test", 1);
        definition
            .indexes
            .insert("body".to_string(), FieldIndexing::Analyzed);
        definition
            .analyzers
            .insert("body".to_string(), WHITESPACE_ANALYZER_NAME.to_string());
        let stack = AnalyzerStack::build(
            &definition,
            &AnalyzerRegistry::default(),
            &[],
            AnalyzerMode::Indexing,
        )
        .unwrap();
        assert_eq!(
            analyze(stack.analyzer_for("body"), "Hello World"),
            vec!["Hello", "World"]
        );
    }

    #[test]
    fn querying_stack_skips_not_for_querying_analyzers() {
        let mut registry = AnalyzerRegistry::default();
        registry.register("IndexOnly", false, || {
            TextAnalyzer::builder(WhitespaceTokenizer::default()).build()
        });

        let mut definition = IndexDefinition::new("test", 1);
        definition
            .analyzers
            .insert("body".to_string(), "IndexOnly".to_string());

        let indexing =
            AnalyzerStack::build(&definition, &registry, &[], AnalyzerMode::Indexing).unwrap();
        assert_eq!(
            analyze(indexing.analyzer_for("body"), "Hello World"),
            vec!["Hello", "World"]
        );

        let querying =
            AnalyzerStack::build(&definition, &registry, &[], AnalyzerMode::Querying).unwrap();
        assert_eq!(
            analyze(querying.analyzer_for("body"), "Hello World"),
            vec!["hello world"]
        );
    }

    #[test]
    fn all_fields_override_replaces_default() {
        let mut definition = IndexDefinition::new("test", 1);
        definition
            .analyzers
            .insert(ALL_FIELDS_KEY.to_string(), STANDARD_ANALYZER_NAME.to_string());
        let stack = AnalyzerStack::build(
            &definition,
            &AnalyzerRegistry::default(),
            &[],
            AnalyzerMode::Indexing,
        )
        .unwrap();
        assert_eq!(
            analyze(stack.analyzer_for("anything"), "Hello World"),
            vec!["hello", "world"]
        );
    }

    #[test]
    fn unknown_analyzer_is_an_error() {
        let mut definition = IndexDefinition::new("test", 1);
        definition
            .analyzers
            .insert("body".to_string(), "NoSuchAnalyzer".to_string());
        let err = AnalyzerStack::build(
            &definition,
            &AnalyzerRegistry::default(),
            &[],
            AnalyzerMode::Indexing,
        )
        .unwrap_err();
        assert!(matches!(err, Error::AnalyzerNotFound { .. }));
    }

    struct BodyWhitespaceGenerator;

    impl AnalyzerGenerator for BodyWhitespaceGenerator {
        fn generate(&self, field: &str, _current: &TextAnalyzer) -> Option<TextAnalyzer> {
            if field == "body" {
                Some(TextAnalyzer::builder(WhitespaceTokenizer::default()).build())
            } else {
                None
            }
        }
    }

    #[test]
    fn generators_may_replace_field_analyzers() {
        let mut definition = IndexDefinition::new("test", 1);
        definition
            .indexes
            .insert("body".to_string(), FieldIndexing::Analyzed);
        let generators: Vec<Box<dyn AnalyzerGenerator>> = vec![Box::new(BodyWhitespaceGenerator)];
        let stack = AnalyzerStack::build(
            &definition,
            &AnalyzerRegistry::default(),
            &generators,
            AnalyzerMode::Indexing,
        )
        .unwrap();
        assert_eq!(
            analyze(stack.analyzer_for("body"), "Hello World"),
            vec!["Hello", "World"]
        );
    }
}
