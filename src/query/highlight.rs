//! Highlight fragment generation with configurable surround tags.

use tantivy::schema::Field;
use tantivy::snippet::{Snippet, SnippetGenerator};
use tantivy::query::Query;
use tantivy::{Searcher, TantivyDocument};

use crate::error::Result;
use crate::query::HighlightedField;

/// Default tag pairs cycled across highlighted fields when the caller does
/// not override them.
const DEFAULT_TAGS: &[(&str, &str)] = &[
    ("<b style=\"background:yellow\">", "</b>"),
    ("<b style=\"background:lawngreen\">", "</b>"),
    ("<b style=\"background:aquamarine\">", "</b>"),
    ("<b style=\"background:magenta\">", "</b>"),
];

pub(crate) struct FieldHighlighter {
    pub config: HighlightedField,
    generator: SnippetGenerator,
    pre_tag: String,
    post_tag: String,
}

impl FieldHighlighter {
    /// Build one highlighter per configured field. Tag overrides are
    /// positional; missing positions fall back to the default colored tags.
    pub fn build_all(
        searcher: &Searcher,
        query: &dyn Query,
        fields: &[(HighlightedField, Field)],
        pre_tags: &[String],
        post_tags: &[String],
    ) -> Result<Vec<FieldHighlighter>> {
        let mut highlighters = Vec::with_capacity(fields.len());
        for (position, (config, field)) in fields.iter().enumerate() {
            let mut generator = SnippetGenerator::create(searcher, query, *field)?;
            generator.set_max_num_chars(config.fragment_length.max(1));
            let default = DEFAULT_TAGS[position % DEFAULT_TAGS.len()];
            let pre_tag = pre_tags.get(position).cloned().unwrap_or_else(|| default.0.to_string());
            let post_tag = post_tags
                .get(position)
                .cloned()
                .unwrap_or_else(|| default.1.to_string());
            highlighters.push(FieldHighlighter {
                config: config.clone(),
                generator,
                pre_tag,
                post_tag,
            });
        }
        Ok(highlighters)
    }

    /// Fragments for one hit; empty when nothing in the field matched.
    pub fn fragments(&self, doc: &TantivyDocument) -> Vec<String> {
        let snippet = self.generator.snippet_from_doc(doc);
        if snippet.fragment().is_empty() || snippet.highlighted().is_empty() {
            return Vec::new();
        }
        vec![self.surround(&snippet)]
    }

    fn surround(&self, snippet: &Snippet) -> String {
        let fragment = snippet.fragment();
        let mut out = String::with_capacity(fragment.len() + 32);
        let mut last = 0;
        for range in snippet.highlighted() {
            if range.start < last || range.end > fragment.len() {
                continue;
            }
            out.push_str(&fragment[last..range.start]);
            out.push_str(&self.pre_tag);
            out.push_str(&fragment[range.clone()]);
            out.push_str(&self.post_tag);
            last = range.end;
        }
        out.push_str(&fragment[last..]);
        out
    }

    /// Projection key the fragments land under for projection and
    /// map/reduce results.
    pub fn fragments_key(&self) -> String {
        self.config
            .fragments_field
            .clone()
            .unwrap_or_else(|| format!("{}_Fragments", self.config.field))
    }
}
