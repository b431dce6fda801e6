// Index definitions and the library schema built from them.
//
// A definition is immutable for the lifetime of one Index instance: field
// indexing modes, per-field analyzer names, the fan-out cap and the
// map/reduce flag. The schema mirrors the definition plus the engine's
// reserved fields: document identity, reduce key, numeric `_Range`
// companions, projection markers and the optional catch-all.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tantivy::schema::{
    Field, IndexRecordOption, JsonObjectOptions, Schema, TextFieldIndexing, TextOptions, FAST,
    INDEXED, STORED,
};

use crate::analysis::AnalyzerStack;
use crate::config::EngineConfig;
use crate::entry::{
    self, spatial_lat_field, spatial_lng_field, CATCH_ALL_FIELD, CONVERT_TO_JSON_SUFFIX,
    DISTANCE_FIELD, DOCUMENT_ID_FIELD, IS_ARRAY_SUFFIX, RANDOM_FIELD_PREFIX, RANGE_SUFFIX,
    REDUCE_KEY_FIELD, TEMP_SCORE_FIELD,
};

/// How one field is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldIndexing {
    /// Single keyword term, matched exactly.
    NotAnalyzed,
    /// Full-text tokenization.
    Analyzed,
    /// Stored only, never searchable.
    NotIndexed,
}

/// Immutable description of one secondary index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub index_id: u32,
    /// Declared entry fields. Declaring the catch-all `_` lets the indexing
    /// function emit arbitrary dynamic field names and disables the
    /// unknown-field guard at query time.
    pub fields: Vec<String>,
    pub indexes: HashMap<String, FieldIndexing>,
    pub analyzers: HashMap<String, String>,
    /// Overrides the engine-wide fan-out cap; -1 disables the check.
    pub max_index_outputs_per_document: Option<i32>,
    pub is_map_reduce: bool,
    /// Fields indexed as coordinate pairs for shape filtering and
    /// `__distance` sorting.
    pub spatial_fields: Vec<String>,
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>, index_id: u32) -> Self {
        Self {
            name: name.into(),
            index_id,
            fields: Vec::new(),
            indexes: HashMap::new(),
            analyzers: HashMap::new(),
            max_index_outputs_per_document: None,
            is_map_reduce: false,
            spatial_fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: &str) -> Self {
        self.fields.push(name.to_string());
        self
    }

    pub fn with_index(mut self, name: &str, indexing: FieldIndexing) -> Self {
        if !self.fields.iter().any(|f| f == name) {
            self.fields.push(name.to_string());
        }
        self.indexes.insert(name.to_string(), indexing);
        self
    }

    pub fn with_analyzer(mut self, field: &str, analyzer: &str) -> Self {
        self.analyzers.insert(field.to_string(), analyzer.to_string());
        self
    }

    pub fn with_spatial_field(mut self, name: &str) -> Self {
        self.spatial_fields.push(name.to_string());
        self
    }

    pub fn map_reduce(mut self) -> Self {
        self.is_map_reduce = true;
        self
    }

    pub fn declares_catch_all(&self) -> bool {
        self.fields.iter().any(|f| f == CATCH_ALL_FIELD)
    }

    /// Whether a query may reference `name`. The `_Range` suffix is stripped
    /// before lookup; score and random-ordering pseudo-fields are always
    /// allowed, and the catch-all waives the guard entirely.
    pub fn is_field_queryable(&self, name: &str) -> bool {
        let name = entry::strip_range_suffix(name);
        if name == TEMP_SCORE_FIELD
            || name == DISTANCE_FIELD
            || name.starts_with(RANDOM_FIELD_PREFIX)
        {
            return true;
        }
        if name == DOCUMENT_ID_FIELD || (self.is_map_reduce && name == REDUCE_KEY_FIELD) {
            return true;
        }
        if self.declares_catch_all() {
            return true;
        }
        if self
            .spatial_fields
            .iter()
            .any(|s| name == format!("{s}__lat") || name == format!("{s}__lng"))
        {
            return true;
        }
        self.fields.iter().any(|f| f == name)
            && self.indexes.get(name) != Some(&FieldIndexing::NotIndexed)
    }

    /// Effective fan-out cap. An explicit -1 disables enforcement but is
    /// clamped to 50 for pagination heuristics by the query operation.
    pub fn effective_max_outputs(&self, config: &EngineConfig) -> i32 {
        match self.max_index_outputs_per_document {
            Some(value) => value,
            None if self.is_map_reduce => config.max_map_reduce_index_outputs_per_document,
            None => config.max_simple_index_outputs_per_document,
        }
    }
}

/// Where one entry field lands in the schema.
#[derive(Debug, Clone, Copy)]
pub enum SchemaTarget {
    DocumentId(Field),
    ReduceKey(Field),
    Text(Field),
    Range(Field),
    Marker(Field),
    CatchAll(Field),
}

/// Field handles resolved once at schema build time.
#[derive(Debug, Clone)]
pub struct SchemaFields {
    pub document_id: Field,
    pub reduce_key: Option<Field>,
    text: HashMap<String, Field>,
    range: HashMap<String, Field>,
    markers: HashMap<String, Field>,
    pub catch_all: Option<Field>,
}

impl SchemaFields {
    /// Re-resolve field handles against a schema loaded from disk; used by
    /// `open` where the schema comes from the library's own metadata.
    pub fn from_schema(
        definition: &IndexDefinition,
        schema: &Schema,
    ) -> crate::error::Result<SchemaFields> {
        let lookup = |name: &str| {
            schema.get_field(name).map_err(|_| {
                crate::error::Error::CorruptIndex(format!("schema is missing field '{name}'"))
            })
        };

        let document_id = lookup(DOCUMENT_ID_FIELD)?;
        let reduce_key = if definition.is_map_reduce {
            Some(lookup(REDUCE_KEY_FIELD)?)
        } else {
            None
        };

        let mut text = HashMap::new();
        let mut range = HashMap::new();
        let mut markers = HashMap::new();
        for name in &definition.fields {
            if name == CATCH_ALL_FIELD {
                continue;
            }
            text.insert(name.clone(), lookup(name)?);
            let range_name = format!("{name}{RANGE_SUFFIX}");
            range.insert(range_name.clone(), lookup(&range_name)?);
            for suffix in [IS_ARRAY_SUFFIX, CONVERT_TO_JSON_SUFFIX] {
                let marker_name = format!("{name}{suffix}");
                markers.insert(marker_name.clone(), lookup(&marker_name)?);
            }
        }
        for spatial in &definition.spatial_fields {
            for coord_name in [spatial_lat_field(spatial), spatial_lng_field(spatial)] {
                range.insert(coord_name.clone(), lookup(&coord_name)?);
            }
        }
        let catch_all = if definition.declares_catch_all() {
            Some(lookup(CATCH_ALL_FIELD)?)
        } else {
            None
        };

        Ok(SchemaFields {
            document_id,
            reduce_key,
            text,
            range,
            markers,
            catch_all,
        })
    }

    pub fn resolve(&self, name: &str) -> Option<SchemaTarget> {
        if name == DOCUMENT_ID_FIELD {
            return Some(SchemaTarget::DocumentId(self.document_id));
        }
        if name == REDUCE_KEY_FIELD {
            return self.reduce_key.map(SchemaTarget::ReduceKey);
        }
        if let Some(&field) = self.text.get(name) {
            return Some(SchemaTarget::Text(field));
        }
        if let Some(&field) = self.range.get(name) {
            return Some(SchemaTarget::Range(field));
        }
        if let Some(&field) = self.markers.get(name) {
            return Some(SchemaTarget::Marker(field));
        }
        self.catch_all.map(SchemaTarget::CatchAll)
    }

    pub fn text_field(&self, name: &str) -> Option<Field> {
        self.text.get(name).copied()
    }

    /// Fields the query parser searches when no field is named explicitly.
    pub fn default_search_fields(&self) -> Vec<Field> {
        let mut fields: Vec<(&String, Field)> =
            self.text.iter().map(|(name, &field)| (name, field)).collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        fields.into_iter().map(|(_, field)| field).collect()
    }
}

/// Build the library schema for `definition`, wiring each analyzed field to
/// the tokenizer name the indexing stack registered for it.
pub fn build_schema(
    definition: &IndexDefinition,
    indexing_stack: &AnalyzerStack,
) -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let raw_indexed = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("raw")
                .set_index_option(IndexRecordOption::Basic),
        )
        .set_stored();
    let stored_only = TextOptions::default().set_stored();

    let document_id = builder.add_text_field(DOCUMENT_ID_FIELD, raw_indexed.clone());
    let reduce_key = definition
        .is_map_reduce
        .then(|| builder.add_text_field(REDUCE_KEY_FIELD, raw_indexed.clone()));

    let mut text = HashMap::new();
    let mut range = HashMap::new();
    let mut markers = HashMap::new();

    for name in &definition.fields {
        if name == CATCH_ALL_FIELD {
            continue;
        }
        let options = match definition.indexes.get(name) {
            Some(FieldIndexing::NotIndexed) => stored_only.clone(),
            _ => TextOptions::default()
                .set_indexing_options(
                    TextFieldIndexing::default()
                        .set_tokenizer(indexing_stack.tokenizer_name_for(name))
                        .set_index_option(IndexRecordOption::WithFreqsAndPositions),
                )
                .set_stored(),
        };
        text.insert(name.clone(), builder.add_text_field(name, options));

        let range_name = format!("{name}{RANGE_SUFFIX}");
        range.insert(
            range_name.clone(),
            builder.add_f64_field(&range_name, INDEXED | STORED | FAST),
        );
        for suffix in [IS_ARRAY_SUFFIX, CONVERT_TO_JSON_SUFFIX] {
            let marker_name = format!("{name}{suffix}");
            markers.insert(
                marker_name.clone(),
                builder.add_text_field(&marker_name, stored_only.clone()),
            );
        }
    }

    for spatial in &definition.spatial_fields {
        for coord_name in [spatial_lat_field(spatial), spatial_lng_field(spatial)] {
            range.insert(
                coord_name.clone(),
                builder.add_f64_field(&coord_name, INDEXED | STORED | FAST),
            );
        }
    }

    let catch_all = definition.declares_catch_all().then(|| {
        let options = JsonObjectOptions::default()
            .set_stored()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(crate::analysis::DEFAULT_TOKENIZER)
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            );
        builder.add_json_field(CATCH_ALL_FIELD, options)
    });

    let schema = builder.build();
    let fields = SchemaFields {
        document_id,
        reduce_key,
        text,
        range,
        markers,
        catch_all,
    };
    (schema, fields)
}
