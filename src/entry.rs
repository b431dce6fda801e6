//! Index entries, document batches and the reserved field-name vocabulary.
//!
//! An [`IndexEntry`] is one unit handed to the library writer: a mapping
//! from field name to one or more values. The engine reserves a small set
//! of field names and suffixes to carry document identity, reduce keys and
//! projection-reconstruction hints; those markers are filtered back out
//! when a query rebuilds the stored projection.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DOCUMENT_ID_FIELD: &str = "__document_id";
pub const REDUCE_KEY_FIELD: &str = "__reduce_key";
pub const TEMP_SCORE_FIELD: &str = "__temp_score";
pub const DISTANCE_FIELD: &str = "__distance";
pub const RANDOM_FIELD_PREFIX: &str = "__rand_";
pub const CATCH_ALL_FIELD: &str = "_";

pub const RANGE_SUFFIX: &str = "_Range";
pub const IS_ARRAY_SUFFIX: &str = "_IsArray";
pub const CONVERT_TO_JSON_SUFFIX: &str = "_ConvertToJson";

/// True for field names that exist only as reconstruction hints and must
/// never surface in a projection. A user field that legitimately ends in
/// one of these suffixes is filtered too; that loss matches the source
/// system and is deliberate.
pub fn is_reserved_marker_name(name: &str) -> bool {
    name.ends_with(RANGE_SUFFIX)
        || name.ends_with(IS_ARRAY_SUFFIX)
        || name.ends_with(CONVERT_TO_JSON_SUFFIX)
}

/// Strip a trailing `_Range` for field lookups; queries may reference the
/// numeric companion directly.
pub fn strip_range_suffix(name: &str) -> &str {
    name.strip_suffix(RANGE_SUFFIX).unwrap_or(name)
}

/// 16-byte opaque, sortable version stamp produced by the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Etag([u8; 16]);

impl Etag {
    pub fn zero() -> Self {
        Etag([0u8; 16])
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Etag(bytes)
    }

    /// Convenience constructor for tests and in-order batch generation.
    pub fn from_u128(value: u128) -> Self {
        Etag(value.to_be_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex, 32 characters; the form recorded in commit user-data.
    pub fn to_hex(&self) -> String {
        format!("{:032x}", u128::from_be_bytes(self.0))
    }

    pub fn from_hex(hex: &str) -> Result<Self> {
        let value = u128::from_str_radix(hex.trim(), 16)
            .map_err(|e| Error::CorruptIndex(format!("bad etag '{hex}': {e}")))?;
        Ok(Etag(value.to_be_bytes()))
    }
}

impl fmt::Display for Etag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// One value of an entry field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

/// One unit written to the inverted index: an ordered multi-map of field
/// name to values. Multiple entries may share a `__document_id` (fan-out).
#[derive(Debug, Clone, Default)]
pub struct IndexEntry {
    fields: Vec<(String, FieldValue)>,
}

impl IndexEntry {
    pub fn new(document_id: &str) -> Self {
        let mut entry = Self::default();
        entry
            .fields
            .push((DOCUMENT_ID_FIELD.to_string(), FieldValue::Text(document_id.to_string())));
        entry
    }

    pub fn document_id(&self) -> Option<&str> {
        self.fields.iter().find_map(|(name, value)| {
            if name == DOCUMENT_ID_FIELD {
                match value {
                    FieldValue::Text(text) => Some(text.as_str()),
                    FieldValue::Number(_) => None,
                }
            } else {
                None
            }
        })
    }

    pub fn reduce_key(&self) -> Option<&str> {
        self.fields.iter().find_map(|(name, value)| match value {
            FieldValue::Text(text) if name == REDUCE_KEY_FIELD => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn set_reduce_key(&mut self, key: &str) {
        self.fields
            .push((REDUCE_KEY_FIELD.to_string(), FieldValue::Text(key.to_string())));
    }

    pub fn add_text(&mut self, name: &str, value: &str) {
        self.fields
            .push((name.to_string(), FieldValue::Text(value.to_string())));
    }

    /// Numbers are indexed twice: the display form under `name` and the
    /// sortable numeric companion under `name_Range`.
    pub fn add_number(&mut self, name: &str, value: f64) {
        self.fields
            .push((name.to_string(), FieldValue::Text(value.to_string())));
        self.fields
            .push((format!("{name}{RANGE_SUFFIX}"), FieldValue::Number(value)));
    }

    /// Multi-valued fields carry an `_IsArray` marker so the projection is
    /// rebuilt as an array even when only one element survived.
    pub fn add_array(&mut self, name: &str, values: impl IntoIterator<Item = String>) {
        for value in values {
            self.fields.push((name.to_string(), FieldValue::Text(value)));
        }
        self.fields
            .push((format!("{name}{IS_ARRAY_SUFFIX}"), FieldValue::Text("true".to_string())));
    }

    /// Structured values are stored serialized with a `_ConvertToJson`
    /// marker; the projection parses them back.
    pub fn add_json(&mut self, name: &str, value: &serde_json::Value) -> Result<()> {
        let serialized = serde_json::to_string(value)?;
        self.fields
            .push((name.to_string(), FieldValue::Text(serialized)));
        self.fields.push((
            format!("{name}{CONVERT_TO_JSON_SUFFIX}"),
            FieldValue::Text("true".to_string()),
        ));
        Ok(())
    }

    /// Index a coordinate pair under `<name>__lat_Range` / `<name>__lng_Range`.
    /// Out-of-range coordinates surface as [`Error::InvalidSpatialShape`];
    /// the caller records the error and skips the document.
    pub fn add_spatial(&mut self, name: &str, lat: f64, lng: f64) -> Result<()> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) || lat.is_nan() || lng.is_nan() {
            return Err(Error::InvalidSpatialShape {
                document_id: self.document_id().unwrap_or("<unknown>").to_string(),
            });
        }
        self.fields
            .push((spatial_lat_field(name), FieldValue::Number(lat)));
        self.fields
            .push((spatial_lng_field(name), FieldValue::Number(lng)));
        Ok(())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

pub fn spatial_lat_field(name: &str) -> String {
    format!("{name}__lat{RANGE_SUFFIX}")
}

pub fn spatial_lng_field(name: &str) -> String {
    format!("{name}__lng{RANGE_SUFFIX}")
}

/// A document as supplied by the external store.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub key: String,
    pub etag: Etag,
    pub data: serde_json::Value,
}

impl SourceDocument {
    pub fn new(key: impl Into<String>, etag: Etag, data: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            etag,
            data,
        }
    }
}

/// An atomic unit of work handed to the index by the external scheduler.
#[derive(Debug, Clone, Default)]
pub struct IndexingBatch {
    pub documents: Vec<SourceDocument>,
    pub deletions: Vec<String>,
}

impl IndexingBatch {
    pub fn new(documents: Vec<SourceDocument>) -> Self {
        Self {
            documents,
            deletions: Vec::new(),
        }
    }

    pub fn highest_etag(&self) -> Etag {
        self.documents
            .iter()
            .map(|doc| doc.etag)
            .max()
            .unwrap_or_else(Etag::zero)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.deletions.is_empty()
    }
}

/// Per-commit metadata produced by one batch application.
#[derive(Debug, Clone, Copy)]
pub struct IndexedItemsInfo {
    /// Number of documents whose entries changed; a searcher is republished
    /// iff this is non-zero.
    pub changed_docs: usize,
    pub highest_etag: Etag,
}

/// The registered indexing function: maps one source document to one or
/// more index entries (fan-out >= 1).
pub trait IndexingFn: Send + Sync {
    fn map(&self, doc: &SourceDocument) -> Result<Vec<IndexEntry>>;
}

impl<F> IndexingFn for F
where
    F: Fn(&SourceDocument) -> Result<Vec<IndexEntry>> + Send + Sync,
{
    fn map(&self, doc: &SourceDocument) -> Result<Vec<IndexEntry>> {
        self(doc)
    }
}
