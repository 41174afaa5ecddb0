//! Item, record, and table contract types for the conversion stage.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::extraction::ExtractionError;
use crate::queries::QueryMap;

/// Dotted path of the record column that deduplicates rows downstream.
///
/// Two items pointing at byte-identical files carry the same `data_hash`, so
/// merging on it keeps one row per distinct file content.
pub const MERGE_KEY_FIELD: &str = "metadata.data_hash";

/// Loose pipeline item addressed by file path.
///
/// Items arrive as JSON objects from the upstream listing stage; everything
/// except `file_path` rides along untouched and lands in the record's
/// metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileItem(Map<String, Value>);

impl FileItem {
    /// Wrap an existing JSON object.
    pub fn new(values: Map<String, Value>) -> Self {
        Self(values)
    }

    /// Build an item carrying only a file path.
    pub fn from_path(path: impl Into<String>) -> Self {
        let mut values = Map::new();
        values.insert("file_path".to_string(), Value::String(path.into()));
        Self(values)
    }

    /// Add or replace one entry, builder style.
    #[must_use]
    pub fn insert(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Look up an entry by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// File path the item points at, when present, a string, and non-empty.
    pub fn file_path(&self) -> Option<&str> {
        self.0
            .get("file_path")
            .and_then(Value::as_str)
            .filter(|path| !path.is_empty())
    }

    /// Content hash supplied by the upstream stage, when present.
    pub fn data_hash(&self) -> Option<&str> {
        self.0.get("data_hash").and_then(Value::as_str)
    }

    /// Unwrap into the underlying JSON object.
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for FileItem {
    fn from(values: Map<String, Value>) -> Self {
        Self(values)
    }
}

/// Structured record produced for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRecord {
    /// Extracted values keyed by field name.
    pub fields: QueryMap,
    /// Path of the source file.
    pub file_path: String,
    /// Upstream item entries minus the file path.
    pub metadata: Map<String, Value>,
}

impl StructuredRecord {
    /// Content hash carried in the metadata, when the upstream stage supplied
    /// one.
    pub fn data_hash(&self) -> Option<&str> {
        self.metadata.get("data_hash").and_then(Value::as_str)
    }
}

// Records serialize flat: each extracted field at the top level, then
// `file_path`, then the `metadata` object.
impl Serialize for StructuredRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 2))?;
        for (field, value) in &self.fields {
            map.serialize_entry(field, value)?;
        }
        map.serialize_entry("file_path", &self.file_path)?;
        map.serialize_entry("metadata", &self.metadata)?;
        map.end()
    }
}

/// How records land in the destination table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteDisposition {
    /// Append rows without touching existing ones.
    Append,
    /// Replace the table contents on each run.
    Replace,
    /// Upsert rows by merge key.
    Merge,
}

/// Destination table declaration emitted alongside the records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableContract {
    /// Destination table name.
    pub table_name: String,
    /// How records are written into the table.
    pub write_disposition: WriteDisposition,
    /// Column that identifies an existing row to merge into.
    pub merge_key: &'static str,
    /// Column used as the primary key.
    pub primary_key: &'static str,
}

/// Compute the deterministic SHA-256 content hash used as the merge key.
///
/// Upstream stages hash the raw file bytes and store the digest under
/// `data_hash`; records carry it through inside their metadata.
pub fn compute_data_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Errors emitted by the conversion stage.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Extraction engine failed fatally for a file.
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    /// Runtime plumbing failed while driving the blocking wrapper.
    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Summary of a completed batch conversion.
#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    /// Records produced, in input order.
    pub records: Vec<StructuredRecord>,
    /// Items skipped over missing paths or unsupported formats.
    pub skipped: usize,
}

impl ConversionOutcome {
    /// Number of records emitted.
    pub fn emitted(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_serialize_flat_with_trailing_metadata() {
        let mut metadata = Map::new();
        metadata.insert("data_hash".to_string(), json!("abc123"));
        metadata.insert("size".to_string(), json!(512));

        let record = StructuredRecord {
            fields: QueryMap::from([
                ("invoice_number".to_string(), "2024-001".to_string()),
                ("total".to_string(), "99.00".to_string()),
            ]),
            file_path: "/inbox/invoice.pdf".to_string(),
            metadata,
        };

        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(
            value,
            json!({
                "invoice_number": "2024-001",
                "total": "99.00",
                "file_path": "/inbox/invoice.pdf",
                "metadata": { "data_hash": "abc123", "size": 512 },
            })
        );
    }

    #[test]
    fn file_path_requires_a_non_empty_string() {
        let with_path = FileItem::from_path("/inbox/invoice.pdf");
        assert_eq!(with_path.file_path(), Some("/inbox/invoice.pdf"));

        let empty = FileItem::from_path("");
        assert_eq!(empty.file_path(), None);

        let numeric = FileItem::default().insert("file_path", json!(42));
        assert_eq!(numeric.file_path(), None);

        let null = FileItem::default().insert("file_path", Value::Null);
        assert_eq!(null.file_path(), None);

        assert_eq!(FileItem::default().file_path(), None);
    }

    #[test]
    fn inserted_entries_are_readable_by_key() {
        let item = FileItem::from_path("/inbox/invoice.pdf").insert("source", json!("mailbox"));
        assert_eq!(item.get("source"), Some(&json!("mailbox")));
        assert_eq!(item.get("file_path"), Some(&json!("/inbox/invoice.pdf")));
        assert_eq!(item.get("size"), None);
    }

    #[test]
    fn data_hash_round_trips_between_item_and_record() {
        let digest = compute_data_hash(b"file bytes");
        let item = FileItem::from_path("/inbox/invoice.pdf")
            .insert("data_hash", json!(digest.clone()));
        assert_eq!(item.data_hash(), Some(digest.as_str()));

        let record = StructuredRecord {
            fields: QueryMap::new(),
            file_path: "/inbox/invoice.pdf".to_string(),
            metadata: {
                let mut item = item.into_inner();
                item.remove("file_path");
                item
            },
        };
        assert_eq!(record.data_hash(), Some(digest.as_str()));
    }

    #[test]
    fn data_hash_is_stable_hex() {
        let first = compute_data_hash(b"same bytes");
        let second = compute_data_hash(b"same bytes");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, compute_data_hash(b"other bytes"));
    }

    #[test]
    fn table_contract_serializes_lowercase_disposition() {
        let contract = TableContract {
            table_name: "invoices".to_string(),
            write_disposition: WriteDisposition::Merge,
            merge_key: MERGE_KEY_FIELD,
            primary_key: MERGE_KEY_FIELD,
        };

        let value = serde_json::to_value(&contract).expect("serialize");
        assert_eq!(
            value,
            json!({
                "table_name": "invoices",
                "write_disposition": "merge",
                "merge_key": "metadata.data_hash",
                "primary_key": "metadata.data_hash",
            })
        );
    }
}
