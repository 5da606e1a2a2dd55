//! Versioned key-value documents.
//!
//! Profile preferences, profile settings, and message metadata are stored as
//! JSON objects wrapped with a schema version. Every writer goes through
//! [`Document::validate`] so the stored shape cannot drift silently.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MemoryError;

/// Current document schema version.
pub const DOCUMENT_VERSION: u32 = 1;

/// Upper bound on the serialized size of a single document.
pub const MAX_DOCUMENT_BYTES: usize = 64 * 1024;

/// Maximum nesting depth of values inside a document.
const MAX_DEPTH: usize = 8;

/// A versioned, schema-validated key-value payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub version: u32,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            fields: Map::new(),
        }
    }
}

impl Document {
    /// Build a current-version document from a JSON value.
    ///
    /// The value must be an object; anything else is `InvalidArgument`.
    pub fn from_value(value: Value) -> Result<Self, MemoryError> {
        match value {
            Value::Object(fields) => {
                let doc = Self {
                    version: DOCUMENT_VERSION,
                    fields,
                };
                doc.validate()?;
                Ok(doc)
            }
            other => Err(MemoryError::InvalidArgument(format!(
                "document must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Insert a field, returning the document for chaining.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check version, key shape, nesting depth, and size.
    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.version == 0 || self.version > DOCUMENT_VERSION {
            return Err(MemoryError::InvalidArgument(format!(
                "unsupported document version {}",
                self.version
            )));
        }

        for (key, value) in &self.fields {
            if key.trim().is_empty() {
                return Err(MemoryError::InvalidArgument(
                    "document keys must not be empty".to_string(),
                ));
            }
            if depth(value) > MAX_DEPTH {
                return Err(MemoryError::InvalidArgument(format!(
                    "document field '{key}' is nested deeper than {MAX_DEPTH} levels"
                )));
            }
        }

        let size = self.to_json()?.len();
        if size > MAX_DOCUMENT_BYTES {
            return Err(MemoryError::InvalidArgument(format!(
                "document is {size} bytes, limit is {MAX_DOCUMENT_BYTES}"
            )));
        }

        Ok(())
    }

    /// Serialize to the JSON text stored in the database.
    pub fn to_json(&self) -> Result<String, MemoryError> {
        serde_json::to_string(self)
            .map_err(|e| MemoryError::Storage(format!("failed to serialize document: {e}")))
    }

    /// Parse a stored JSON column back into a document.
    pub fn from_json(json: &str) -> Result<Self, MemoryError> {
        let doc: Document = serde_json::from_str(json)
            .map_err(|e| MemoryError::Storage(format!("malformed stored document: {e}")))?;
        doc.validate()
            .map_err(|e| MemoryError::Storage(format!("stored document failed validation: {e}")))?;
        Ok(doc)
    }
}

fn depth(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(depth).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(depth).max().unwrap_or(0),
        _ => 0,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_rejects_non_object() {
        let err = Document::from_value(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, MemoryError::InvalidArgument(_)));
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_stored_json_roundtrip() {
        let doc = Document::default()
            .with("theme", json!("dark"))
            .with("notifications", json!(true));
        let json = doc.to_json().unwrap();
        assert!(json.contains("\"version\":1"));
        assert_eq!(Document::from_json(&json).unwrap(), doc);
    }

    #[test]
    fn test_rejects_future_version() {
        let doc = Document {
            version: DOCUMENT_VERSION + 1,
            fields: Map::new(),
        };
        assert!(matches!(doc.validate(), Err(MemoryError::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_empty_key() {
        let doc = Document::default().with("  ", json!(1));
        assert!(doc.validate().is_err());
    }

    #[test]
    fn test_rejects_deep_nesting() {
        let mut value = json!(1);
        for _ in 0..(MAX_DEPTH + 1) {
            value = json!([value]);
        }
        let doc = Document::default().with("deep", value);
        assert!(doc.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_document() {
        let doc = Document::default().with("blob", json!("x".repeat(MAX_DOCUMENT_BYTES)));
        assert!(doc.validate().is_err());
    }

    #[test]
    fn test_from_json_malformed_is_storage_error() {
        let err = Document::from_json("{not json").unwrap_err();
        assert!(matches!(err, MemoryError::Storage(_)));
    }
}
