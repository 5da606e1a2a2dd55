//! Arrow schema for the LanceDB message embedding table.
//!
//! The vector field is 384-dimensional float32 for BGESmallENV15 embeddings.
//!
//! Arrow versions MUST match lancedb's transitive dependency (57.3 for lancedb 0.26).

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

/// BGESmallENV15 embedding dimension.
pub const EMBEDDING_DIMENSION: i32 = 384;

/// Name of the single table holding every message embedding.
pub const MESSAGE_EMBEDDINGS_TABLE: &str = "message_embeddings";

/// Schema for the `message_embeddings` table.
///
/// `embedding_id` is the identifier handed back to the relational store as
/// `chat_messages.vector_id`. `user_id` scopes similarity search.
pub fn message_embeddings_schema() -> Schema {
    Schema::new(vec![
        Field::new("embedding_id", DataType::Utf8, false),
        Field::new("message_id", DataType::Utf8, false),
        Field::new("user_id", DataType::Utf8, false),
        Field::new("session_id", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
        Field::new("embedding_model", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                EMBEDDING_DIMENSION,
            ),
            false,
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_embeddings_schema_has_correct_fields() {
        let schema = message_embeddings_schema();
        assert_eq!(schema.fields().len(), 7);
        for name in ["embedding_id", "message_id", "user_id", "session_id", "embedding_model"] {
            assert!(schema.field_with_name(name).is_ok(), "missing {name}");
        }

        let vector_field = schema.field_with_name("vector").unwrap();
        match vector_field.data_type() {
            DataType::FixedSizeList(_, size) => assert_eq!(*size, EMBEDDING_DIMENSION),
            other => panic!("Expected FixedSizeList, got {:?}", other),
        }
    }
}
