use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

pub const TABLE_NAME: &str = "chunks";

/// `(id, vector)` rows; the vector width is fixed per generation.
pub fn build_chunk_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32),
            true,
        ),
    ]))
}
