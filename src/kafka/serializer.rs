use crate::{postgres::ChangeEvent, Result};

/// Encodes the flat wire envelope:
/// `{"type", "database", "table", "data", "old", "ts"}`.
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn serialize(event: &ChangeEvent) -> Result<String> {
        serde_json::to_string(event).map_err(Into::into)
    }
}
