use crate::postgres::ChangeEvent;
use serde_json::Value;
use tracing::debug;

/// How a message key is derived from a change event.
///
/// Keys look like `{table}-{suffix}` so that messages about the same row
/// land on the same partition whenever the row identity is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStrategy {
    /// `{table}-{field}` taken from the row, or `{table}-{ts}` when the
    /// field is missing, null or an empty string. Zero and `false` are
    /// real values and are used as-is. DELETE payloads carry no id and
    /// always fall back.
    TableField(String),
    /// `{table}-{ts}` for every message.
    Timestamp,
}

impl KeyStrategy {
    pub fn extract_key(&self, event: &ChangeEvent) -> String {
        let suffix = match self {
            KeyStrategy::TableField(path) => event
                .current
                .as_ref()
                .and_then(|record| extract_field_value(record, path)),
            KeyStrategy::Timestamp => None,
        };

        match suffix {
            Some(value) => format!("{}-{}", event.table, value),
            None => format!("{}-{}", event.table, event.ts_ms),
        }
    }
}

fn extract_field_value(record: &Value, field_path: &str) -> Option<String> {
    let mut current = record;

    for part in field_path.split('.') {
        match current.get(part) {
            Some(value) => current = value,
            None => {
                debug!("Field '{}' not found in record", part);
                return None;
            }
        }
    }

    match current {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        _ => Some(current.to_string()),
    }
}

impl Default for KeyStrategy {
    fn default() -> Self {
        KeyStrategy::TableField("id".to_string())
    }
}
