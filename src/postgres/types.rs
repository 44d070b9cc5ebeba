use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Insert => "INSERT",
            ChangeOperation::Update => "UPDATE",
            ChangeOperation::Delete => "DELETE",
        }
    }

    pub fn as_lowercase(&self) -> &'static str {
        match self {
            ChangeOperation::Insert => "insert",
            ChangeOperation::Update => "update",
            ChangeOperation::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical change envelope, serialized as the Kafka message value.
///
/// `previous` is always `None`: the snapshot queries never see the prior
/// version of a row. A DELETE carries `{"count": n}` in `current` because
/// the deleted row itself is gone by the time it is noticed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub op: ChangeOperation,
    pub database: String,
    pub table: String,
    #[serde(rename = "data")]
    pub current: Option<Value>,
    #[serde(rename = "old")]
    pub previous: Option<Value>,
    #[serde(rename = "ts")]
    pub ts_ms: i64,
}

impl ChangeEvent {
    pub fn new(
        op: ChangeOperation,
        database: impl Into<String>,
        table: impl Into<String>,
        current: Option<Value>,
        ts_ms: i64,
    ) -> Self {
        Self {
            op,
            database: database.into(),
            table: table.into(),
            current,
            previous: None,
            ts_ms,
        }
    }

    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }
}

/// The most recently changed row of a table, as returned by a [`TableSource`].
///
/// [`TableSource`]: super::TableSource
#[derive(Debug, Clone, PartialEq)]
pub struct LatestRow {
    pub row: Value,
    /// `updated_at` when present, else `created_at`; `None` if both are NULL.
    pub changed_at: Option<DateTime<Utc>>,
}
