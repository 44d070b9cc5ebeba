//! Consumer-side reduction of incoming messages to one log record shape.
//!
//! Messages on the topic are not guaranteed to be ours. Anything carrying a
//! `type` field is read as the canonical change envelope; objects with
//! `operation`/`table` fields are read as a legacy shape; everything else,
//! including values that are not JSON at all, is still turned into a record
//! with operation `unknown` so the stream keeps moving.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

const UNKNOWN: &str = "unknown";

/// The canonical envelope as seen by the consumer.
///
/// Only `type` is required; producers other than ours may omit the rest.
/// `database` and `table` are kept as raw values so that an envelope with a
/// numeric or otherwise odd name still counts as canonical.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CanonicalEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub database: Option<Value>,
    #[serde(default)]
    pub table: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub old: Option<Value>,
}

/// A value without a `type` field, with whatever fields it happened to have.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyMessage {
    pub operation: Option<String>,
    pub table: Option<String>,
    pub data: Option<Value>,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    Canonical(CanonicalEnvelope),
    Legacy(LegacyMessage),
    /// Not JSON, not an object, or an object with none of the known fields.
    Unrecognized(Value),
}

impl IncomingMessage {
    /// Decodes a raw message value. Never fails: undecodable bytes become
    /// [`IncomingMessage::Unrecognized`] holding the lossy text.
    pub fn decode(payload: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(payload) {
            Ok(value) => Self::classify(value),
            Err(e) => {
                warn!(error = %e, "Message value is not valid JSON");
                IncomingMessage::Unrecognized(Value::String(
                    String::from_utf8_lossy(payload).into_owned(),
                ))
            }
        }
    }

    pub fn classify(value: Value) -> Self {
        let Some(object) = value.as_object() else {
            return IncomingMessage::Unrecognized(value);
        };

        if matches!(object.get("type"), Some(Value::String(kind)) if !kind.is_empty()) {
            match serde_json::from_value::<CanonicalEnvelope>(value.clone()) {
                Ok(envelope) => return IncomingMessage::Canonical(envelope),
                Err(e) => debug!(error = %e, "Envelope with 'type' did not match canonical shape"),
            }
        }

        let operation = non_empty_str(object, "operation");
        let table = non_empty_str(object, "table");
        if operation.is_none() && table.is_none() {
            return IncomingMessage::Unrecognized(value);
        }

        let data = object.get("data").filter(|v| !v.is_null()).cloned();
        IncomingMessage::Legacy(LegacyMessage {
            operation,
            table,
            data,
            raw: value,
        })
    }
}

/// Strings as-is, other JSON values in their compact text form.
fn render_name(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => UNKNOWN.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn non_empty_str(object: &Map<String, Value>, field: &str) -> Option<String> {
    object
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// One consumed change, ready for the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedLogRecord {
    /// When the consumer normalized the message, not when it was emitted.
    #[serde(rename = "timestamp")]
    pub observed_at: DateTime<Utc>,
    #[serde(rename = "table")]
    pub qualified_table: String,
    pub operation: String,
    #[serde(rename = "data")]
    pub payload: Value,
}

pub fn normalize(message: IncomingMessage, observed_at: DateTime<Utc>) -> NormalizedLogRecord {
    match message {
        IncomingMessage::Canonical(envelope) => NormalizedLogRecord {
            observed_at,
            qualified_table: format!(
                "{}.{}",
                render_name(envelope.database.as_ref()),
                render_name(envelope.table.as_ref())
            ),
            operation: envelope.kind.to_lowercase(),
            payload: envelope
                .data
                .or(envelope.old)
                .unwrap_or_else(|| Value::Object(Map::new())),
        },
        IncomingMessage::Legacy(legacy) => NormalizedLogRecord {
            observed_at,
            qualified_table: legacy.table.unwrap_or_else(|| UNKNOWN.to_string()),
            operation: legacy.operation.unwrap_or_else(|| UNKNOWN.to_string()),
            payload: legacy.data.unwrap_or(legacy.raw),
        },
        IncomingMessage::Unrecognized(raw) => NormalizedLogRecord {
            observed_at,
            qualified_table: UNKNOWN.to_string(),
            operation: UNKNOWN.to_string(),
            payload: raw,
        },
    }
}

/// Downstream consumer of normalized records.
pub trait RecordSink: Send {
    fn accept(&mut self, record: NormalizedLogRecord);
}

/// Writes each record as a structured `tracing` event.
#[derive(Debug, Default)]
pub struct TracingSink;

impl RecordSink for TracingSink {
    fn accept(&mut self, record: NormalizedLogRecord) {
        info!(
            target: "poll_capture::records",
            timestamp = %record.observed_at.to_rfc3339(),
            table = %record.qualified_table,
            operation = %record.operation,
            data = %record.payload,
            "Change observed"
        );
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    pub records: Vec<NormalizedLogRecord>,
}

impl RecordSink for VecSink {
    fn accept(&mut self, record: NormalizedLogRecord) {
        self.records.push(record);
    }
}

/// Turns raw message values into records and hands them to a sink.
pub struct Normalizer<S> {
    sink: S,
    processed: u64,
    unrecognized: u64,
}

impl<S: RecordSink> Normalizer<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            processed: 0,
            unrecognized: 0,
        }
    }

    /// Handles one message value. Nothing here can fail the caller's loop.
    pub fn process(&mut self, payload: Option<&[u8]>) {
        let Some(payload) = payload.filter(|p| !p.is_empty()) else {
            debug!("Skipping message without a value");
            return;
        };

        let message = IncomingMessage::decode(payload);
        if matches!(message, IncomingMessage::Unrecognized(_)) {
            self.unrecognized += 1;
        }

        self.sink.accept(normalize(message, Utc::now()));
        self.processed += 1;
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn unrecognized(&self) -> u64 {
        self.unrecognized
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
