#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poll_capture::config::{
    CaptureConfig, Config, ConsumerConfig, KafkaConfig, PostgresConfig, TrackedTable,
};
use poll_capture::kafka::{EventPublisher, JsonSerializer, KeyStrategy};
use poll_capture::postgres::{ChangeEvent, LatestRow, TableSource};
use poll_capture::Result;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::env;
use std::sync::Mutex;

/// Get test configuration from environment variables
pub fn get_test_config() -> Config {
    // Use TEST_ prefix for test environment variables
    let postgres = PostgresConfig {
        host: env::var("TEST_PG_HOST").unwrap_or_else(|_| "localhost".to_string()),
        port: env::var("TEST_PG_PORT")
            .unwrap_or_else(|_| "5432".to_string())
            .parse()
            .unwrap_or(5432),
        database: env::var("TEST_PG_DATABASE").unwrap_or_else(|_| "postgres".to_string()),
        username: env::var("TEST_PG_USERNAME").unwrap_or_else(|_| "postgres".to_string()),
        password: env::var("TEST_PG_PASSWORD").unwrap_or_else(|_| "postgres".to_string()),
        connect_timeout_secs: 10,
    };

    let kafka = KafkaConfig {
        brokers: env::var("TEST_KAFKA_BROKERS")
            .unwrap_or_else(|_| "localhost:9092".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect(),
        topic: format!("test_changes_{}", std::process::id()),
        client_id: "poll-capture-test".to_string(),
        compression: "none".to_string(), // No compression for tests
        acks: "all".to_string(),
        linger_ms: 0, // Immediate sending for tests
        message_timeout_ms: 10_000,
        key_field: "id".to_string(),
    };

    let capture = CaptureConfig {
        poll_interval_ms: 200,
        shutdown_timeout_ms: 2_000,
        tables: vec![TrackedTable::new(test_table(), true)],
    };

    let consumer = ConsumerConfig {
        group_id: format!("test_group_{}", std::process::id()),
        client_id: "poll-capture-test-consumer".to_string(),
    };

    Config {
        postgres,
        kafka,
        capture,
        consumer,
    }
}

pub fn test_table() -> String {
    format!("poll_capture_items_{}", std::process::id())
}

/// One stored row of an in-memory table.
#[derive(Debug, Clone)]
pub struct MemoryRow {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MemoryRow {
    fn changed_at(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "created_at": self.created_at.to_rfc3339(),
            "updated_at": self.updated_at.map(|t| t.to_rfc3339()),
        })
    }
}

/// Tables kept in memory, answering the same two reads as PostgreSQL.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    pub tables: HashMap<String, Vec<MemoryRow>>,
}

impl MemoryDatabase {
    pub fn create_table(&mut self, name: &str) {
        self.tables.insert(name.to_string(), Vec::new());
    }

    pub fn insert(&mut self, table: &str, id: i64, name: &str, at: DateTime<Utc>) {
        self.rows(table).push(MemoryRow {
            id,
            name: name.to_string(),
            created_at: at,
            updated_at: None,
        });
    }

    pub fn update(&mut self, table: &str, id: i64, name: &str, at: DateTime<Utc>) {
        if let Some(row) = self.rows(table).iter_mut().find(|r| r.id == id) {
            row.name = name.to_string();
            row.updated_at = Some(at);
        }
    }

    pub fn delete(&mut self, table: &str, id: i64) {
        self.rows(table).retain(|r| r.id != id);
    }

    fn rows(&mut self, table: &str) -> &mut Vec<MemoryRow> {
        self.tables.entry(table.to_string()).or_default()
    }
}

#[async_trait]
impl TableSource for MemoryDatabase {
    async fn latest_row(&mut self, table: &TrackedTable) -> Result<Option<LatestRow>> {
        let rows = self.rows(&table.name);
        let latest = if table.has_updated_at {
            rows.iter().max_by_key(|r| r.changed_at())
        } else {
            rows.iter().max_by_key(|r| r.created_at)
        };

        Ok(latest.map(|row| LatestRow {
            row: row.to_json(),
            changed_at: Some(if table.has_updated_at {
                row.changed_at()
            } else {
                row.created_at
            }),
        }))
    }

    async fn row_count(&mut self, table: &TrackedTable) -> Result<i64> {
        Ok(self.rows(&table.name).len() as i64)
    }
}

/// A published message as it would sit on the topic.
#[derive(Debug, Clone)]
pub struct WireMessage {
    pub key: String,
    pub value: String,
}

/// Encodes events exactly like the Kafka producer and keeps them in order.
#[derive(Debug, Default)]
pub struct MemoryTopic {
    pub messages: Mutex<Vec<WireMessage>>,
}

impl MemoryTopic {
    pub fn drain(&self) -> Vec<WireMessage> {
        std::mem::take(&mut *self.messages.lock().unwrap())
    }
}

#[async_trait]
impl EventPublisher for MemoryTopic {
    async fn publish(&self, event: &ChangeEvent) -> Result<()> {
        let value = JsonSerializer::serialize(event)?;
        let key = KeyStrategy::default().extract_key(event);
        self.messages.lock().unwrap().push(WireMessage { key, value });
        Ok(())
    }
}
