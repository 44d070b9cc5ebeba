use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::{Error, Result};

const ENV_PREFIX: &str = "POLL_CAPTURE";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub postgres: PostgresConfig,
    pub kafka: KafkaConfig,
    pub capture: CaptureConfig,
    pub consumer: ConsumerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub client_id: String,
    pub compression: String,
    pub acks: String,
    pub linger_ms: u32,
    pub message_timeout_ms: u64,
    /// Row field used for the message key, falling back to the emission time.
    pub key_field: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub poll_interval_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub tables: Vec<TrackedTable>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub group_id: String,
    pub client_id: String,
}

/// A table watched by the capture loop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TrackedTable {
    pub name: String,
    /// Whether the table carries an `updated_at` column next to `created_at`.
    #[serde(default)]
    pub has_updated_at: bool,
}

impl TrackedTable {
    pub fn new(name: impl Into<String>, has_updated_at: bool) -> Self {
        Self {
            name: name.into(),
            has_updated_at,
        }
    }

    /// SQL expression for the time a row last changed.
    pub fn change_time_expr(&self) -> &'static str {
        if self.has_updated_at {
            "COALESCE(updated_at, created_at)"
        } else {
            "created_at"
        }
    }
}

impl Config {
    /// Layers defaults, an optional TOML file and `POLL_CAPTURE_*` variables.
    ///
    /// A missing file is not an error; nested keys use `__`, for example
    /// `POLL_CAPTURE_POSTGRES__HOST` or `POLL_CAPTURE_KAFKA__BROKERS=a:9092,b:9092`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("kafka.brokers")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.tables.is_empty() {
            return Err(Error::Config("at least one table must be tracked".to_string()));
        }

        let mut seen = HashSet::new();
        for table in &self.capture.tables {
            if !is_valid_identifier(&table.name) {
                return Err(Error::Config(format!(
                    "invalid table name '{}'",
                    table.name
                )));
            }
            if !seen.insert(table.name.as_str()) {
                return Err(Error::Config(format!(
                    "table '{}' is listed more than once",
                    table.name
                )));
            }
        }

        if self.kafka.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(Error::Config("no Kafka brokers configured".to_string()));
        }
        if self.kafka.topic.is_empty() {
            return Err(Error::Config("Kafka topic must not be empty".to_string()));
        }
        if self.capture.poll_interval_ms == 0 {
            return Err(Error::Config("poll interval must be positive".to_string()));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.capture.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.capture.shutdown_timeout_ms)
    }
}

impl KafkaConfig {
    pub fn bootstrap_servers(&self) -> String {
        self.brokers
            .iter()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Table names are spliced into SQL, so only plain identifiers are accepted.
fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "app".to_string(),
            username: "postgres".to_string(),
            password: String::new(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topic: "db-changes".to_string(),
            client_id: "poll-capture".to_string(),
            compression: "none".to_string(),
            acks: "all".to_string(),
            linger_ms: 5,
            message_timeout_ms: 30_000,
            key_field: "id".to_string(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            shutdown_timeout_ms: 5_000,
            tables: default_tables(),
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group_id: "poll-capture-consumer".to_string(),
            client_id: "poll-capture-consumer".to_string(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_tables() -> Vec<TrackedTable> {
    vec![
        TrackedTable::new("items", true),
        TrackedTable::new("users", false),
        TrackedTable::new("tokens", false),
    ]
}
