//! Error types and result handling for poll-capture.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use poll_capture::{Error, Result};
//!
//! fn connect_to_database() -> Result<()> {
//!     // Simulating a connection error
//!     Err(Error::Connection("Failed to connect".to_string()))
//! }
//!
//! match connect_to_database() {
//!     Ok(()) => println!("Connected"),
//!     Err(Error::Connection(msg)) => eprintln!("Connection error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use thiserror::Error;

/// The main error type for poll-capture operations.
///
/// Per-table query errors, publish errors and malformed messages are all
/// recovered where they happen; only startup failures reach `main`.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration value, reported by [`crate::Config::validate`].
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration could not be read or deserialized.
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// PostgreSQL client or query error.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Kafka client, producer or consumer error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// JSON serialization error when encoding or decoding messages.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic connection error not covered by specific types.
    #[error("Connection error: {0}")]
    Connection(String),
}

/// A convenient Result type alias for poll-capture operations.
///
/// This is equivalent to `std::result::Result<T, poll_capture::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
