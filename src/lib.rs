pub mod capture;
pub mod config;
pub mod detector;
pub mod error;
pub mod normalizer;
pub mod shutdown;
pub mod snapshot;

pub mod kafka;
pub mod postgres;

pub use capture::Capture;
pub use config::{Config, TrackedTable};
pub use error::{Error, Result};
pub use normalizer::{NormalizedLogRecord, Normalizer, RecordSink};
