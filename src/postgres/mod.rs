pub mod source;
pub mod types;

pub use source::{PostgresSource, TableSource};
pub use types::*;
