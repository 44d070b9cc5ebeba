pub mod consumer;
pub mod key_strategy;
pub mod producer;
pub mod serializer;


pub use consumer::KafkaConsumer;
pub use key_strategy::KeyStrategy;
pub use producer::{EventPublisher, KafkaProducer};
pub use serializer::JsonSerializer;
