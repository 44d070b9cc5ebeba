mod common;

use poll_capture::config::{Config, KafkaConfig};
use poll_capture::kafka::KafkaProducer;
use poll_capture::normalizer::VecSink;
use poll_capture::postgres::PostgresSource;
use poll_capture::{Capture, Normalizer};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;
use tokio_postgres::{Client, NoTls};
use tracing::info;

#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_end_to_end_capture() {
    tracing_subscriber::fmt()
        .with_env_filter("poll_capture=debug,rdkafka=info")
        .try_init()
        .ok();

    let config = common::get_test_config();
    let table = common::test_table();
    let client = setup_test_database(&config, &table).await;

    let source = PostgresSource::connect(&config.postgres).await.unwrap();
    let producer = KafkaProducer::new(&config.kafka).unwrap();
    let mut capture = Capture::new(&config, source, producer);

    // Baseline on the empty table
    assert_eq!(capture.poll_once().await.detected, 0);

    let steps = [
        ("INSERT", format!("INSERT INTO {} (name) VALUES ('Alice')", table)),
        (
            "UPDATE",
            format!(
                "UPDATE {} SET name = 'Alicia', updated_at = now() + interval '1 second' WHERE name = 'Alice'",
                table
            ),
        ),
        ("DELETE", format!("DELETE FROM {}", table)),
    ];

    for (op, sql) in &steps {
        info!("Executing SQL: {}", sql);
        client.execute(sql.as_str(), &[]).await.unwrap();
        let summary = capture.poll_once().await;
        assert_eq!(summary.detected, 1, "expected one {} event", op);
        assert_eq!(summary.published, 1);
    }

    let consumer = create_test_consumer(&config.kafka);
    let mut received = Vec::new();
    let start = tokio::time::Instant::now();

    while received.len() < steps.len() && start.elapsed() < Duration::from_secs(15) {
        if let Ok(Ok(message)) = timeout(Duration::from_secs(1), consumer.recv()).await {
            if let Some(payload) = message.payload() {
                received.push(payload.to_vec());
            }
        }
    }

    let types: Vec<String> = received
        .iter()
        .map(|p| {
            let json: Value = serde_json::from_slice(p).unwrap();
            json["type"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(types, vec!["INSERT", "UPDATE", "DELETE"]);

    let mut normalizer = Normalizer::new(VecSink::default());
    for payload in &received {
        normalizer.process(Some(payload.as_slice()));
    }
    let records = normalizer.into_sink().records;
    let expected_table = format!("{}.{}", config.postgres.database, table);
    assert!(records.iter().all(|r| r.qualified_table == expected_table));
    assert_eq!(records[0].payload["name"], "Alice");
    assert_eq!(records[1].payload["name"], "Alicia");
    assert_eq!(records[2].payload["count"], 0);

    cleanup_test_database(&client, &table).await;
}

#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_missing_table_is_not_fatal() {
    let mut config: Config = common::get_test_config();
    config.capture.tables = vec![poll_capture::TrackedTable::new("poll_capture_missing_table", false)];

    let source = PostgresSource::connect(&config.postgres).await.unwrap();
    let producer = KafkaProducer::new(&config.kafka).unwrap();
    let mut capture = Capture::new(&config, source, producer);

    let summary = capture.poll_once().await;
    assert_eq!(summary.failed_tables, 1);
    assert!(capture.store().is_empty());
}

#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_unreachable_database_fails_connect() {
    let mut config = common::get_test_config();
    config.postgres.port = 54321; // Invalid port
    config.postgres.connect_timeout_secs = 2;

    assert!(PostgresSource::connect(&config.postgres).await.is_err());
}

// Helper functions

async fn setup_test_database(config: &Config, table: &str) -> Client {
    let (client, connection) = tokio_postgres::connect(
        &format!(
            "host={} port={} dbname={} user={} password={}",
            config.postgres.host,
            config.postgres.port,
            config.postgres.database,
            config.postgres.username,
            config.postgres.password
        ),
        NoTls,
    )
    .await
    .unwrap();

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("Connection error: {}", e);
        }
    });

    client
        .execute(format!("DROP TABLE IF EXISTS {}", table).as_str(), &[])
        .await
        .ok();

    client
        .execute(
            format!(
                "CREATE TABLE {} (
                    id SERIAL PRIMARY KEY,
                    name TEXT NOT NULL,
                    created_at TIMESTAMPTZ DEFAULT now(),
                    updated_at TIMESTAMPTZ
                )",
                table
            )
            .as_str(),
            &[],
        )
        .await
        .unwrap();

    client
}

async fn cleanup_test_database(client: &Client, table: &str) {
    client
        .execute(format!("DROP TABLE IF EXISTS {}", table).as_str(), &[])
        .await
        .ok();
}

fn create_test_consumer(kafka_config: &KafkaConfig) -> StreamConsumer {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", kafka_config.brokers.join(","))
        .set("group.id", format!("test_consumer_{}", std::process::id()))
        .set("auto.offset.reset", "earliest")
        .set("enable.auto.commit", "false")
        .create()
        .expect("Failed to create consumer");

    consumer
        .subscribe(&[kafka_config.topic.as_str()])
        .expect("Failed to subscribe to topic");

    consumer
}
