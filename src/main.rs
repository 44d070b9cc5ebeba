use anyhow::Context;
use clap::{Parser, Subcommand};
use poll_capture::kafka::{KafkaConsumer, KafkaProducer};
use poll_capture::normalizer::TracingSink;
use poll_capture::postgres::PostgresSource;
use poll_capture::shutdown::shutdown_signal;
use poll_capture::{Capture, Config, Normalizer};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const BROKER_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "poll-capture")]
#[command(about = "Snapshot-polling change capture from PostgreSQL to Kafka", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the tracked tables and publish detected changes
    Capture,
    /// Consume the change topic and log normalized records
    Consume,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting poll-capture");
    if let Some(path) = &args.config {
        info!("Loading configuration from {:?}", path);
    }

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;

    info!(
        postgres_host = %config.postgres.host,
        postgres_port = %config.postgres.port,
        postgres_database = %config.postgres.database,
        kafka_brokers = ?config.kafka.brokers,
        kafka_topic = %config.kafka.topic,
        poll_interval_ms = config.capture.poll_interval_ms,
        tables = ?config.capture.tables.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        "Configuration summary"
    );

    match args.command {
        Command::Capture => run_capture(config).await,
        Command::Consume => run_consume(config).await,
    }
}

async fn run_capture(config: Config) -> anyhow::Result<()> {
    let producer = KafkaProducer::new(&config.kafka).context("failed to create Kafka producer")?;
    producer
        .verify_connectivity(BROKER_PROBE_TIMEOUT)
        .context("Kafka is unreachable")?;
    info!("CDC service started - monitoring database changes");

    let source = PostgresSource::connect(&config.postgres)
        .await
        .context("PostgreSQL is unreachable")?;

    let mut capture = Capture::new(&config, source, producer);
    capture.run(shutdown_signal()).await?;

    let (source, _producer) = capture.into_parts();
    source.close();
    info!("Capture stopped");
    Ok(())
}

async fn run_consume(config: Config) -> anyhow::Result<()> {
    let consumer = KafkaConsumer::new(&config.kafka, &config.consumer)
        .context("failed to create Kafka consumer")?;
    consumer
        .verify_connectivity(BROKER_PROBE_TIMEOUT)
        .context("Kafka is unreachable")?;

    let mut normalizer = Normalizer::new(TracingSink);
    consumer.run(&mut normalizer, shutdown_signal()).await?;
    Ok(())
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("poll_capture=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("poll_capture=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
