use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info};

use super::types::LatestRow;
use crate::config::{PostgresConfig, TrackedTable};
use crate::Result;

/// Aggregate reads the change detector needs from a table.
///
/// The two reads are separate statements, so they are not a consistent
/// snapshot of the table at a single instant.
#[async_trait]
pub trait TableSource: Send {
    /// The single most recently changed row, or `None` for an empty table.
    async fn latest_row(&mut self, table: &TrackedTable) -> Result<Option<LatestRow>>;

    /// `COUNT(*)` of the table.
    async fn row_count(&mut self, table: &TrackedTable) -> Result<i64>;
}

/// A single PostgreSQL connection reused for every table check.
pub struct PostgresSource {
    client: Client,
    connection_task: tokio::task::JoinHandle<()>,
}

impl PostgresSource {
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Connecting to PostgreSQL"
        );

        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .user(&config.username)
            .password(&config.password)
            .application_name("poll-capture")
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs));

        let (client, connection) = pg_config.connect(NoTls).await?;

        let connection_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Connection error: {}", e);
            }
        });

        info!("Successfully connected to PostgreSQL");

        Ok(Self {
            client,
            connection_task,
        })
    }

    pub fn close(self) {
        info!("Closing PostgreSQL connection");
        drop(self.client);
        self.connection_task.abort();
    }
}

#[async_trait]
impl TableSource for PostgresSource {
    async fn latest_row(&mut self, table: &TrackedTable) -> Result<Option<LatestRow>> {
        let query = latest_row_query(table);
        debug!(table = %table.name, "{}", query);

        let Some(row) = self.client.query_opt(query.as_str(), &[]).await? else {
            return Ok(None);
        };

        Ok(Some(LatestRow {
            row: row.try_get::<_, Value>("row")?,
            changed_at: row.try_get::<_, Option<DateTime<Utc>>>("changed_at")?,
        }))
    }

    async fn row_count(&mut self, table: &TrackedTable) -> Result<i64> {
        let query = count_query(table);
        debug!(table = %table.name, "{}", query);

        let row = self.client.query_one(query.as_str(), &[]).await?;
        Ok(row.try_get(0)?)
    }
}

/// Selects the newest row as JSON alongside its effective change time.
///
/// `NULLS LAST` keeps rows without any timestamp from shadowing real ones,
/// since PostgreSQL sorts NULLs first in descending order.
pub fn latest_row_query(table: &TrackedTable) -> String {
    let expr = table.change_time_expr();
    format!(
        "SELECT row_to_json(t)::jsonb AS row, ({expr})::timestamptz AS changed_at \
         FROM (SELECT * FROM {name} ORDER BY {expr} DESC NULLS LAST LIMIT 1) t",
        expr = expr,
        name = table.name,
    )
}

pub fn count_query(table: &TrackedTable) -> String {
    format!("SELECT COUNT(*) FROM {}", table.name)
}
