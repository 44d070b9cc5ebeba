//! The polling loop on the publishing side.
//!
//! Every `poll_interval` the loop checks each tracked table in configured
//! order, commits the new baseline, and publishes whatever was detected.
//! Ticks never overlap: the table checks are awaited inside the loop body
//! and ticks that fall due while a pass is still running are skipped
//! (`MissedTickBehavior::Skip`), so one table's baseline is only ever
//! touched by one detection pass at a time.

use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{Config, TrackedTable};
use crate::detector::ChangeDetector;
use crate::kafka::EventPublisher;
use crate::postgres::{ChangeEvent, TableSource};
use crate::snapshot::SnapshotStore;
use crate::Result;

/// Counts for one pass over all tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub detected: usize,
    pub published: usize,
    pub failed_tables: usize,
}

pub struct Capture<S, P> {
    tables: Vec<TrackedTable>,
    poll_interval: Duration,
    shutdown_timeout: Duration,
    detector: ChangeDetector,
    source: S,
    publisher: P,
    store: SnapshotStore,
}

impl<S, P> Capture<S, P>
where
    S: TableSource,
    P: EventPublisher,
{
    pub fn new(config: &Config, source: S, publisher: P) -> Self {
        Self {
            tables: config.capture.tables.clone(),
            poll_interval: config.poll_interval(),
            shutdown_timeout: config.shutdown_timeout(),
            detector: ChangeDetector::new(config.postgres.database.clone()),
            source,
            publisher,
            store: SnapshotStore::new(),
        }
    }

    /// Polls until `shutdown` resolves, then flushes the publisher.
    ///
    /// A tick in progress when shutdown fires runs to completion first.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            tables = self.tables.len(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "Capture loop started"
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping capture loop");
                    break;
                }
                _ = ticker.tick() => {
                    let summary = self.poll_once().await;
                    debug!(
                        detected = summary.detected,
                        published = summary.published,
                        failed_tables = summary.failed_tables,
                        "Tick complete"
                    );
                }
            }
        }

        if let Err(e) = self.publisher.flush(self.shutdown_timeout).await {
            warn!(error = %e, "Publisher did not flush cleanly");
        }
        Ok(())
    }

    /// Runs one detection pass over every table, in order.
    pub async fn poll_once(&mut self) -> TickSummary {
        let mut summary = TickSummary::default();

        for table in &self.tables {
            let state = self.store.get(&table.name);

            let detection = match self.detector.check(&mut self.source, table, &state).await {
                Ok(detection) => detection,
                Err(e) => {
                    error!(table = %table.name, error = %e, "Error checking table");
                    summary.failed_tables += 1;
                    continue;
                }
            };

            self.store.commit(&table.name, detection.state);
            summary.detected += detection.events.len();

            for event in &detection.events {
                if publish(&self.publisher, event).await {
                    summary.published += 1;
                }
            }
        }

        summary
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn into_parts(self) -> (S, P) {
        (self.source, self.publisher)
    }
}

/// Publishes one event. Failures are logged and the event is dropped.
async fn publish<P: EventPublisher>(publisher: &P, event: &ChangeEvent) -> bool {
    let published = match publisher.publish(event).await {
        Ok(()) => true,
        Err(e) => {
            error!(
                table = %event.table,
                operation = %event.op,
                error = %e,
                "Error publishing change"
            );
            false
        }
    };

    let payload = event.current.clone().unwrap_or_default();
    info!(
        target: "poll_capture::changes",
        timestamp = %chrono::Utc::now().to_rfc3339(),
        table = %event.qualified_table(),
        operation = event.op.as_lowercase(),
        data = %payload,
        published,
        "Change detected"
    );

    published
}
