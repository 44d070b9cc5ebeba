//! Change inference from successive table snapshots.
//!
//! Each tick the detector sees only two aggregate signals per table: the
//! most recently changed row and the row count. From those it infers:
//!
//! * **INSERT** - the first time a row is seen and no baseline exists yet.
//! * **UPDATE** - the newest change time moved past the baseline. Once a
//!   baseline exists a brand-new row is also reported as UPDATE; the signal
//!   cannot tell the two apart.
//! * **DELETE** - the row count dropped below the previous tick's count.
//!   The payload is `{"count": n}` since the deleted row is no longer
//!   readable.
//!
//! An insert and a delete within the same tick that leave the count and the
//! newest timestamp unchanged are invisible.

use serde_json::json;
use tracing::{debug, warn};

use crate::config::TrackedTable;
use crate::postgres::{ChangeEvent, ChangeOperation, LatestRow, TableSource};
use crate::snapshot::SnapshotState;
use crate::Result;

/// What one tick read from a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub latest: Option<LatestRow>,
    pub count: i64,
}

/// Events found in one pass plus the baseline to keep for the next.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub events: Vec<ChangeEvent>,
    pub state: SnapshotState,
}

#[derive(Debug, Clone)]
pub struct ChangeDetector {
    database: String,
}

impl ChangeDetector {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
        }
    }

    /// Reads both signals for `table` and runs [`detect`](Self::detect).
    ///
    /// Any query error is returned before a new state is computed, so the
    /// caller keeps the old baseline and the next tick retries from it.
    pub async fn check<S>(
        &self,
        source: &mut S,
        table: &TrackedTable,
        state: &SnapshotState,
    ) -> Result<Detection>
    where
        S: TableSource + ?Sized,
    {
        let latest = source.latest_row(table).await?;
        let count = source.row_count(table).await?;
        let observation = Observation { latest, count };

        Ok(self.detect(
            &table.name,
            state,
            observation,
            chrono::Utc::now().timestamp_millis(),
        ))
    }

    /// Compares one observation against the stored baseline.
    pub fn detect(
        &self,
        table: &str,
        state: &SnapshotState,
        observation: Observation,
        now_ms: i64,
    ) -> Detection {
        let mut events = Vec::new();
        let mut next = *state;

        if let Some(latest) = observation.latest {
            match latest.changed_at {
                Some(changed_at) => match state.last_change {
                    None => {
                        debug!(table, %changed_at, "No baseline, reporting newest row as insert");
                        events.push(self.event(ChangeOperation::Insert, table, latest.row, now_ms));
                        next.last_change = Some(changed_at);
                    }
                    Some(last) if changed_at > last => {
                        debug!(table, %last, %changed_at, "Change time advanced");
                        events.push(self.event(ChangeOperation::Update, table, latest.row, now_ms));
                        next.last_change = Some(changed_at);
                    }
                    Some(_) => {}
                },
                None => {
                    warn!(table, "Newest row has neither updated_at nor created_at");
                }
            }
        }

        if let Some(previous) = state.last_count {
            if observation.count < previous {
                debug!(table, previous, current = observation.count, "Row count dropped");
                events.push(self.event(
                    ChangeOperation::Delete,
                    table,
                    json!({ "count": observation.count }),
                    now_ms,
                ));
            }
        }
        next.last_count = Some(observation.count);

        Detection {
            events,
            state: next,
        }
    }

    fn event(
        &self,
        op: ChangeOperation,
        table: &str,
        row: serde_json::Value,
        now_ms: i64,
    ) -> ChangeEvent {
        ChangeEvent::new(op, self.database.clone(), table, Some(row), now_ms)
    }
}
