use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Remembered baseline for one table.
///
/// Both fields start out absent, meaning nothing has been observed yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotState {
    pub last_change: Option<DateTime<Utc>>,
    pub last_count: Option<i64>,
}

/// Per-table baselines, owned by the capture loop. Nothing is persisted.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    states: HashMap<String, SnapshotState>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current baseline for `table`; unknown tables get the empty state.
    pub fn get(&self, table: &str) -> SnapshotState {
        self.states.get(table).copied().unwrap_or_default()
    }

    /// Replaces the baseline after a successful detection pass.
    pub fn commit(&mut self, table: &str, state: SnapshotState) {
        self.states.insert(table.to_string(), state);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
