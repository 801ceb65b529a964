// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only lifecycle event log.
//!
//! One JSON line per event: `{"ts": "<ISO8601>", "type": ..., ...}`.

use crate::fsutil::{append_jsonl, read_jsonl, StoreError};
use crate::layout::StateLayout;
use chrono::{DateTime, Utc};
use pilot_core::{Event, TaskId};
use serde_json::Value;

/// Repository for the event log.
#[derive(Debug, Clone)]
pub struct EventLog {
    layout: StateLayout,
}

impl EventLog {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    /// Append one event stamped with `ts`.
    pub fn append(&self, event: &Event, ts: DateTime<Utc>) -> Result<(), StoreError> {
        let mut value = serde_json::to_value(event)?;
        if let Some(map) = value.as_object_mut() {
            map.insert("ts".to_string(), Value::String(ts.to_rfc3339()));
        }
        append_jsonl(&self.layout.events_file(), &value)
    }

    /// Last `n` raw records, optionally filtered by task id.
    pub fn tail(&self, n: usize, task: Option<&TaskId>) -> Result<Vec<Value>, StoreError> {
        let records = read_jsonl::<Value>(&self.layout.events_file())?;
        let filtered: Vec<Value> = records
            .into_iter()
            .filter(|record| match task {
                Some(task) => record
                    .get("task_id")
                    .and_then(Value::as_str)
                    .is_some_and(|t| t == task.as_str()),
                None => true,
            })
            .collect();
        let start = filtered.len().saturating_sub(n);
        Ok(filtered[start..].to_vec())
    }
}

#[cfg(test)]
#[path = "event_log_tests.rs"]
mod tests;
