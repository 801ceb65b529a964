// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task records as consumed from the issue tracker.

use crate::id::TaskId;
use serde::{Deserialize, Serialize};

/// Tracker-side status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    InProgress,
    Blocked,
    Done,
}

/// A unit of work from the issue tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub status: TaskStatus,
    /// Creation time, epoch millis. Drives the starvation boost.
    #[serde(default)]
    pub created_at_ms: u64,
    /// Task ids that must complete before this one may start.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            labels: Vec::new(),
            status: TaskStatus::Pending,
            created_at_ms: 0,
            dependencies: Vec::new(),
            assignee: None,
        }
    }

    /// Whether the task carries the given label (case-insensitive).
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }

    /// Capabilities required of an assignee, derived from labels.
    pub fn required_capabilities(&self) -> Vec<&str> {
        self.labels
            .iter()
            .filter_map(|l| l.strip_prefix("needs:"))
            .collect()
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
