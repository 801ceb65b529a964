// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Issue tracker collaborator (`bd`).
//!
//! The tracker owns task truth; the substrate only reads ready work and
//! pushes status transitions.

mod bd;

pub use bd::BdTracker;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeTracker;

use async_trait::async_trait;
use pilot_core::{Task, TaskId, TaskStatus};
use thiserror::Error;

/// Errors from tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker command failed: {0}")]
    CommandFailed(String),
    #[error("tracker returned malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),
}

/// Narrow tracker interface consumed by the core.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Tasks ready to be worked (dependencies satisfied).
    async fn ready(&self) -> Result<Vec<Task>, TrackerError>;

    /// Tasks with the given status.
    async fn list(&self, status: TaskStatus) -> Result<Vec<Task>, TrackerError>;

    async fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<(), TrackerError>;

    async fn close(&self, id: &TaskId) -> Result<(), TrackerError>;

    /// File a new task, returning its id.
    async fn create(
        &self,
        title: &str,
        description: &str,
        labels: &[String],
    ) -> Result<TaskId, TrackerError>;
}
