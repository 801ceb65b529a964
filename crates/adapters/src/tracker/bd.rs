// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `bd` CLI tracker implementation.

use super::{IssueTracker, TrackerError};
use crate::subprocess::{run_with_timeout, TRACKER_TIMEOUT};
use async_trait::async_trait;
use pilot_core::{Task, TaskId, TaskStatus};
use tokio::process::Command;
use tracing::debug;

fn status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Ready => "ready",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Blocked => "blocked",
        TaskStatus::Done => "done",
    }
}

/// Tracker adapter shelling out to the `bd` CLI with `--json`.
#[derive(Debug, Clone)]
pub struct BdTracker {
    program: String,
}

impl Default for BdTracker {
    fn default() -> Self {
        Self {
            program: "bd".to_string(),
        }
    }
}

impl BdTracker {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, TrackerError> {
        debug!(program = %self.program, ?args, "tracker");
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        let output = run_with_timeout(&format!("{} {}", self.program, args.join(" ")), cmd, TRACKER_TIMEOUT)
            .await
            .map_err(TrackerError::CommandFailed)?;
        if !output.status.success() {
            return Err(TrackerError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl IssueTracker for BdTracker {
    async fn ready(&self) -> Result<Vec<Task>, TrackerError> {
        let stdout = self.run(&["ready", "--json"]).await?;
        Ok(serde_json::from_str(&stdout)?)
    }

    async fn list(&self, status: TaskStatus) -> Result<Vec<Task>, TrackerError> {
        let stdout = self
            .run(&["list", "--status", status_str(status), "--json"])
            .await?;
        Ok(serde_json::from_str(&stdout)?)
    }

    async fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<(), TrackerError> {
        self.run(&["update", id.as_str(), "--status", status_str(status)])
            .await
            .map(drop)
    }

    async fn close(&self, id: &TaskId) -> Result<(), TrackerError> {
        self.run(&["close", id.as_str()]).await.map(drop)
    }

    async fn create(
        &self,
        title: &str,
        description: &str,
        labels: &[String],
    ) -> Result<TaskId, TrackerError> {
        let labels_joined = labels.join(",");
        let mut args = vec!["create", title, "--description", description, "--json"];
        if !labels.is_empty() {
            args.push("--labels");
            args.push(&labels_joined);
        }
        let stdout = self.run(&args).await?;
        let value: serde_json::Value = serde_json::from_str(&stdout)?;
        let id = value
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TrackerError::CommandFailed("create returned no id".to_string()))?;
        Ok(TaskId::new(id))
    }
}
