// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Versioned agent checkpoints with bounded history.
//!
//! One `checkpoint.json` per session plus `history/checkpoint-v<N>.json`
//! for the previous [`HISTORY_KEEP`] versions. Saves are atomic; loads
//! tolerate an in-progress write by retrying once.

use crate::fsutil::{read_json, write_json_atomic, StoreError};
use crate::layout::StateLayout;
use pilot_core::{SessionId, TaskId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// History versions retained per session.
pub const HISTORY_KEEP: usize = 5;

/// One completed plan step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedStep {
    pub description: String,
    #[serde(default)]
    pub result: String,
}

/// Durable snapshot of an agent's working state, sufficient for cold resume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub task_title: String,
    #[serde(default)]
    pub plan_step: u32,
    #[serde(default)]
    pub total_steps: u32,
    #[serde(default)]
    pub completed_steps: Vec<CompletedStep>,
    #[serde(default)]
    pub key_decisions: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<PathBuf>,
    #[serde(default)]
    pub current_context: String,
    #[serde(default)]
    pub important_findings: Vec<String>,
    #[serde(default)]
    pub tool_call_count: u32,
    #[serde(default)]
    pub output_bytes: u64,
    #[serde(default)]
    pub saved_at_ms: u64,
}

/// Repository for checkpoint files.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    layout: StateLayout,
}

impl CheckpointStore {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    /// Save a snapshot, bumping the version and rotating the previous
    /// current file into history. Returns the new version.
    pub fn save(&self, session: &SessionId, mut data: Checkpoint, now_ms: u64) -> Result<u32, StoreError> {
        let current_path = self.layout.checkpoint_file(session);
        let previous = read_json::<Checkpoint>(&current_path)?;

        let version = previous.as_ref().map(|p| p.version + 1).unwrap_or(1);
        if let Some(previous) = previous {
            let history_dir = self.layout.checkpoint_history_dir(session);
            write_json_atomic(
                &history_dir.join(format!("checkpoint-v{}.json", previous.version)),
                &previous,
            )?;
            self.rotate_history(session)?;
        }

        data.version = version;
        data.saved_at_ms = now_ms;
        write_json_atomic(&current_path, &data)?;
        Ok(version)
    }

    pub fn load(&self, session: &SessionId) -> Result<Option<Checkpoint>, StoreError> {
        read_json(&self.layout.checkpoint_file(session))
    }

    /// Remove the current checkpoint and its entire history.
    pub fn delete(&self, session: &SessionId) -> Result<(), StoreError> {
        let current = self.layout.checkpoint_file(session);
        if current.exists() {
            std::fs::remove_file(&current)?;
        }
        let history = self.layout.checkpoint_history_dir(session);
        if history.exists() {
            std::fs::remove_dir_all(&history)?;
        }
        Ok(())
    }

    /// Versions currently present in history, ascending.
    pub fn history_versions(&self, session: &SessionId) -> Result<Vec<u32>, StoreError> {
        let dir = self.layout.checkpoint_history_dir(session);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut versions = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(v) = name
                .strip_prefix("checkpoint-v")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|v| v.parse::<u32>().ok())
            {
                versions.push(v);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    fn rotate_history(&self, session: &SessionId) -> Result<(), StoreError> {
        let versions = self.history_versions(session)?;
        if versions.len() <= HISTORY_KEEP {
            return Ok(());
        }
        let dir = self.layout.checkpoint_history_dir(session);
        for version in &versions[..versions.len() - HISTORY_KEEP] {
            let path = dir.join(format!("checkpoint-v{version}.json"));
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

/// Render a checkpoint as the prompt handed to an agent resuming cold.
pub fn build_restoration_prompt(checkpoint: &Checkpoint) -> String {
    let mut out = String::new();

    out.push_str("## Restored working state\n\n");
    match &checkpoint.task_id {
        Some(task) => out.push_str(&format!(
            "You were working on task {task}: {}\n",
            checkpoint.task_title
        )),
        None => out.push_str("You had no task claimed.\n"),
    }
    out.push_str(&format!(
        "Progress: step {} of {}\n\n",
        checkpoint.plan_step, checkpoint.total_steps
    ));

    if !checkpoint.completed_steps.is_empty() {
        out.push_str("### Completed steps\n");
        for (i, step) in checkpoint.completed_steps.iter().enumerate() {
            out.push_str(&format!("{}. {}", i + 1, step.description));
            if !step.result.is_empty() {
                out.push_str(&format!(" - {}", step.result));
            }
            out.push('\n');
        }
        out.push('\n');
    }

    if !checkpoint.key_decisions.is_empty() {
        out.push_str("### Key decisions\n");
        for decision in &checkpoint.key_decisions {
            out.push_str(&format!("- {decision}\n"));
        }
        out.push('\n');
    }

    if !checkpoint.files_modified.is_empty() {
        out.push_str("### Files modified\n");
        for file in &checkpoint.files_modified {
            out.push_str(&format!("- {}\n", file.display()));
        }
        out.push('\n');
    }

    if !checkpoint.important_findings.is_empty() {
        out.push_str("### Important findings\n");
        for finding in &checkpoint.important_findings {
            out.push_str(&format!("- {finding}\n"));
        }
        out.push('\n');
    }

    if !checkpoint.current_context.is_empty() {
        out.push_str("### Current context\n");
        out.push_str(&checkpoint.current_context);
        out.push_str("\n\n");
    }

    out.push_str("Resume work from where the snapshot left off.\n");
    out
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
