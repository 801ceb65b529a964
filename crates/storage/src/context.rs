// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared live status board.
//!
//! One small JSON file mapping session id to its current progress
//! snapshot. This is the cheapest mechanism by which two agents notice
//! they are about to touch the same files.

use crate::fsutil::{read_json, write_json_atomic, StoreError};
use crate::layout::StateLayout;
use pilot_core::{Message, SessionId, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// What an agent is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentActivity {
    Idle,
    Working,
    Blocked,
}

/// One agent's published progress snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProgress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub task_title: String,
    #[serde(default)]
    pub step: u32,
    #[serde(default)]
    pub total_steps: u32,
    pub status: AgentActivity,
    #[serde(default)]
    pub files_modified: Vec<PathBuf>,
    #[serde(default)]
    pub updated_at_ms: u64,
}

impl AgentProgress {
    pub fn idle(now_ms: u64) -> Self {
        Self {
            task_id: None,
            task_title: String::new(),
            step: 0,
            total_steps: 0,
            status: AgentActivity::Idle,
            files_modified: Vec::new(),
            updated_at_ms: now_ms,
        }
    }
}

type Board = BTreeMap<String, AgentProgress>;

/// Repository for the shared board file.
#[derive(Debug, Clone)]
pub struct ContextBoard {
    layout: StateLayout,
}

impl ContextBoard {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    fn read_board(&self) -> Result<Board, StoreError> {
        Ok(read_json(&self.layout.context_board_file())?.unwrap_or_default())
    }

    /// Publish (replace) one agent's snapshot.
    pub fn publish(&self, session: &SessionId, progress: AgentProgress) -> Result<(), StoreError> {
        let mut board = self.read_board()?;
        board.insert(session.as_str().to_string(), progress);
        write_json_atomic(&self.layout.context_board_file(), &board)
    }

    /// Drop an agent from the board (session end).
    pub fn remove(&self, session: &SessionId) -> Result<(), StoreError> {
        let mut board = self.read_board()?;
        if board.remove(session.as_str()).is_some() {
            write_json_atomic(&self.layout.context_board_file(), &board)?;
        }
        Ok(())
    }

    /// The whole board, keyed by session id.
    pub fn board(&self) -> Result<Vec<(SessionId, AgentProgress)>, StoreError> {
        Ok(self
            .read_board()?
            .into_iter()
            .map(|(id, progress)| (SessionId::new(id), progress))
            .collect())
    }

    pub fn agent(&self, session: &SessionId) -> Result<Option<AgentProgress>, StoreError> {
        Ok(self.read_board()?.remove(session.as_str()))
    }

    /// Agents working the given task.
    pub fn related_progress(&self, task: &TaskId) -> Result<Vec<(SessionId, AgentProgress)>, StoreError> {
        Ok(self
            .board()?
            .into_iter()
            .filter(|(_, p)| p.task_id.as_ref() == Some(task))
            .collect())
    }

    /// Agents whose published `files_modified` overlap `paths`.
    pub fn agents_on_files(
        &self,
        paths: &[&Path],
        exclude: Option<&SessionId>,
    ) -> Result<Vec<(SessionId, AgentProgress)>, StoreError> {
        Ok(self
            .board()?
            .into_iter()
            .filter(|(id, _)| exclude != Some(id))
            .filter(|(_, p)| {
                p.files_modified
                    .iter()
                    .any(|f| paths.iter().any(|path| *path == f.as_path()))
            })
            .collect())
    }

    /// Enrich messages with a `_context` field describing peers touching
    /// the same files or task.
    pub fn inject_context(
        &self,
        session: &SessionId,
        messages: &mut [serde_json::Value],
    ) -> Result<(), StoreError> {
        let own = self.agent(session)?;
        let board = self.board()?;

        for message in messages.iter_mut() {
            let Some(map) = message.as_object_mut() else {
                continue;
            };
            let mut peers = Vec::new();
            for (peer_id, progress) in &board {
                if peer_id == session {
                    continue;
                }
                let shares_task = own
                    .as_ref()
                    .and_then(|o| o.task_id.as_ref())
                    .is_some_and(|t| progress.task_id.as_ref() == Some(t));
                let shares_files = own.as_ref().is_some_and(|o| {
                    o.files_modified
                        .iter()
                        .any(|f| progress.files_modified.contains(f))
                });
                if shares_task || shares_files {
                    peers.push(json!({
                        "session_id": peer_id,
                        "task_id": progress.task_id,
                        "status": progress.status,
                        "files_modified": progress.files_modified,
                    }));
                }
            }
            if !peers.is_empty() {
                map.insert("_context".to_string(), json!({ "peers": peers }));
            }
        }
        Ok(())
    }

    /// Convenience: messages as values, enriched, for a reader.
    pub fn enrich_messages(
        &self,
        session: &SessionId,
        messages: &[Message],
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        let mut values: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| serde_json::to_value(m).unwrap_or_default())
            .collect();
        self.inject_context(session, &mut values)?;
        Ok(values)
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
