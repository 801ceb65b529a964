// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State directory layout.
//!
//! All coordination state lives under one root, resolved from
//! `PILOT_STATE_DIR` or defaulting to `~/.local/state/pilot`. Paths are
//! centralized here so no repository hand-builds them.

use pilot_core::{Role, SessionId, TaskId};
use std::path::{Path, PathBuf};

/// Resolved state directory layout.
#[derive(Debug, Clone)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    /// Layout rooted at an explicit directory (tests, tools).
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout from `PILOT_STATE_DIR`, else `~/.local/state/pilot`.
    pub fn resolve() -> Self {
        let root = std::env::var_os("PILOT_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".local/state/pilot")
            });
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy_file(&self) -> PathBuf {
        self.root.join("policy.toml")
    }

    // -- sessions --

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("state/sessions")
    }

    pub fn session_file(&self, id: &SessionId) -> PathBuf {
        self.sessions_dir().join(format!("{id}.json"))
    }

    pub fn session_archive_dir(&self) -> PathBuf {
        self.sessions_dir().join("archive")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("state/locks")
    }

    pub fn lockfile(&self, id: &SessionId) -> PathBuf {
        self.locks_dir().join(format!("{id}.lock"))
    }

    /// Advisory lock serializing the registration/resurrection window.
    pub fn registration_lock(&self) -> PathBuf {
        self.root.join("state/registry.lock")
    }

    pub fn loop_state_file(&self, id: &SessionId) -> PathBuf {
        self.root.join("state/loops").join(format!("{id}.json"))
    }

    // -- bus --

    pub fn bus_file(&self) -> PathBuf {
        self.root.join("bus/bus.jsonl")
    }

    pub fn cursor_file(&self, id: &SessionId) -> PathBuf {
        self.root.join("bus/cursors").join(format!("{id}.json"))
    }

    pub fn pending_acks_file(&self) -> PathBuf {
        self.root.join("bus/pending_acks.jsonl")
    }

    pub fn dlq_file(&self) -> PathBuf {
        self.root.join("bus/dlq.jsonl")
    }

    /// Terminal escalations awaiting out-of-band human review.
    pub fn human_queue_file(&self) -> PathBuf {
        self.root.join("bus/human_queue.jsonl")
    }

    // -- memory --

    pub fn checkpoint_file(&self, id: &SessionId) -> PathBuf {
        self.agent_memory_dir(id).join("checkpoint.json")
    }

    pub fn checkpoint_history_dir(&self, id: &SessionId) -> PathBuf {
        self.agent_memory_dir(id).join("history")
    }

    pub fn agent_memory_dir(&self, id: &SessionId) -> PathBuf {
        self.root.join("memory/agents").join(id.as_str())
    }

    pub fn role_memory_file(&self, role: Role) -> PathBuf {
        self.root
            .join("memory/roles")
            .join(format!("{}.jsonl", role.as_str()))
    }

    // -- costs --

    pub fn task_cost_file(&self, task: &TaskId) -> PathBuf {
        self.root.join("state/costs/tasks").join(format!("{task}.json"))
    }

    pub fn agent_cost_file(&self, id: &SessionId) -> PathBuf {
        self.root.join("state/costs/agents").join(format!("{id}.json"))
    }

    pub fn daily_cost_file(&self, date: &str) -> PathBuf {
        self.root.join("state/costs/daily").join(format!("{date}.json"))
    }

    // -- observability --

    pub fn events_file(&self) -> PathBuf {
        self.root.join("events/events.jsonl")
    }

    /// Shared live status board.
    pub fn context_board_file(&self) -> PathBuf {
        self.root.join("state/agents.json")
    }

    // -- external channel --

    pub fn channel_inbox_file(&self) -> PathBuf {
        self.root.join("channel/inbox.jsonl")
    }

    pub fn channel_inbox_cursor(&self) -> PathBuf {
        self.root.join("channel/inbox_cursor.json")
    }

    pub fn channel_outbox_file(&self) -> PathBuf {
        self.root.join("channel/outbox.jsonl")
    }

    pub fn channel_audit_file(&self) -> PathBuf {
        self.root.join("channel/audit.jsonl")
    }

    pub fn channel_approvals_file(&self) -> PathBuf {
        self.root.join("channel/approvals.json")
    }

    pub fn channel_history_file(&self) -> PathBuf {
        self.root.join("channel/history.json")
    }
}

#[cfg(test)]
#[path = "layout_tests.rs"]
mod tests;
