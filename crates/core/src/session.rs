// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session state record.
//!
//! A session is one registered instance of an interactive assistant, keyed
//! to the assistant's process. The record is exclusively written by its
//! owning session (or by PM-initiated recovery) and shared-read by the PM.

use crate::area::Area;
use crate::id::{SessionId, TaskId};
use crate::role::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

/// Durable state of one registered session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub id: SessionId,
    pub role: Role,
    /// Human-readable agent name, used for direct bus addressing.
    pub agent_name: String,
    /// PID of the hook invocation that registered or last touched this session.
    pub pid: u32,
    /// PID of the interactive assistant process anchoring liveness.
    pub parent_pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_task: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at_ms: Option<u64>,
    /// Lease expiry for the claimed task, epoch millis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_expires_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub locked_areas: BTreeSet<Area>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub locked_files: BTreeSet<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<PathBuf>,
    pub heartbeat_ms: u64,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<String>,
    pub created_at_ms: u64,
}

impl SessionState {
    /// Create a fresh active session.
    pub fn new(id: SessionId, role: Role, agent_name: impl Into<String>, pid: u32, parent_pid: u32, now_ms: u64) -> Self {
        Self {
            id,
            role,
            agent_name: agent_name.into(),
            pid,
            parent_pid,
            claimed_task: None,
            claimed_at_ms: None,
            lease_expires_at_ms: None,
            locked_areas: BTreeSet::new(),
            locked_files: BTreeSet::new(),
            worktree_path: None,
            heartbeat_ms: now_ms,
            status: SessionStatus::Active,
            ended_at_ms: None,
            end_reason: None,
            created_at_ms: now_ms,
        }
    }

    /// A zombie has `status == active` but `ended_at` stamped; cleanup must
    /// repair it by ending the session.
    pub fn is_zombie(&self) -> bool {
        self.status == SessionStatus::Active && self.ended_at_ms.is_some()
    }

    /// Whether the session record itself permits liveness (process checks
    /// are layered on top by the registry).
    pub fn is_nominally_active(&self) -> bool {
        self.status == SessionStatus::Active && self.ended_at_ms.is_none()
    }

    /// Whether the heartbeat is fresh at `now_ms` given the policy's stale
    /// cutoff (`heartbeat_interval * stale_multiplier`).
    pub fn heartbeat_fresh(&self, now_ms: u64, stale_after_ms: u64) -> bool {
        now_ms.saturating_sub(self.heartbeat_ms) < stale_after_ms
    }

    /// Whether the session holds `task` under a live lease at `now_ms`.
    pub fn holds_task(&self, task: &TaskId, now_ms: u64) -> bool {
        self.claimed_task.as_ref() == Some(task) && self.lease_live(now_ms)
    }

    /// Whether the current lease (if any) is unexpired.
    pub fn lease_live(&self, now_ms: u64) -> bool {
        match self.lease_expires_at_ms {
            Some(expiry) => now_ms < expiry,
            None => false,
        }
    }

    /// Stamp the session ended.
    pub fn end(&mut self, reason: impl Into<String>, now_ms: u64) {
        self.status = SessionStatus::Ended;
        self.ended_at_ms = Some(now_ms);
        self.end_reason = Some(reason.into());
    }

    /// Flip an ended session back to active for a rejoining parent process.
    ///
    /// Claims, locked areas, and the worktree path survive resurrection;
    /// only the process identity and timestamps are refreshed.
    pub fn resurrect(&mut self, pid: u32, now_ms: u64) {
        self.status = SessionStatus::Active;
        self.ended_at_ms = None;
        self.end_reason = None;
        self.pid = pid;
        self.heartbeat_ms = now_ms;
    }

    /// Clear the claim and everything that hangs off it.
    pub fn release_claim(&mut self) {
        self.claimed_task = None;
        self.claimed_at_ms = None;
        self.lease_expires_at_ms = None;
        self.locked_areas.clear();
        self.locked_files.clear();
        self.worktree_path = None;
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
