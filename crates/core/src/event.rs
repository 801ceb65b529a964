// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle events appended to the observability log.

use crate::area::Area;
use crate::id::{SessionId, TaskId};
use serde::{Deserialize, Serialize};

/// Events recorded in the append-only event log.
///
/// Serializes with `{"type": "session_started", ...fields}` format; the
/// writer prepends a `ts` field when appending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    SessionStarted {
        session_id: SessionId,
        pid: u32,
        parent_pid: u32,
    },
    SessionEnded {
        session_id: SessionId,
        reason: String,
    },
    SessionResurrected {
        session_id: SessionId,
        parent_pid: u32,
    },
    SessionRecovered {
        session_id: SessionId,
        new_session_id: SessionId,
    },
    TaskClaimed {
        session_id: SessionId,
        task_id: TaskId,
        lease_expires_at_ms: u64,
    },
    TaskReleased {
        session_id: SessionId,
        task_id: TaskId,
    },
    AreaLocked {
        session_id: SessionId,
        area: Area,
    },
    AreaUnlocked {
        session_id: SessionId,
        area: Area,
    },
    LocksReleased {
        session_id: SessionId,
    },
    Heartbeat {
        session_id: SessionId,
    },
    CheckpointSaved {
        session_id: SessionId,
        version: u32,
    },
    RecoveryAssessed {
        session_id: SessionId,
        strategy: String,
    },
    RecoveryReassigned {
        session_id: SessionId,
        task_id: TaskId,
    },
    RecoveryCleaned {
        session_id: SessionId,
    },
}

impl Event {
    /// The session this event concerns, when it concerns one.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Event::SessionStarted { session_id, .. }
            | Event::SessionEnded { session_id, .. }
            | Event::SessionResurrected { session_id, .. }
            | Event::SessionRecovered { session_id, .. }
            | Event::TaskClaimed { session_id, .. }
            | Event::TaskReleased { session_id, .. }
            | Event::AreaLocked { session_id, .. }
            | Event::AreaUnlocked { session_id, .. }
            | Event::LocksReleased { session_id }
            | Event::Heartbeat { session_id }
            | Event::CheckpointSaved { session_id, .. }
            | Event::RecoveryAssessed { session_id, .. }
            | Event::RecoveryReassigned { session_id, .. }
            | Event::RecoveryCleaned { session_id } => Some(session_id),
        }
    }

    /// The task this event concerns, when it concerns one.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Event::TaskClaimed { task_id, .. }
            | Event::TaskReleased { task_id, .. }
            | Event::RecoveryReassigned { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
