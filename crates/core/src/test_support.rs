// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders shared by other crates' tests (behind the `test-support` feature).

use crate::id::{SessionId, TaskId};
use crate::role::Role;
use crate::session::SessionState;
use crate::task::{Task, TaskStatus};

/// Build an active session with sensible defaults.
pub fn session(id: &str, role: Role, parent_pid: u32) -> SessionState {
    SessionState::new(SessionId::new(id), role, format!("agent-{id}"), parent_pid + 1, parent_pid, 0)
}

/// Build a ready task with the given labels.
pub fn ready_task(id: &str, title: &str, labels: &[&str]) -> Task {
    let mut task = Task::new(TaskId::new(id), title);
    task.status = TaskStatus::Ready;
    task.labels = labels.iter().map(|s| s.to_string()).collect();
    task
}
