// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory tracker for tests.

use super::{IssueTracker, TrackerError};
use async_trait::async_trait;
use parking_lot::Mutex;
use pilot_core::{Task, TaskId, TaskStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Scriptable tracker holding tasks in memory.
#[derive(Debug, Clone, Default)]
pub struct FakeTracker {
    tasks: Arc<Mutex<Vec<Task>>>,
    next_id: Arc<AtomicU64>,
}

impl FakeTracker {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn seed(&self, task: Task) {
        self.tasks.lock().push(task);
    }

    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.tasks.lock().iter().find(|t| &t.id == id).cloned()
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn ready(&self) -> Result<Vec<Task>, TrackerError> {
        Ok(self
            .tasks
            .lock()
            .iter()
            .filter(|t| t.status == TaskStatus::Ready)
            .cloned()
            .collect())
    }

    async fn list(&self, status: TaskStatus) -> Result<Vec<Task>, TrackerError> {
        Ok(self
            .tasks
            .lock()
            .iter()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<(), TrackerError> {
        let mut tasks = self.tasks.lock();
        let task = tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| TrackerError::UnknownTask(id.clone()))?;
        task.status = status;
        Ok(())
    }

    async fn close(&self, id: &TaskId) -> Result<(), TrackerError> {
        self.update_status(id, TaskStatus::Done).await
    }

    async fn create(
        &self,
        title: &str,
        description: &str,
        labels: &[String],
    ) -> Result<TaskId, TrackerError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = TaskId::new(format!("T-fake-{n}"));
        let mut task = Task::new(id.clone(), title);
        task.description = description.to_string();
        task.labels = labels.to_vec();
        task.status = TaskStatus::Pending;
        self.tasks.lock().push(task);
        Ok(id)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
