// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-role error memory.
//!
//! A JSONL file per role recording error patterns and (when known) their
//! resolutions. The test-failure recoverer consults it before escalating.

use crate::fsutil::{append_jsonl, read_jsonl, StoreError};
use crate::layout::StateLayout;
use pilot_core::{Role, TaskId};
use serde::{Deserialize, Serialize};

/// One remembered error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    pub recorded_at_ms: u64,
}

/// Repository for role memory files.
#[derive(Debug, Clone)]
pub struct RoleMemory {
    layout: StateLayout,
}

impl RoleMemory {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    pub fn record(&self, role: Role, entry: &MemoryEntry) -> Result<(), StoreError> {
        append_jsonl(&self.layout.role_memory_file(role), entry)
    }

    pub fn entries(&self, role: Role) -> Result<Vec<MemoryEntry>, StoreError> {
        read_jsonl(&self.layout.role_memory_file(role))
    }

    /// Most recent entry whose pattern matches `pattern` (substring in
    /// either direction) and carries a resolution.
    pub fn lookup_resolution(
        &self,
        role: Role,
        pattern: &str,
    ) -> Result<Option<MemoryEntry>, StoreError> {
        Ok(self
            .entries(role)?
            .into_iter()
            .rev()
            .find(|e| {
                e.resolution.is_some()
                    && (e.pattern.contains(pattern) || pattern.contains(&e.pattern))
            }))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
