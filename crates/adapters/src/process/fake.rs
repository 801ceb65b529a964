// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory process tree for tests.

use super::ProcessProbe;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct FakeProcess {
    ppid: u32,
    command: String,
    alive: bool,
}

/// Scriptable process tree.
#[derive(Debug, Clone, Default)]
pub struct FakeProbe {
    table: Arc<Mutex<HashMap<u32, FakeProcess>>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live process.
    pub fn add_process(&self, pid: u32, ppid: u32, command: &str) -> &Self {
        self.table.lock().insert(
            pid,
            FakeProcess {
                ppid,
                command: command.to_string(),
                alive: true,
            },
        );
        self
    }

    /// Mark a process dead (it stays in the table for ancestry queries of
    /// historical pids, but probes report it gone).
    pub fn kill(&self, pid: u32) {
        if let Some(process) = self.table.lock().get_mut(&pid) {
            process.alive = false;
        }
    }
}

impl ProcessProbe for FakeProbe {
    fn is_alive(&self, pid: u32) -> bool {
        self.table.lock().get(&pid).is_some_and(|p| p.alive)
    }

    fn parent_of(&self, pid: u32) -> Option<u32> {
        let table = self.table.lock();
        let process = table.get(&pid)?;
        if !process.alive {
            return None;
        }
        Some(process.ppid)
    }

    fn command_of(&self, pid: u32) -> Option<String> {
        let table = self.table.lock();
        let process = table.get(&pid)?;
        if !process.alive {
            return None;
        }
        Some(process.command.clone())
    }
}
