// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recording assistant runtime for tests.

use super::{AssistantError, AssistantRuntime, SpawnSpec};
use async_trait::async_trait;
use parking_lot::Mutex;
use pilot_core::SessionId;
use std::sync::Arc;

/// Records spawns and injections without touching any process.
#[derive(Debug, Clone, Default)]
pub struct FakeAssistant {
    spawns: Arc<Mutex<Vec<SpawnSpec>>>,
    injections: Arc<Mutex<Vec<(SessionId, String)>>>,
    next_pid: Arc<Mutex<u32>>,
}

impl FakeAssistant {
    pub fn new() -> Self {
        Self {
            spawns: Arc::new(Mutex::new(Vec::new())),
            injections: Arc::new(Mutex::new(Vec::new())),
            next_pid: Arc::new(Mutex::new(50_000)),
        }
    }

    pub fn spawns(&self) -> Vec<SpawnSpec> {
        self.spawns.lock().clone()
    }

    pub fn injections(&self) -> Vec<(SessionId, String)> {
        self.injections.lock().clone()
    }
}

#[async_trait]
impl AssistantRuntime for FakeAssistant {
    async fn spawn(&self, spec: SpawnSpec) -> Result<u32, AssistantError> {
        self.spawns.lock().push(spec);
        let mut pid = self.next_pid.lock();
        *pid += 1;
        Ok(*pid)
    }

    async fn inject(&self, session: &SessionId, prompt: &str) -> Result<(), AssistantError> {
        self.injections
            .lock()
            .push((session.clone(), prompt.to_string()));
        Ok(())
    }
}
