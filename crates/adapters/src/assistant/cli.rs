// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin CLI-backed assistant runtime.

use super::{AssistantError, AssistantRuntime, SpawnSpec};
use async_trait::async_trait;
use pilot_core::SessionId;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::info;

/// Runtime that launches the assistant binary directly.
#[derive(Debug, Clone)]
pub struct CliAssistant {
    program: String,
}

impl CliAssistant {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl AssistantRuntime for CliAssistant {
    async fn spawn(&self, spec: SpawnSpec) -> Result<u32, AssistantError> {
        let mut cmd = Command::new(&self.program);
        cmd.current_dir(&spec.workdir)
            .arg(&spec.prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        let child = cmd
            .spawn()
            .map_err(|e| AssistantError::Spawn(e.to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| AssistantError::Spawn("spawned process exited immediately".into()))?;
        info!(pid, workdir = %spec.workdir.display(), "spawned assistant");
        Ok(pid)
    }

    async fn inject(&self, session: &SessionId, prompt: &str) -> Result<(), AssistantError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["--resume", session.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let mut child = cmd
            .spawn()
            .map_err(|e| AssistantError::Inject(e.to_string()))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| AssistantError::Inject(e.to_string()))?;
        }
        Ok(())
    }
}
