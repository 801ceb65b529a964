// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interactive-assistant runtime collaborator.
//!
//! The substrate never manages the assistant's lifetime; it can only
//! spawn a fresh one with a prepared environment or inject a prompt into
//! a running session.

mod cli;

pub use cli::CliAssistant;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeAssistant;

use async_trait::async_trait;
use pilot_core::SessionId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from assistant runtime operations.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("inject failed: {0}")]
    Inject(String),
}

/// What to launch a fresh assistant with.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub workdir: PathBuf,
    /// Environment handed to the process; always includes
    /// `PILOT_SESSION_ID`, optionally `PILOT_AGENT_ROLE`.
    pub env: Vec<(String, String)>,
    pub prompt: String,
}

/// Narrow assistant-runtime interface.
#[async_trait]
pub trait AssistantRuntime: Send + Sync {
    /// Spawn a new assistant process; returns its PID.
    async fn spawn(&self, spec: SpawnSpec) -> Result<u32, AssistantError>;

    /// Inject a prompt into a running session.
    async fn inject(&self, session: &SessionId, prompt: &str) -> Result<(), AssistantError>;
}
