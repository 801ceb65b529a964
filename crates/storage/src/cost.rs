// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token cost ledgers.
//!
//! Three aggregations, all monotonic within a day: per-task, per-agent
//! (lifetime plus today-so-far, reset at the day boundary), and a rolling
//! per-day global total. Token counts use a fixed 4-bytes-per-token
//! approximation; the model is replaceable but the schema is stable.

use crate::fsutil::{read_json, write_json_atomic, StoreError};
use crate::layout::StateLayout;
use pilot_core::{SessionId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fixed byte-to-token conversion ratio.
pub const BYTES_PER_TOKEN: u64 = 4;

/// Per-task cost aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskCost {
    #[serde(default)]
    pub total_bytes: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub respawn_count: u32,
    /// Token contributions per session.
    #[serde(default)]
    pub sessions: BTreeMap<String, u64>,
}

/// Per-agent cost aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentCost {
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub today_tokens: u64,
    /// Date key (`YYYY-MM-DD`) that `today_tokens` belongs to.
    #[serde(default)]
    pub today: String,
}

impl AgentCost {
    /// Tokens spent today as seen from `today`; zero when the ledger's
    /// day has rolled over.
    pub fn today_tokens_on(&self, today: &str) -> u64 {
        if self.today == today {
            self.today_tokens
        } else {
            0
        }
    }
}

/// Global per-day total.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyCost {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Repository for the three ledgers.
#[derive(Debug, Clone)]
pub struct CostLedger {
    layout: StateLayout,
}

impl CostLedger {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    /// Record `bytes` of output attributed to `session` working `task`.
    ///
    /// Updates all three aggregations. `today` is the current date key.
    pub fn record_task_cost(
        &self,
        session: &SessionId,
        task: &TaskId,
        bytes: u64,
        today: &str,
    ) -> Result<(), StoreError> {
        let tokens = bytes / BYTES_PER_TOKEN;

        let task_path = self.layout.task_cost_file(task);
        let mut task_cost = read_json::<TaskCost>(&task_path)?.unwrap_or_default();
        task_cost.total_bytes += bytes;
        task_cost.total_tokens += tokens;
        *task_cost
            .sessions
            .entry(session.as_str().to_string())
            .or_insert(0) += tokens;
        write_json_atomic(&task_path, &task_cost)?;

        let agent_path = self.layout.agent_cost_file(session);
        let mut agent_cost = read_json::<AgentCost>(&agent_path)?.unwrap_or_default();
        if agent_cost.today != today {
            agent_cost.today = today.to_string();
            agent_cost.today_tokens = 0;
        }
        agent_cost.total_tokens += tokens;
        agent_cost.today_tokens += tokens;
        write_json_atomic(&agent_path, &agent_cost)?;

        let daily_path = self.layout.daily_cost_file(today);
        let mut daily = read_json::<DailyCost>(&daily_path)?.unwrap_or_default();
        daily.date = today.to_string();
        daily.total_tokens += tokens;
        write_json_atomic(&daily_path, &daily)?;

        Ok(())
    }

    /// Count a respawn against the task's ledger.
    pub fn record_respawn(&self, task: &TaskId) -> Result<(), StoreError> {
        let path = self.layout.task_cost_file(task);
        let mut cost = read_json::<TaskCost>(&path)?.unwrap_or_default();
        cost.respawn_count += 1;
        write_json_atomic(&path, &cost)
    }

    pub fn task_cost(&self, task: &TaskId) -> Result<TaskCost, StoreError> {
        Ok(read_json(&self.layout.task_cost_file(task))?.unwrap_or_default())
    }

    pub fn agent_cost(&self, session: &SessionId) -> Result<AgentCost, StoreError> {
        Ok(read_json(&self.layout.agent_cost_file(session))?.unwrap_or_default())
    }

    pub fn daily_cost(&self, today: &str) -> Result<DailyCost, StoreError> {
        Ok(read_json(&self.layout.daily_cost_file(today))?.unwrap_or_default())
    }

    /// Tokens-per-step and tokens-per-session efficiency summary.
    pub fn efficiency(&self, task: &TaskId, steps_completed: u32) -> Result<Efficiency, StoreError> {
        let cost = self.task_cost(task)?;
        let sessions = cost.sessions.len().max(1) as u64;
        Ok(Efficiency {
            total_tokens: cost.total_tokens,
            tokens_per_step: cost.total_tokens / u64::from(steps_completed.max(1)),
            tokens_per_session: cost.total_tokens / sessions,
            respawn_count: cost.respawn_count,
        })
    }
}

/// Efficiency summary for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Efficiency {
    pub total_tokens: u64,
    pub tokens_per_step: u64,
    pub tokens_per_session: u64,
    pub respawn_count: u32,
}

#[cfg(test)]
#[path = "cost_tests.rs"]
mod tests;
