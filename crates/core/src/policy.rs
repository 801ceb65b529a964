// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed policy document.
//!
//! The policy lives at `<state-dir>/policy.toml`. Every field has a
//! default, so a missing or empty file is a valid configuration. Loops
//! re-read the policy through [`PolicyCache`], which skips the parse when
//! the file's mtime is unchanged.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

/// Errors from policy loading.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// How merges of task branches are committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    Squash,
    NoFf,
}

/// Whether budget breaches stop agents or only warn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementMode {
    Soft,
    Hard,
}

/// Warn/block token thresholds for one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLimits {
    pub warn_tokens: u64,
    pub block_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
    pub max_concurrent: u32,
    pub heartbeat_interval_ms: u64,
    /// A session goes stale after `stale_multiplier * heartbeat_interval_ms`.
    pub stale_multiplier: u32,
    /// Command-name substring identifying the assistant process during the
    /// ancestor walk.
    pub assistant_process: String,
    /// Ended sessions older than this are moved to the archive.
    pub archive_after_ms: u64,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            heartbeat_interval_ms: 60_000,
            stale_multiplier: 3,
            assistant_process: "claude".to_string(),
            archive_after_ms: 24 * 60 * 60 * 1000,
        }
    }
}

impl SessionPolicy {
    pub fn stale_after_ms(&self) -> u64 {
        self.heartbeat_interval_ms * u64::from(self.stale_multiplier)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorktreePolicy {
    pub enabled: bool,
    pub base_dir: PathBuf,
    pub branch_prefix: String,
    pub base_branch: String,
    pub merge_strategy: MergeStrategy,
    /// Invoke the semantic merge resolver on conflicts instead of aborting.
    pub auto_resolve: bool,
}

impl Default for WorktreePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            base_dir: PathBuf::from(".pilot/worktrees"),
            branch_prefix: "pilot/".to_string(),
            base_branch: "main".to_string(),
            merge_strategy: MergeStrategy::Squash,
            auto_resolve: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetPolicy {
    pub per_task: BudgetLimits,
    pub per_agent_daily: BudgetLimits,
    pub daily: BudgetLimits,
    pub enforcement: EnforcementMode,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            per_task: BudgetLimits {
                warn_tokens: 2_000_000,
                block_tokens: 5_000_000,
            },
            per_agent_daily: BudgetLimits {
                warn_tokens: 5_000_000,
                block_tokens: 10_000_000,
            },
            daily: BudgetLimits {
                warn_tokens: 20_000_000,
                block_tokens: 50_000_000,
            },
            enforcement: EnforcementMode::Soft,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolPolicy {
    pub min: u32,
    pub max: u32,
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self { min: 1, max: 8 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerPolicy {
    /// Scoring weights; expected to sum to 1.
    pub skill_weight: f64,
    pub load_weight: f64,
    pub affinity_weight: f64,
    pub cost_weight: f64,
    /// Tasks unassigned longer than this start accruing boost.
    pub starvation_interval_ms: u64,
    /// Boost per elapsed interval.
    pub starvation_factor: f64,
    pub starvation_boost_max: f64,
    /// Active-task capacity per agent (drives the load fraction).
    pub agent_capacity: u32,
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        Self {
            skill_weight: 0.4,
            load_weight: 0.3,
            affinity_weight: 0.2,
            cost_weight: 0.1,
            starvation_interval_ms: 10 * 60 * 1000,
            starvation_factor: 0.05,
            starvation_boost_max: 0.3,
            agent_capacity: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaPolicy {
    pub locking_enabled: bool,
}

impl Default for AreaPolicy {
    fn default() -> Self {
        Self {
            locking_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchPolicy {
    pub protected: Vec<String>,
}

impl Default for BranchPolicy {
    fn default() -> Self {
        Self {
            protected: vec!["main".to_string(), "master".to_string()],
        }
    }
}

/// Glob lists exempting paths from governance checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExceptionPolicy {
    pub never_edit: Vec<String>,
    pub no_task_required: Vec<String>,
    pub no_plan_required: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentLoopPolicy {
    pub approval_timeout_ms: u64,
    /// Checkpoint when context pressure reaches this percentage.
    pub checkpoint_at_pressure_pct: u8,
    pub max_consecutive_exec_steps: u32,
    pub max_errors: u32,
    /// Proceed without approval when the approval request times out.
    pub auto_plan_on_timeout: bool,
    pub poll_active_ms: u64,
    pub poll_idle_ms: u64,
}

impl Default for AgentLoopPolicy {
    fn default() -> Self {
        Self {
            approval_timeout_ms: 5 * 60 * 1000,
            checkpoint_at_pressure_pct: 60,
            max_consecutive_exec_steps: 50,
            max_errors: 3,
            auto_plan_on_timeout: false,
            poll_active_ms: 2_000,
            poll_idle_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PmPolicy {
    pub health_scan_interval_ms: u64,
    pub cost_scan_interval_ms: u64,
    pub drift_scan_interval_ms: u64,
    pub recovery_scan_interval_ms: u64,
    pub dispatch_scan_interval_ms: u64,
    pub pr_scan_interval_ms: u64,
    pub channel_scan_interval_ms: u64,
    /// Nudge active sessions idle (no claim) longer than this.
    pub idle_nudge_after_ms: u64,
}

impl Default for PmPolicy {
    fn default() -> Self {
        Self {
            health_scan_interval_ms: 60_000,
            cost_scan_interval_ms: 5 * 60 * 1000,
            drift_scan_interval_ms: 5 * 60 * 1000,
            recovery_scan_interval_ms: 2 * 60 * 1000,
            dispatch_scan_interval_ms: 30_000,
            pr_scan_interval_ms: 10 * 60 * 1000,
            channel_scan_interval_ms: 15_000,
            idle_nudge_after_ms: 10 * 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelPolicy {
    /// Authorized chat ids. Empty allowlist rejects everyone.
    pub allowlist: Vec<i64>,
    pub rate_per_minute: u32,
    pub rate_per_hour: u32,
    pub max_history_turns: usize,
    pub history_char_cap: usize,
    pub max_message_len: usize,
    pub approval_timeout_ms: u64,
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self {
            allowlist: Vec::new(),
            rate_per_minute: 20,
            rate_per_hour: 200,
            max_history_turns: 20,
            history_char_cap: 2_000,
            max_message_len: 4_000,
            approval_timeout_ms: 30 * 60 * 1000,
        }
    }
}

/// Root policy document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub sessions: SessionPolicy,
    pub worktree: WorktreePolicy,
    pub budget: BudgetPolicy,
    pub pool: PoolPolicy,
    pub scheduler: SchedulerPolicy,
    pub areas: AreaPolicy,
    pub branches: BranchPolicy,
    pub exceptions: ExceptionPolicy,
    pub agent_loop: AgentLoopPolicy,
    pub pm: PmPolicy,
    pub channel: ChannelPolicy,
}

impl Policy {
    /// Load a policy document from `path`.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| PolicyError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Load `path`, or the defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, PolicyError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Mtime-checked policy cache for loops that re-read every tick.
#[derive(Debug)]
pub struct PolicyCache {
    path: PathBuf,
    cached: Policy,
    mtime: Option<SystemTime>,
}

impl PolicyCache {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, PolicyError> {
        let path = path.into();
        let cached = Policy::load_or_default(&path)?;
        let mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        Ok(Self {
            path,
            cached,
            mtime,
        })
    }

    /// Current policy, re-parsed only when the file's mtime changed.
    pub fn current(&mut self) -> &Policy {
        let mtime = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok();
        if mtime != self.mtime {
            if let Ok(policy) = Policy::load_or_default(&self.path) {
                self.cached = policy;
                self.mtime = mtime;
            }
        }
        &self.cached
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
