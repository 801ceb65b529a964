// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tiered budget enforcement over the cost ledgers.
//!
//! Three scopes (per-task, per-agent-per-day, global per-day), each with
//! warn and block thresholds. Under hard enforcement an exceeded budget is
//! fatal to the agent loop; under soft it only warns.

use crate::error::EngineError;
use pilot_core::{BudgetPolicy, Clock, EnforcementMode, SessionId, TaskId};
use pilot_storage::CostLedger;
use serde::Serialize;
use std::sync::Arc;

/// Budget standing, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetStatus {
    Ok,
    Warning,
    Exceeded,
}

/// Result of a budget check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetVerdict {
    pub status: BudgetStatus,
    pub reason: String,
    /// Whether the agent loop must stop (hard enforcement + exceeded).
    pub fatal: bool,
}

impl BudgetVerdict {
    fn ok() -> Self {
        Self {
            status: BudgetStatus::Ok,
            reason: String::new(),
            fatal: false,
        }
    }
}

/// Budget checker.
pub struct BudgetEnforcer {
    ledger: CostLedger,
    policy: BudgetPolicy,
    clock: Arc<dyn Clock>,
}

impl BudgetEnforcer {
    pub fn new(ledger: CostLedger, policy: BudgetPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            policy,
            clock,
        }
    }

    pub fn ledger(&self) -> &CostLedger {
        &self.ledger
    }

    /// Check every scope for the given session/task pair, returning the
    /// most severe standing.
    pub fn check_budget(
        &self,
        session: &SessionId,
        task: Option<&TaskId>,
    ) -> Result<BudgetVerdict, EngineError> {
        let today = self.clock.today();
        let mut worst = BudgetVerdict::ok();

        let mut consider = |tokens: u64, warn: u64, block: u64, scope: &str| {
            let (status, reason) = if block > 0 && tokens >= block {
                (
                    BudgetStatus::Exceeded,
                    format!("{scope} budget exceeded: {tokens} >= {block} tokens"),
                )
            } else if warn > 0 && tokens >= warn {
                (
                    BudgetStatus::Warning,
                    format!("{scope} budget warning: {tokens} >= {warn} tokens"),
                )
            } else {
                return;
            };
            if status > worst.status {
                worst = BudgetVerdict {
                    status,
                    reason,
                    fatal: false,
                };
            }
        };

        if let Some(task) = task {
            let cost = self.ledger.task_cost(task)?;
            consider(
                cost.total_tokens,
                self.policy.per_task.warn_tokens,
                self.policy.per_task.block_tokens,
                "per-task",
            );
        }

        let agent = self.ledger.agent_cost(session)?;
        consider(
            agent.today_tokens_on(&today),
            self.policy.per_agent_daily.warn_tokens,
            self.policy.per_agent_daily.block_tokens,
            "per-agent daily",
        );

        let daily = self.ledger.daily_cost(&today)?;
        consider(
            daily.total_tokens,
            self.policy.daily.warn_tokens,
            self.policy.daily.block_tokens,
            "daily",
        );

        if worst.status == BudgetStatus::Exceeded
            && self.policy.enforcement == EnforcementMode::Hard
        {
            worst.fatal = true;
        }
        Ok(worst)
    }

    /// Tokens left in the global daily budget (autoscaler input).
    pub fn daily_remaining(&self) -> Result<u64, EngineError> {
        let today = self.clock.today();
        let spent = self.ledger.daily_cost(&today)?.total_tokens;
        Ok(self.policy.daily.block_tokens.saturating_sub(spent))
    }
}

#[cfg(test)]
#[path = "budget_tests.rs"]
mod tests;
