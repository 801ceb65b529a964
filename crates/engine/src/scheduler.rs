// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-factor assignment scoring and the pool autoscaler.
//!
//! The scheduler is a pure function over snapshots: callers collect agent
//! and cost state, the scheduler ranks and assigns. Scores combine skill
//! match, load headroom, area affinity, and cost health, plus a starvation
//! boost for tasks that have waited too long. Ties break on agent id so
//! assignment is deterministic.

use pilot_core::{PoolPolicy, Role, SchedulerPolicy, SessionId, Task, TaskId};
use std::collections::HashMap;

/// Scheduler-facing view of one live agent.
#[derive(Debug, Clone)]
pub struct AgentSnapshot {
    pub session_id: SessionId,
    pub role: Role,
    /// Tasks currently claimed by this agent.
    pub active_tasks: u32,
    /// Tokens spent today (cost-health input).
    pub today_tokens: u64,
    /// Recent success rate of this role on overlapping files, in [0, 1].
    /// Callers without history pass 0.5 (neutral).
    pub recent_success_rate: f64,
}

/// One task → agent decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub task_id: TaskId,
    pub session_id: SessionId,
    pub score: f64,
}

/// Inputs collected for a scheduling pass.
#[derive(Debug, Clone, Default)]
pub struct SchedulerInputs {
    pub agents: Vec<AgentSnapshot>,
    /// Tokens already spent per task (per-task budget eligibility).
    pub task_tokens: HashMap<TaskId, u64>,
}

/// The scoring scheduler.
#[derive(Debug, Clone)]
pub struct Scheduler {
    policy: SchedulerPolicy,
    daily_warn_tokens: u64,
    per_task_block_tokens: u64,
}

impl Scheduler {
    pub fn new(policy: SchedulerPolicy, daily_warn_tokens: u64, per_task_block_tokens: u64) -> Self {
        Self {
            policy,
            daily_warn_tokens,
            per_task_block_tokens,
        }
    }

    /// Fraction of the task's required capabilities this role provides.
    fn skill_match(role: Role, task: &Task) -> f64 {
        let required = task.required_capabilities();
        if required.is_empty() {
            // No explicit requirements: match on the domain label.
            return if task.has_label(role.as_str()) { 1.0 } else { 0.5 };
        }
        let caps = role.capabilities();
        let matched = required
            .iter()
            .filter(|r| caps.iter().any(|c| c == *r))
            .count();
        matched as f64 / required.len() as f64
    }

    fn load_fraction(&self, agent: &AgentSnapshot) -> f64 {
        let capacity = self.policy.agent_capacity.max(1);
        f64::from(agent.active_tasks) / f64::from(capacity)
    }

    fn cost_health(&self, agent: &AgentSnapshot) -> f64 {
        if self.daily_warn_tokens == 0 {
            return 1.0;
        }
        1.0 - (agent.today_tokens as f64 / self.daily_warn_tokens as f64).min(1.0)
    }

    /// Affinity: the agent's recent success rate, counted only when the
    /// task names the agent's domain; neutral otherwise.
    fn affinity(agent: &AgentSnapshot, task: &Task) -> f64 {
        if task.has_label(agent.role.as_str()) {
            agent.recent_success_rate
        } else {
            0.5
        }
    }

    /// Boost for tasks unassigned beyond the starvation interval.
    pub fn starvation_boost(&self, task: &Task, now_ms: u64) -> f64 {
        let age_ms = now_ms.saturating_sub(task.created_at_ms);
        if age_ms < self.policy.starvation_interval_ms || self.policy.starvation_interval_ms == 0 {
            return 0.0;
        }
        let intervals = age_ms as f64 / self.policy.starvation_interval_ms as f64;
        (intervals * self.policy.starvation_factor).min(self.policy.starvation_boost_max)
    }

    /// Full score for one candidate pairing.
    pub fn score(&self, agent: &AgentSnapshot, task: &Task, now_ms: u64) -> f64 {
        let p = &self.policy;
        p.skill_weight * Self::skill_match(agent.role, task)
            + p.load_weight * (1.0 - self.load_fraction(agent).min(1.0))
            + p.affinity_weight * Self::affinity(agent, task)
            + p.cost_weight * self.cost_health(agent)
            + self.starvation_boost(task, now_ms)
    }

    fn eligible(&self, agent: &AgentSnapshot, task: &Task, inputs: &SchedulerInputs) -> bool {
        if agent.role == Role::Pm {
            return false;
        }
        if self.load_fraction(agent) >= 1.0 {
            return false;
        }
        if self.per_task_block_tokens > 0 {
            let spent = inputs.task_tokens.get(&task.id).copied().unwrap_or(0);
            if spent >= self.per_task_block_tokens {
                return false;
            }
        }
        true
    }

    /// Best agent for one task, or `None` when nothing is eligible.
    pub fn schedule_one(
        &self,
        task: &Task,
        inputs: &SchedulerInputs,
        now_ms: u64,
    ) -> Option<Assignment> {
        inputs
            .agents
            .iter()
            .filter(|agent| self.eligible(agent, task, inputs))
            .map(|agent| Assignment {
                task_id: task.id.clone(),
                session_id: agent.session_id.clone(),
                score: self.score(agent, task, now_ms),
            })
            .max_by(|a, b| {
                a.score
                    .partial_cmp(&b.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    // Deterministic tie-break: lexicographically smaller id wins.
                    .then_with(|| b.session_id.as_str().cmp(a.session_id.as_str()))
            })
    }

    /// Greedy assignment over `tasks`, highest-scoring pairs first, with
    /// per-agent capacity bookkeeping.
    pub fn schedule(
        &self,
        tasks: &[Task],
        inputs: &SchedulerInputs,
        now_ms: u64,
    ) -> (Vec<Assignment>, Vec<TaskId>) {
        let mut working = inputs.clone();
        let mut assignments = Vec::new();
        let mut unassigned = Vec::new();

        // Rank tasks by their best available score so starved and
        // well-matched work goes first.
        let mut ordered: Vec<&Task> = tasks.iter().collect();
        ordered.sort_by(|a, b| {
            let sa = self
                .schedule_one(a, &working, now_ms)
                .map(|x| x.score)
                .unwrap_or(f64::MIN);
            let sb = self
                .schedule_one(b, &working, now_ms)
                .map(|x| x.score)
                .unwrap_or(f64::MIN);
            sb.partial_cmp(&sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });

        for task in ordered {
            match self.schedule_one(task, &working, now_ms) {
                Some(assignment) => {
                    if let Some(agent) = working
                        .agents
                        .iter_mut()
                        .find(|a| a.session_id == assignment.session_id)
                    {
                        agent.active_tasks += 1;
                    }
                    assignments.push(assignment);
                }
                None => unassigned.push(task.id.clone()),
            }
        }
        (assignments, unassigned)
    }
}

/// Autoscaler decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    ScaleUp { target: u32 },
    ScaleDown { target: u32 },
    Hold,
}

/// Inputs for one autoscaling decision.
#[derive(Debug, Clone, Default)]
pub struct AutoscalerInputs {
    pub queue_depth: u32,
    pub active_agents: u32,
    pub idle_agents: u32,
    pub budget_remaining_tokens: u64,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    /// How long the pool has been fully idle.
    pub idle_for_ms: u64,
}

/// Pool autoscaler. Scale-down conditions are checked first for safety.
#[derive(Debug, Clone)]
pub struct Autoscaler {
    pool: PoolPolicy,
    /// queue/agents ratio that triggers growth.
    pub queue_ratio_up: f64,
    /// Resource pressure ceiling.
    pub pressure_pct: f64,
    /// Fully-idle time before shrinking.
    pub idle_cooldown_ms: u64,
}

impl Autoscaler {
    pub fn new(pool: PoolPolicy) -> Self {
        Self {
            pool,
            queue_ratio_up: 2.0,
            pressure_pct: 90.0,
            idle_cooldown_ms: 5 * 60 * 1000,
        }
    }

    fn clamp(&self, target: u32) -> u32 {
        target.clamp(self.pool.min, self.pool.max)
    }

    pub fn decide(&self, inputs: &AutoscalerInputs) -> ScaleDecision {
        let active = inputs.active_agents;

        // Safety checks first.
        if inputs.budget_remaining_tokens == 0 {
            let target = self.pool.min;
            if active > target {
                return ScaleDecision::ScaleDown { target };
            }
            return ScaleDecision::Hold;
        }
        if inputs.cpu_pct >= self.pressure_pct || inputs.mem_pct >= self.pressure_pct {
            let target = self.clamp(active.saturating_sub(1));
            if target < active {
                return ScaleDecision::ScaleDown { target };
            }
            return ScaleDecision::Hold;
        }
        if inputs.queue_depth == 0
            && inputs.idle_agents == active
            && inputs.idle_for_ms >= self.idle_cooldown_ms
            && active > self.pool.min
        {
            return ScaleDecision::ScaleDown {
                target: self.pool.min,
            };
        }

        // Growth.
        let wants_up = (active == 0 && inputs.queue_depth > 0)
            || (active > 0 && f64::from(inputs.queue_depth) / f64::from(active) >= self.queue_ratio_up)
            || (inputs.idle_agents == 0 && inputs.queue_depth > 0);
        if wants_up {
            let target = self.clamp(active + 1);
            if target > active {
                return ScaleDecision::ScaleUp { target };
            }
        }
        ScaleDecision::Hold
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
