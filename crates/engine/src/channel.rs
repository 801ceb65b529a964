// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External-channel conversation handler.
//!
//! A thin dispatcher over the file-backed inbox/outbox. Every inbound
//! record arrives with a structured `action` already extracted by the
//! relay's intent parser; nothing here executes raw command strings.
//! Senders are authenticated against an allowlist (empty list rejects
//! everyone), rate-limited per chat, and every interaction is audited.

use crate::budget::BudgetEnforcer;
use crate::claims::ClaimService;
use crate::error::EngineError;
use crate::registry::SessionRegistry;
use pilot_adapters::{Channel, InboundRecord, IssueTracker};
use pilot_core::{ChannelPolicy, Clock, Role, SessionId, TaskId};
use pilot_storage::{fsutil, ContextBoard, EventLog, MessageBus, StateLayout};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// One pending approval awaiting a human verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    pub approval_id: String,
    pub task_id: TaskId,
    /// Approval kind, e.g. `plan` or `escalation`.
    pub kind: String,
    pub chat_id: i64,
    pub expires_at_ms: u64,
    #[serde(default)]
    pub escalated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryTurn {
    from_human: bool,
    text: String,
    ts_ms: u64,
}

#[derive(Debug, Default)]
struct RateBucket {
    minute_start_ms: u64,
    minute_count: u32,
    hour_start_ms: u64,
    hour_count: u32,
}

/// The conversation handler.
pub struct ConversationHandler {
    layout: StateLayout,
    channel: Arc<dyn Channel>,
    registry: Arc<SessionRegistry>,
    claims: Arc<ClaimService>,
    tracker: Arc<dyn IssueTracker>,
    board: ContextBoard,
    budget: Arc<BudgetEnforcer>,
    bus: Arc<MessageBus>,
    events: EventLog,
    clock: Arc<dyn Clock>,
    policy: ChannelPolicy,
    pm_session: SessionId,
    rate: Mutex<HashMap<i64, RateBucket>>,
}

impl ConversationHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        layout: StateLayout,
        channel: Arc<dyn Channel>,
        registry: Arc<SessionRegistry>,
        claims: Arc<ClaimService>,
        tracker: Arc<dyn IssueTracker>,
        board: ContextBoard,
        budget: Arc<BudgetEnforcer>,
        bus: Arc<MessageBus>,
        events: EventLog,
        clock: Arc<dyn Clock>,
        policy: ChannelPolicy,
        pm_session: SessionId,
    ) -> Self {
        Self {
            layout,
            channel,
            registry,
            claims,
            tracker,
            board,
            budget,
            bus,
            events,
            clock,
            policy,
            pm_session,
            rate: Mutex::new(HashMap::new()),
        }
    }

    // -- approvals registry --

    fn load_approvals(&self) -> Result<Vec<PendingApproval>, EngineError> {
        Ok(fsutil::read_json(&self.layout.channel_approvals_file())?.unwrap_or_default())
    }

    fn save_approvals(&self, approvals: &[PendingApproval]) -> Result<(), EngineError> {
        fsutil::write_json_atomic(&self.layout.channel_approvals_file(), &approvals.to_vec())?;
        Ok(())
    }

    /// Register a pending approval, returning its opaque id.
    pub fn register_approval(
        &self,
        task_id: &TaskId,
        kind: &str,
        chat_id: i64,
    ) -> Result<String, EngineError> {
        let approval_id = uuid_like();
        let mut approvals = self.load_approvals()?;
        approvals.push(PendingApproval {
            approval_id: approval_id.clone(),
            task_id: task_id.clone(),
            kind: kind.to_string(),
            chat_id,
            expires_at_ms: self.clock.now_ms() + self.policy.approval_timeout_ms,
            escalated: false,
        });
        self.save_approvals(&approvals)?;
        Ok(approval_id)
    }

    pub fn pending_approvals(&self) -> Result<Vec<PendingApproval>, EngineError> {
        self.load_approvals()
    }

    /// Single-shot timeout escalation: each expired entry notifies its
    /// chat once and is marked escalated, never twice.
    pub fn scan_approval_timeouts(&self) -> Result<u32, EngineError> {
        let now_ms = self.clock.now_ms();
        let mut approvals = self.load_approvals()?;
        let mut escalated = 0;
        for approval in approvals.iter_mut() {
            if approval.escalated || now_ms < approval.expires_at_ms {
                continue;
            }
            approval.escalated = true;
            escalated += 1;
            self.channel.send_text(
                approval.chat_id,
                &format!(
                    "Approval {} for task {} timed out without a decision.",
                    approval.approval_id, approval.task_id
                ),
                now_ms,
            )?;
        }
        if escalated > 0 {
            self.save_approvals(&approvals)?;
        }
        Ok(escalated)
    }

    /// Resolve one approval: by explicit id, else by task id, else the
    /// single pending entry.
    fn take_approval(
        &self,
        approval_id: Option<&str>,
        task_id: Option<&str>,
    ) -> Result<Option<PendingApproval>, EngineError> {
        let mut approvals = self.load_approvals()?;
        let index = if let Some(id) = approval_id {
            approvals.iter().position(|a| a.approval_id == id)
        } else if let Some(task) = task_id {
            approvals.iter().position(|a| a.task_id == *task)
        } else if approvals.len() == 1 {
            Some(0)
        } else {
            None
        };
        let Some(index) = index else {
            return Ok(None);
        };
        let approval = approvals.remove(index);
        self.save_approvals(&approvals)?;
        Ok(Some(approval))
    }

    // -- auth, rate limiting, history --

    fn authorized(&self, chat_id: i64) -> bool {
        self.policy.allowlist.contains(&chat_id)
    }

    fn rate_ok(&self, chat_id: i64) -> bool {
        let now_ms = self.clock.now_ms();
        let mut rate = self.rate.lock();
        let bucket = rate.entry(chat_id).or_default();

        if now_ms.saturating_sub(bucket.minute_start_ms) >= 60_000 {
            bucket.minute_start_ms = now_ms;
            bucket.minute_count = 0;
        }
        if now_ms.saturating_sub(bucket.hour_start_ms) >= 3_600_000 {
            bucket.hour_start_ms = now_ms;
            bucket.hour_count = 0;
        }
        if bucket.minute_count >= self.policy.rate_per_minute
            || bucket.hour_count >= self.policy.rate_per_hour
        {
            return false;
        }
        bucket.minute_count += 1;
        bucket.hour_count += 1;
        true
    }

    fn record_history(&self, chat_id: i64, from_human: bool, text: &str) -> Result<(), EngineError> {
        let path = self.layout.channel_history_file();
        let mut history: HashMap<String, Vec<HistoryTurn>> =
            fsutil::read_json(&path)?.unwrap_or_default();
        let turns = history.entry(chat_id.to_string()).or_default();
        let capped: String = text.chars().take(self.policy.history_char_cap).collect();
        turns.push(HistoryTurn {
            from_human,
            text: capped,
            ts_ms: self.clock.now_ms(),
        });
        let excess = turns.len().saturating_sub(self.policy.max_history_turns);
        if excess > 0 {
            turns.drain(..excess);
        }
        fsutil::write_json_atomic(&path, &history)?;
        Ok(())
    }

    fn reply(&self, chat_id: i64, text: &str) -> Result<(), EngineError> {
        self.channel.send_text(chat_id, text, self.clock.now_ms())?;
        self.record_history(chat_id, false, text)?;
        Ok(())
    }

    // -- dispatch --

    /// Drain the inbox and dispatch every record.
    pub async fn handle_inbound(&self) -> Result<u32, EngineError> {
        let records = self.channel.drain_inbound()?;
        let mut handled = 0;
        for record in records {
            self.channel.audit(&json!({
                "chat_id": record.chat_id,
                "action": record.action,
                "ts_ms": self.clock.now_ms(),
            }))?;

            if !self.authorized(record.chat_id) {
                warn!(chat_id = record.chat_id, "unauthorized channel sender");
                continue;
            }
            if !self.rate_ok(record.chat_id) {
                warn!(chat_id = record.chat_id, "rate limited");
                continue;
            }

            self.record_history(
                record.chat_id,
                true,
                record.text.as_deref().unwrap_or(&record.action),
            )?;
            if let Err(e) = self.dispatch(&record).await {
                warn!(action = record.action, error = %e, "channel action failed");
                self.reply(record.chat_id, &format!("Action failed: {e}"))?;
            }
            handled += 1;
        }
        Ok(handled)
    }

    async fn dispatch(&self, record: &InboundRecord) -> Result<(), EngineError> {
        let chat_id = record.chat_id;
        let now_ms = self.clock.now_ms();
        info!(action = record.action, chat_id, "channel action");

        match record.action.as_str() {
            "status" => self.reply(chat_id, &self.render_status()?),
            "ps" => {
                let sessions = self.registry.get_active_sessions(None)?;
                if sessions.is_empty() {
                    self.reply(chat_id, "No active agents")
                } else {
                    let lines: Vec<String> = sessions
                        .iter()
                        .map(|s| format!("{} [{}] {}", s.agent_name, s.role, s.id))
                        .collect();
                    self.reply(chat_id, &lines.join("\n"))
                }
            }
            "approve" | "reject" => {
                let approving = record.action == "approve";
                match self.take_approval(
                    record.approval_id.as_deref(),
                    record.task_id.as_deref(),
                )? {
                    Some(approval) => {
                        let topic = if approving { "plan.approved" } else { "plan.rejected" };
                        self.bus.send_broadcast(
                            &self.pm_session,
                            topic,
                            json!({ "task_id": approval.task_id }),
                            now_ms,
                        )?;
                        self.reply(
                            chat_id,
                            &format!(
                                "{} {}",
                                if approving { "Approved" } else { "Rejected" },
                                approval.task_id
                            ),
                        )
                    }
                    None => self.reply(chat_id, "No matching pending approval"),
                }
            }
            "approve_escalation" | "reject_escalation" => {
                let approving = record.action == "approve_escalation";
                match self.take_approval(record.approval_id.as_deref(), None)? {
                    Some(approval) => {
                        self.bus.send_broadcast(
                            &self.pm_session,
                            if approving {
                                "escalation.approved"
                            } else {
                                "escalation.rejected"
                            },
                            json!({ "task_id": approval.task_id, "approval_id": approval.approval_id }),
                            now_ms,
                        )?;
                        self.reply(chat_id, &format!("Escalation {} resolved", approval.approval_id))
                    }
                    None => self.reply(chat_id, "Approval expired or not found"),
                }
            }
            "idea" => match record.text.as_deref().filter(|t| !t.trim().is_empty()) {
                Some(text) => {
                    let id = self
                        .tracker
                        .create(text, "Filed from the external channel.", &["idea".to_string()])
                        .await?;
                    self.reply(chat_id, &format!("Filed as {id}"))
                }
                None => self.reply(chat_id, "Please include the idea text"),
            },
            "pause_all" | "resume" => {
                let topic = if record.action == "pause_all" {
                    "admin.pause"
                } else {
                    "admin.resume"
                };
                match record.scope.as_deref().and_then(Role::parse) {
                    Some(role) => {
                        self.bus
                            .send_to_role(&self.pm_session, role, topic, json!({}), now_ms)?;
                    }
                    None => {
                        self.bus
                            .send_broadcast(&self.pm_session, topic, json!({}), now_ms)?;
                    }
                }
                self.reply(chat_id, &format!("Sent {topic}"))
            }
            "kill_agent" => match self.find_session(record.agent.as_deref())? {
                Some(session_id) => {
                    self.claims.release(&session_id)?;
                    self.registry.end_session(&session_id, "killed_by_operator")?;
                    self.reply(chat_id, &format!("Ended {session_id}"))
                }
                None => self.reply(chat_id, "No such agent"),
            },
            "logs" => {
                let task = record.task_id.as_deref().map(TaskId::new);
                let tail = self.events.tail(20, task.as_ref())?;
                if tail.is_empty() {
                    self.reply(chat_id, "No matching log entries")
                } else {
                    let lines: Vec<String> = tail.iter().map(|v| v.to_string()).collect();
                    self.reply(chat_id, &lines.join("\n"))
                }
            }
            "lockdown" => {
                self.bus
                    .send_broadcast(&self.pm_session, "admin.lockdown", json!({}), now_ms)?;
                self.reply(chat_id, "Lockdown broadcast; all agents will halt")
            }
            "budget" => self.reply(chat_id, &self.render_budget()?),
            "morning_report" => self.reply(chat_id, &self.render_morning_report()?),
            unknown => self.reply(chat_id, &format!("Unknown action: {unknown}")),
        }
    }

    fn find_session(&self, agent: Option<&str>) -> Result<Option<SessionId>, EngineError> {
        let Some(agent) = agent else {
            return Ok(None);
        };
        Ok(self
            .registry
            .get_active_sessions(None)?
            .into_iter()
            .find(|s| s.agent_name == agent || s.id == *agent)
            .map(|s| s.id))
    }

    // -- renderers --

    fn render_status(&self) -> Result<String, EngineError> {
        let sessions = self.registry.get_active_sessions(None)?;
        if sessions.is_empty() {
            return Ok("No active sessions".to_string());
        }
        let mut lines = Vec::new();
        for session in sessions {
            let task = session
                .claimed_task
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "idle".to_string());
            lines.push(format!(
                "{} [{}] {} - {}",
                session.agent_name, session.role, session.id, task
            ));
        }
        Ok(lines.join("\n"))
    }

    fn render_budget(&self) -> Result<String, EngineError> {
        let today = self.clock.today();
        let daily = self.budget.ledger().daily_cost(&today)?;
        let mut lines = vec![format!(
            "Tokens today ({}): {}",
            today, daily.total_tokens
        )];
        for session in self.registry.get_active_sessions(None)? {
            let cost = self.budget.ledger().agent_cost(&session.id)?;
            lines.push(format!(
                "{}: {} today / {} lifetime",
                session.agent_name,
                cost.today_tokens_on(&today),
                cost.total_tokens
            ));
        }
        Ok(lines.join("\n"))
    }

    fn render_morning_report(&self) -> Result<String, EngineError> {
        let mut lines = vec!["Morning report".to_string()];
        lines.push(self.render_status()?);
        lines.push(self.render_budget()?);
        let dlq_depth = self.bus.acks().dlq()?.len();
        lines.push(format!("Dead-letter queue depth: {dlq_depth}"));
        let working = self
            .board
            .board()?
            .into_iter()
            .filter(|(_, p)| p.task_id.is_some())
            .count();
        lines.push(format!("Agents mid-task: {working}"));
        Ok(lines.join("\n\n"))
    }
}

/// Opaque approval id.
fn uuid_like() -> String {
    format!("ap-{}", uuid::Uuid::new_v4())
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
