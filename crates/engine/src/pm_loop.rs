// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PM supervisory loop.
//!
//! Cooperative, single-threaded periodic scans, each gated by its own
//! minimum interval: health (idle nudges), cost (warn/halt), drift,
//! recovery (stale sessions → recovery engine), ACK timeouts, PR status
//! (optional collaborator), and the external channel. A scan failure is
//! converted into a report entry and never aborts the loop.

use crate::budget::{BudgetEnforcer, BudgetStatus};
use crate::channel::ConversationHandler;
use crate::claims::ClaimService;
use crate::decompose::{decompose_task, subtask_drafts};
use crate::error::EngineError;
use crate::recovery::{RecoveryEngine, RecoveryStrategy};
use crate::registry::SessionRegistry;
use crate::scheduler::{AgentSnapshot, Scheduler, SchedulerInputs};
use crate::worktree::WorktreeManager;
use pilot_adapters::IssueTracker;
use pilot_core::{Clock, MessageDraft, MessageType, PmPolicy, Priority, SessionId, TaskStatus};
use pilot_storage::{ContextBoard, MessageBus};
use std::path::PathBuf;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Optional PR-automation collaborator.
#[async_trait::async_trait]
pub trait PrStatusSource: Send + Sync {
    /// Refresh cached PR states, returning `(branch, state)` pairs.
    async fn refresh(&self) -> Result<Vec<(String, String)>, String>;
}

/// Outcome of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub scan: &'static str,
    pub detail: String,
    pub ok: bool,
}

impl ScanReport {
    fn ok(scan: &'static str, detail: impl Into<String>) -> Self {
        Self {
            scan,
            detail: detail.into(),
            ok: true,
        }
    }

    fn failed(scan: &'static str, error: impl std::fmt::Display) -> Self {
        Self {
            scan,
            detail: error.to_string(),
            ok: false,
        }
    }
}

/// The supervisory loop.
pub struct PmLoop {
    session_id: SessionId,
    registry: Arc<SessionRegistry>,
    claims: Arc<ClaimService>,
    worktrees: Arc<WorktreeManager>,
    bus: Arc<MessageBus>,
    budget: Arc<BudgetEnforcer>,
    recovery: Arc<RecoveryEngine>,
    conversation: Arc<ConversationHandler>,
    board: ContextBoard,
    tracker: Arc<dyn IssueTracker>,
    scheduler: Scheduler,
    /// Repository root used by the import-graph analyzer.
    project_root: PathBuf,
    pr_source: Option<Arc<dyn PrStatusSource>>,
    clock: Arc<dyn Clock>,
    policy: PmPolicy,
    last_run_ms: HashMap<&'static str, u64>,
    running: Arc<AtomicBool>,
}

impl PmLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: SessionId,
        registry: Arc<SessionRegistry>,
        claims: Arc<ClaimService>,
        worktrees: Arc<WorktreeManager>,
        bus: Arc<MessageBus>,
        budget: Arc<BudgetEnforcer>,
        recovery: Arc<RecoveryEngine>,
        conversation: Arc<ConversationHandler>,
        board: ContextBoard,
        tracker: Arc<dyn IssueTracker>,
        scheduler: Scheduler,
        project_root: PathBuf,
        pr_source: Option<Arc<dyn PrStatusSource>>,
        clock: Arc<dyn Clock>,
        policy: PmPolicy,
    ) -> Self {
        Self {
            session_id,
            registry,
            claims,
            worktrees,
            bus,
            budget,
            recovery,
            conversation,
            board,
            tracker,
            scheduler,
            project_root,
            pr_source,
            clock,
            policy,
            last_run_ms: HashMap::new(),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self, reason: &str) {
        info!(reason, "pm loop stopping");
        self.running.store(false, Ordering::SeqCst);
    }

    fn due(&mut self, scan: &'static str, interval_ms: u64) -> bool {
        let now_ms = self.clock.now_ms();
        let last = self.last_run_ms.get(scan).copied().unwrap_or(0);
        if last != 0 && now_ms.saturating_sub(last) < interval_ms {
            return false;
        }
        self.last_run_ms.insert(scan, now_ms);
        true
    }

    /// Run every due scan once, returning their aggregate results.
    pub async fn run_periodic_scans(&mut self) -> Vec<ScanReport> {
        let mut reports = Vec::new();

        if self.due("health", self.policy.health_scan_interval_ms) {
            reports.push(match self.health_scan() {
                Ok(report) => report,
                Err(e) => ScanReport::failed("health", e),
            });
        }
        if self.due("cost", self.policy.cost_scan_interval_ms) {
            reports.push(match self.cost_scan() {
                Ok(report) => report,
                Err(e) => ScanReport::failed("cost", e),
            });
        }
        if self.due("drift", self.policy.drift_scan_interval_ms) {
            reports.push(match self.drift_scan() {
                Ok(report) => report,
                Err(e) => ScanReport::failed("drift", e),
            });
        }
        if self.due("recovery", self.policy.recovery_scan_interval_ms) {
            reports.push(match self.recovery_scan().await {
                Ok(report) => report,
                Err(e) => ScanReport::failed("recovery", e),
            });
        }
        if self.due("dispatch", self.policy.dispatch_scan_interval_ms) {
            reports.push(match self.dispatch_scan().await {
                Ok(report) => report,
                Err(e) => ScanReport::failed("dispatch", e),
            });
        }
        if self.due("acks", self.policy.recovery_scan_interval_ms) {
            reports.push(match self.ack_scan() {
                Ok(report) => report,
                Err(e) => ScanReport::failed("acks", e),
            });
        }
        if self.pr_source.is_some() && self.due("pr", self.policy.pr_scan_interval_ms) {
            reports.push(match self.pr_scan().await {
                Ok(report) => report,
                Err(e) => ScanReport::failed("pr", e),
            });
        }
        if self.due("channel", self.policy.channel_scan_interval_ms) {
            reports.push(match self.channel_scan().await {
                Ok(report) => report,
                Err(e) => ScanReport::failed("channel", e),
            });
        }

        reports
    }

    /// Nudge live sessions that have sat idle (no claim) too long.
    fn health_scan(&self) -> Result<ScanReport, EngineError> {
        let now_ms = self.clock.now_ms();
        let mut nudged = 0;
        for session in self.registry.get_active_sessions(Some(&self.session_id))? {
            if session.claimed_task.is_some() {
                continue;
            }
            let idle_since = session.claimed_at_ms.unwrap_or(session.created_at_ms);
            if now_ms.saturating_sub(idle_since) < self.policy.idle_nudge_after_ms {
                continue;
            }
            self.bus.send(
                MessageDraft::new(
                    self.session_id.clone(),
                    MessageType::Notify,
                    "nudge.idle",
                    json!({ "reason": "no task claimed" }),
                )
                .to_session(&session.id),
                now_ms,
            )?;
            nudged += 1;
        }
        Ok(ScanReport::ok("health", format!("nudged {nudged}")))
    }

    /// Budget sweep: warnings notify, exceeded halts.
    fn cost_scan(&self) -> Result<ScanReport, EngineError> {
        let now_ms = self.clock.now_ms();
        let mut warned = 0;
        let mut halted = 0;
        for session in self.registry.get_active_sessions(Some(&self.session_id))? {
            let verdict = self
                .budget
                .check_budget(&session.id, session.claimed_task.as_ref())?;
            match verdict.status {
                BudgetStatus::Ok => {}
                BudgetStatus::Warning => {
                    self.bus.send(
                        MessageDraft::new(
                            self.session_id.clone(),
                            MessageType::Notify,
                            "budget.warning",
                            json!({ "reason": verdict.reason }),
                        )
                        .to_session(&session.id),
                        now_ms,
                    )?;
                    warned += 1;
                }
                BudgetStatus::Exceeded => {
                    self.bus.send(
                        MessageDraft::new(
                            self.session_id.clone(),
                            MessageType::Request,
                            "budget.halt",
                            json!({ "reason": verdict.reason, "fatal": verdict.fatal }),
                        )
                        .to_session(&session.id)
                        .priority(Priority::Blocking),
                        now_ms,
                    )?;
                    halted += 1;
                }
            }
        }
        Ok(ScanReport::ok(
            "cost",
            format!("warned {warned}, halted {halted}"),
        ))
    }

    /// Escalate agents editing outside the areas they locked.
    fn drift_scan(&self) -> Result<ScanReport, EngineError> {
        let now_ms = self.clock.now_ms();
        let mut drifted = 0;
        for session in self.registry.get_active_sessions(Some(&self.session_id))? {
            if session.locked_areas.is_empty() {
                continue;
            }
            let Some(progress) = self.board.agent(&session.id)? else {
                continue;
            };
            let map = self.claims.area_map();
            let out_of_scope: Vec<String> = progress
                .files_modified
                .iter()
                .filter(|f| {
                    map.area_for(f)
                        .map(|area| !session.locked_areas.contains(&area))
                        .unwrap_or(false)
                })
                .map(|f| f.display().to_string())
                .collect();
            if out_of_scope.is_empty() {
                continue;
            }
            warn!(session_id = %session.id, files = ?out_of_scope, "scope drift");
            self.bus.send(
                MessageDraft::new(
                    self.session_id.clone(),
                    MessageType::Notify,
                    "drift.detected",
                    json!({ "session_id": session.id, "files": out_of_scope }),
                )
                .to_session(&session.id),
                now_ms,
            )?;
            drifted += 1;
        }
        Ok(ScanReport::ok("drift", format!("flagged {drifted}")))
    }

    /// Stale-session detection and recovery dispatch.
    async fn recovery_scan(&self) -> Result<ScanReport, EngineError> {
        let cleanup = self.registry.cleanup_stale_sessions()?;
        let mut resumed = 0;
        let mut reassigned = 0;
        let mut cleaned = 0;

        for dead in &cleanup.ended {
            let assessment = self.recovery.assess_recovery(dead)?;
            match assessment.strategy {
                RecoveryStrategy::Resume => {
                    // Surface the resumable checkpoint; a fresh worker will
                    // pick it up via claim transfer.
                    if let Some((checkpoint, prompt)) =
                        self.recovery.recover_from_checkpoint(dead)?
                    {
                        self.bus.send(
                            MessageDraft::new(
                                self.session_id.clone(),
                                MessageType::Broadcast,
                                "recovery.resumable",
                                json!({
                                    "dead_session": dead,
                                    "task_id": checkpoint.task_id,
                                    "plan_step": checkpoint.plan_step,
                                    "prompt": prompt,
                                }),
                            )
                            .broadcast(),
                            self.clock.now_ms(),
                        )?;
                    }
                    resumed += 1;
                }
                RecoveryStrategy::Reassign => {
                    self.recovery.release_and_reassign(dead, &self.session_id)?;
                    reassigned += 1;
                }
                RecoveryStrategy::Cleanup => {
                    self.recovery.cleanup(dead)?;
                    cleaned += 1;
                }
            }
        }

        // Orphan worktrees whose owners are gone.
        let live: Vec<SessionId> = self
            .registry
            .get_active_sessions(None)?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let orphans = self.worktrees.gc_orphans(&live).await?;

        Ok(ScanReport::ok(
            "recovery",
            format!(
                "ended {}, resumable {resumed}, reassigned {reassigned}, cleaned {cleaned}, orphans {}",
                cleanup.ended.len(),
                orphans.len()
            ),
        ))
    }

    /// Decompose oversized pending tickets, then score and delegate the
    /// ready ones to live agents.
    async fn dispatch_scan(&self) -> Result<ScanReport, EngineError> {
        let now_ms = self.clock.now_ms();
        let today = self.clock.today();
        let mut split = 0;

        // Oversized pending tickets become subtask chains first.
        for task in self.tracker.list(TaskStatus::Pending).await? {
            let outcome = decompose_task(&task, &self.project_root);
            if !outcome.decomposed {
                continue;
            }
            for draft in subtask_drafts(&task.id, &outcome.subtasks) {
                self.tracker
                    .create(&draft.title, &draft.description, &draft.labels)
                    .await?;
            }
            self.tracker
                .update_status(&task.id, TaskStatus::Blocked)
                .await?;
            split += 1;
        }

        // Score ready work against the live agent pool.
        let mut agents = Vec::new();
        let mut task_tokens = std::collections::HashMap::new();
        for session in self.registry.get_active_sessions(Some(&self.session_id))? {
            let cost = self.budget.ledger().agent_cost(&session.id)?;
            agents.push(AgentSnapshot {
                active_tasks: u32::from(session.claimed_task.is_some()),
                today_tokens: cost.today_tokens_on(&today),
                recent_success_rate: 0.5,
                role: session.role,
                session_id: session.id,
            });
        }
        let ready: Vec<_> = self.tracker.ready().await?;
        for task in &ready {
            task_tokens.insert(
                task.id.clone(),
                self.budget.ledger().task_cost(&task.id)?.total_tokens,
            );
        }
        let unclaimed: Vec<_> = ready
            .into_iter()
            .filter(|t| {
                self.claims
                    .task_holder(&t.id)
                    .map(|h| h.is_none())
                    .unwrap_or(false)
            })
            .collect();

        let inputs = SchedulerInputs {
            agents,
            task_tokens,
        };
        let (assignments, unassigned) = self.scheduler.schedule(&unclaimed, &inputs, now_ms);
        for assignment in &assignments {
            self.bus.send(
                MessageDraft::new(
                    self.session_id.clone(),
                    MessageType::Request,
                    "task.delegated",
                    json!({ "task_id": assignment.task_id, "score": assignment.score }),
                )
                .to_session(&assignment.session_id),
                now_ms,
            )?;
        }

        Ok(ScanReport::ok(
            "dispatch",
            format!(
                "split {split}, delegated {}, unassigned {}",
                assignments.len(),
                unassigned.len()
            ),
        ))
    }

    /// Pending-ACK retry sweep.
    fn ack_scan(&self) -> Result<ScanReport, EngineError> {
        let outcomes = self.bus.process_ack_timeouts(self.clock.now_ms())?;
        Ok(ScanReport::ok("acks", format!("{} processed", outcomes.len())))
    }

    async fn pr_scan(&self) -> Result<ScanReport, EngineError> {
        let Some(source) = &self.pr_source else {
            return Ok(ScanReport::ok("pr", "no collaborator"));
        };
        match source.refresh().await {
            Ok(states) => Ok(ScanReport::ok("pr", format!("{} branches", states.len()))),
            Err(e) => Ok(ScanReport::failed("pr", e)),
        }
    }

    /// Drain the external channel and fire one approval-timeout sweep.
    async fn channel_scan(&self) -> Result<ScanReport, EngineError> {
        let handled = self.conversation.handle_inbound().await?;
        let escalated = self.conversation.scan_approval_timeouts()?;
        Ok(ScanReport::ok(
            "channel",
            format!("handled {handled}, escalated {escalated}"),
        ))
    }

    /// Run until stopped, sleeping between scan rounds.
    pub async fn run(&mut self, tick_ms: u64) -> Result<(), EngineError> {
        while self.running.load(Ordering::SeqCst) {
            let reports = self.run_periodic_scans().await;
            for report in &reports {
                if !report.ok {
                    warn!(scan = report.scan, detail = report.detail, "scan failed");
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(tick_ms)).await;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "pm_loop_tests.rs"]
mod tests;
