// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent state machine.
//!
//! `IDLE → CLAIMING → PLANNING → WAITING_APPROVAL → EXECUTING →
//! CHECKPOINTING → DONE → IDLE`, driven by a typed event queue fed from
//! the bus and a periodic tick. Step execution itself belongs to the
//! assistant; the loop coordinates through the injected [`TaskExecutor`].
//! Loop state is persisted after every transition so a crashed worker can
//! self-recover on start.

use crate::budget::BudgetEnforcer;
use crate::claims::{ClaimOutcome, ClaimService};
use crate::error::EngineError;
use crate::recovery::RecoveryEngine;
use crate::worktree::WorktreeManager;
use async_trait::async_trait;
use pilot_adapters::IssueTracker;
use pilot_core::{
    AckContract, AgentLoopPolicy, Clock, Event, MessageDraft, MessageType, Priority, Role,
    SessionId, Task, TaskId, TaskStatus,
};
use pilot_storage::{
    fsutil, AgentActivity, AgentProgress, Checkpoint, CheckpointStore, CompletedStep, ContextBoard,
    EventLog, MessageBus, ReadFilter,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Default lease for a claimed task.
const LEASE_MS: u64 = 30 * 60 * 1000;

/// Loop phases. `Stopped` is terminal until an operator restarts the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Idle,
    Claiming,
    Planning,
    WaitingApproval,
    Executing,
    Checkpointing,
    Done,
    Stopped,
}

/// Persisted loop state for self-recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLoopState {
    pub phase: LoopPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub plan: Vec<String>,
    #[serde(default)]
    pub plan_step: u32,
    #[serde(default)]
    pub consecutive_errors: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_deadline_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub updated_at_ms: u64,
}

impl Default for AgentLoopState {
    fn default() -> Self {
        Self {
            phase: LoopPhase::Idle,
            task_id: None,
            plan: Vec::new(),
            plan_step: 0,
            consecutive_errors: 0,
            approval_deadline_ms: None,
            stop_reason: None,
            updated_at_ms: 0,
        }
    }
}

/// Typed events consumed by the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    TaskDelegated { task_id: TaskId },
    PlanApproved { task_id: TaskId },
    PlanRejected { task_id: TaskId, feedback: String },
    Lockdown,
    Tick,
}

impl WireEvent {
    /// Map a bus message to a wire event, when it is one the loop handles.
    pub fn from_topic(topic: &str, payload: &serde_json::Value) -> Option<WireEvent> {
        let task_id = payload
            .get("task_id")
            .and_then(|v| v.as_str())
            .map(TaskId::new);
        match topic {
            "task.delegated" => Some(WireEvent::TaskDelegated { task_id: task_id? }),
            "plan.approved" => Some(WireEvent::PlanApproved { task_id: task_id? }),
            "plan.rejected" => Some(WireEvent::PlanRejected {
                task_id: task_id?,
                feedback: payload
                    .get("feedback")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            }),
            "admin.lockdown" => Some(WireEvent::Lockdown),
            _ => None,
        }
    }
}

/// One executed step as reported by the assistant side.
///
/// Everything the checkpoint data model needs must flow through here:
/// the loop itself never sees inside the assistant, so a field the
/// executor cannot report is a field every checkpoint ships empty.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub outcome: StepOutcome,
    pub description: String,
    /// Outcome text recorded against the completed step.
    pub result: String,
    /// Decisions worth surviving a cold resume.
    pub decisions: Vec<String>,
    /// Findings worth surviving a cold resume.
    pub findings: Vec<String>,
    /// Free-form working context; a non-empty value replaces the
    /// previous one.
    pub context: String,
    /// Files touched during this step.
    pub files_touched: Vec<std::path::PathBuf>,
    pub output_bytes: u64,
    /// Tool calls spent on this step.
    pub tool_calls: u32,
    /// Context pressure after this step, percent.
    pub pressure_pct: u8,
}

impl StepReport {
    /// Bare report; callers fill in whatever else the step produced.
    pub fn new(outcome: StepOutcome, description: impl Into<String>) -> Self {
        Self {
            outcome,
            description: description.into(),
            result: String::new(),
            decisions: Vec::new(),
            findings: Vec::new(),
            context: String::new(),
            files_touched: Vec::new(),
            output_bytes: 0,
            tool_calls: 1,
            pressure_pct: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    /// The plan is finished; the task is done.
    TaskComplete,
    Error(String),
}

/// Planning and step execution, performed by the assistant runtime.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Produce an ordered plan for the task.
    async fn plan(&self, task: &Task) -> Result<Vec<String>, String>;

    /// Execute one plan step.
    async fn run_step(&self, task: &Task, step: u32) -> StepReport;
}

/// Collaborators the loop is constructed with.
pub struct AgentLoopDeps {
    pub claims: Arc<ClaimService>,
    pub worktrees: Arc<WorktreeManager>,
    pub bus: Arc<MessageBus>,
    pub tracker: Arc<dyn IssueTracker>,
    pub checkpoints: CheckpointStore,
    pub budget: Arc<BudgetEnforcer>,
    pub board: ContextBoard,
    pub recovery: Arc<RecoveryEngine>,
    pub events: EventLog,
    pub executor: Arc<dyn TaskExecutor>,
    /// Semantic merge resolver consulted when policy enables
    /// auto-resolution. The default collaborator escalates everything.
    pub resolver: Arc<dyn crate::worktree::MergeResolver>,
    pub clock: Arc<dyn Clock>,
    pub policy: AgentLoopPolicy,
}

/// The per-worker loop.
pub struct AgentLoop {
    session_id: SessionId,
    role: Role,
    deps: AgentLoopDeps,
    state: AgentLoopState,
    current_task: Option<Task>,
    files_modified: Vec<std::path::PathBuf>,
    completed: Vec<CompletedStep>,
    decisions: Vec<String>,
    findings: Vec<String>,
    current_context: String,
    tool_calls: u32,
    output_bytes: u64,
    running: Arc<AtomicBool>,
}

impl AgentLoop {
    pub fn new(session_id: SessionId, role: Role, deps: AgentLoopDeps) -> Self {
        Self {
            session_id,
            role,
            deps,
            state: AgentLoopState::default(),
            current_task: None,
            files_modified: Vec::new(),
            completed: Vec::new(),
            decisions: Vec::new(),
            findings: Vec::new(),
            current_context: String::new(),
            tool_calls: 0,
            output_bytes: 0,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.state.phase
    }

    pub fn state(&self) -> &AgentLoopState {
        &self.state
    }

    /// Handle for cooperative cancellation.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&mut self, reason: &str) {
        self.running.store(false, Ordering::SeqCst);
        self.state.phase = LoopPhase::Stopped;
        self.state.stop_reason = Some(reason.to_string());
        let _ = self.persist();
    }

    fn persist(&self) -> Result<(), EngineError> {
        let path = self
            .deps
            .claims
            .layout()
            .loop_state_file(&self.session_id);
        let mut state = self.state.clone();
        state.updated_at_ms = self.deps.clock.now_ms();
        fsutil::write_json_atomic(&path, &state)?;
        Ok(())
    }

    fn set_phase(&mut self, phase: LoopPhase) -> Result<(), EngineError> {
        self.state.phase = phase;
        self.persist()
    }

    /// Self-recovery on start: a non-terminal persisted phase means the
    /// previous incarnation died mid-task. Resume from the checkpoint when
    /// one exists; otherwise release any held claim and go idle.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        let path = self
            .deps
            .claims
            .layout()
            .loop_state_file(&self.session_id);
        let previous: Option<AgentLoopState> = fsutil::read_json(&path)?;

        let Some(previous) = previous else {
            return self.set_phase(LoopPhase::Idle);
        };
        match previous.phase {
            LoopPhase::Idle | LoopPhase::Done | LoopPhase::Stopped => {
                self.set_phase(LoopPhase::Idle)
            }
            _ => {
                if let Some((checkpoint, _prompt)) = self
                    .deps
                    .recovery
                    .recover_from_checkpoint(&self.session_id)?
                {
                    if let Some(task_id) = checkpoint.task_id.clone() {
                        info!(session_id = %self.session_id, task_id = %task_id, step = checkpoint.plan_step, "resuming from checkpoint");
                        self.state = AgentLoopState {
                            phase: LoopPhase::Executing,
                            task_id: Some(task_id.clone()),
                            plan: Vec::new(),
                            plan_step: checkpoint.plan_step,
                            ..AgentLoopState::default()
                        };
                        self.current_task = Some(Task::new(task_id, checkpoint.task_title));
                        return self.persist();
                    }
                }
                warn!(session_id = %self.session_id, "no checkpoint; releasing claim");
                self.deps.claims.release(&self.session_id)?;
                self.state = AgentLoopState::default();
                self.persist()
            }
        }
    }

    /// Drain bus messages into wire events plus a trailing tick.
    pub fn poll_events(&self) -> Result<Vec<WireEvent>, EngineError> {
        let filter = ReadFilter {
            role: Some(self.role),
            agent_name: None,
        };
        let now_ms = self.deps.clock.now_ms();
        let batch = self.deps.bus.read_for(&self.session_id, &filter, now_ms)?;
        let mut events: Vec<WireEvent> = batch
            .iter()
            .filter_map(|m| WireEvent::from_topic(&m.topic, &m.payload))
            .collect();
        events.push(WireEvent::Tick);
        Ok(events)
    }

    /// Feed one event through the state machine.
    pub async fn handle_event(&mut self, event: WireEvent) -> Result<(), EngineError> {
        if self.state.phase == LoopPhase::Stopped {
            return Ok(());
        }
        if event == WireEvent::Lockdown {
            self.stop("admin_lockdown");
            return Ok(());
        }

        match self.state.phase {
            LoopPhase::Idle => self.on_idle(event).await,
            LoopPhase::Claiming => Ok(()),
            LoopPhase::Planning => self.on_planning().await,
            LoopPhase::WaitingApproval => self.on_waiting(event).await,
            LoopPhase::Executing | LoopPhase::Checkpointing => self.on_executing().await,
            LoopPhase::Done => self.on_done().await,
            LoopPhase::Stopped => Ok(()),
        }
    }

    async fn on_idle(&mut self, event: WireEvent) -> Result<(), EngineError> {
        let task = match event {
            WireEvent::TaskDelegated { task_id } => self.fetch_task(&task_id).await?,
            WireEvent::Tick => {
                // Periodic scan for unclaimed ready work.
                let mut found = None;
                for candidate in self.deps.tracker.ready().await? {
                    if self.deps.claims.task_holder(&candidate.id)?.is_none() {
                        found = Some(candidate);
                        break;
                    }
                }
                found
            }
            _ => None,
        };
        let Some(task) = task else {
            self.publish_progress(AgentActivity::Idle)?;
            return Ok(());
        };

        self.set_phase(LoopPhase::Claiming)?;
        match self.deps.claims.claim(&self.session_id, &task.id, LEASE_MS)? {
            ClaimOutcome::Granted => {
                self.deps
                    .tracker
                    .update_status(&task.id, TaskStatus::InProgress)
                    .await?;
                let worktree = self
                    .deps
                    .worktrees
                    .create(&task.id, &self.session_id)
                    .await?;
                self.deps
                    .claims
                    .record_worktree(&self.session_id, worktree)?;
                self.state.task_id = Some(task.id.clone());
                self.current_task = Some(task);
                self.completed.clear();
                self.files_modified.clear();
                self.decisions.clear();
                self.findings.clear();
                self.current_context.clear();
                self.tool_calls = 0;
                self.output_bytes = 0;
                self.state.plan_step = 0;
                self.set_phase(LoopPhase::Planning)?;
                // Claiming flows straight into planning.
                self.on_planning().await
            }
            ClaimOutcome::Denied { existing } => {
                info!(task_id = %task.id, holder = %existing.session_id, "claim lost");
                self.set_phase(LoopPhase::Idle)
            }
        }
    }

    async fn on_planning(&mut self) -> Result<(), EngineError> {
        let Some(task) = self.current_task.clone() else {
            return self.set_phase(LoopPhase::Idle);
        };
        match self.deps.executor.plan(&task).await {
            Ok(plan) => {
                self.state.plan = plan;
                let deadline_ms = self.deps.policy.approval_timeout_ms;
                let now_ms = self.deps.clock.now_ms();
                self.deps.bus.send(
                    MessageDraft::new(
                        self.session_id.clone(),
                        MessageType::Request,
                        "plan.approval_request",
                        json!({ "task_id": task.id, "plan": self.state.plan }),
                    )
                    .to_role(Role::Pm)
                    .ack(AckContract::required(deadline_ms)),
                    now_ms,
                )?;
                self.state.approval_deadline_ms = Some(now_ms + deadline_ms);
                self.set_phase(LoopPhase::WaitingApproval)
            }
            Err(e) => self.note_error(&e).await,
        }
    }

    async fn on_waiting(&mut self, event: WireEvent) -> Result<(), EngineError> {
        match event {
            WireEvent::PlanApproved { task_id }
                if Some(&task_id) == self.state.task_id.as_ref() =>
            {
                self.state.approval_deadline_ms = None;
                self.set_phase(LoopPhase::Executing)
            }
            WireEvent::PlanRejected { task_id, feedback }
                if Some(&task_id) == self.state.task_id.as_ref() =>
            {
                info!(task_id = %task_id, feedback, "plan rejected; re-planning");
                self.set_phase(LoopPhase::Planning)
            }
            WireEvent::Tick => {
                let now_ms = self.deps.clock.now_ms();
                let expired = self
                    .state
                    .approval_deadline_ms
                    .is_some_and(|deadline| now_ms >= deadline);
                if !expired {
                    return Ok(());
                }
                if self.deps.policy.auto_plan_on_timeout {
                    info!(session_id = %self.session_id, "approval timed out; auto-proceeding");
                    self.state.approval_deadline_ms = None;
                    self.set_phase(LoopPhase::Executing)?;
                    self.on_executing().await
                } else {
                    self.deps.bus.send(
                        MessageDraft::new(
                            self.session_id.clone(),
                            MessageType::Request,
                            "plan.approval_overdue",
                            json!({ "task_id": self.state.task_id }),
                        )
                        .to_role(Role::Pm)
                        .priority(Priority::Blocking)
                        .escalate_to_pm(),
                        now_ms,
                    )?;
                    // Re-arm so the escalation fires once per deadline.
                    self.state.approval_deadline_ms =
                        Some(now_ms + self.deps.policy.approval_timeout_ms);
                    self.persist()
                }
            }
            _ => Ok(()),
        }
    }

    async fn on_executing(&mut self) -> Result<(), EngineError> {
        let Some(task) = self.current_task.clone() else {
            return self.set_phase(LoopPhase::Idle);
        };
        self.publish_progress(AgentActivity::Working)?;

        for _ in 0..self.deps.policy.max_consecutive_exec_steps {
            let verdict = self
                .deps
                .budget
                .check_budget(&self.session_id, Some(&task.id))?;
            if verdict.fatal {
                warn!(task_id = %task.id, reason = verdict.reason, "budget exceeded; stopping");
                self.finish_task("budget_exceeded").await?;
                return Ok(());
            }

            let report = self.deps.executor.run_step(&task, self.state.plan_step).await;
            self.deps.budget.ledger().record_task_cost(
                &self.session_id,
                &task.id,
                report.output_bytes,
                &self.deps.clock.today(),
            )?;
            self.absorb_report(&report);

            match report.outcome {
                StepOutcome::Completed => {
                    self.state.consecutive_errors = 0;
                    self.state.plan_step += 1;
                    self.completed.push(CompletedStep {
                        description: report.description.clone(),
                        result: report.result.clone(),
                    });
                }
                StepOutcome::TaskComplete => {
                    self.state.consecutive_errors = 0;
                    self.finish_task("completed").await?;
                    return Ok(());
                }
                StepOutcome::Error(message) => {
                    return self.note_error(&message).await;
                }
            }

            if report.pressure_pct >= self.deps.policy.checkpoint_at_pressure_pct {
                self.set_phase(LoopPhase::Checkpointing)?;
                self.save_checkpoint(&task)?;
                self.set_phase(LoopPhase::Executing)?;
                return Ok(());
            }
        }
        self.persist()
    }

    async fn on_done(&mut self) -> Result<(), EngineError> {
        self.set_phase(LoopPhase::Idle)
    }

    /// Complete (or abort) the current task: close it, merge, release,
    /// notify.
    async fn finish_task(&mut self, reason: &str) -> Result<(), EngineError> {
        let Some(task) = self.current_task.take() else {
            return self.set_phase(LoopPhase::Idle);
        };
        self.set_phase(LoopPhase::Done)?;

        if reason == "completed" {
            self.deps.tracker.close(&task.id).await?;
            let merge = self
                .deps
                .worktrees
                .merge(
                    &task.id,
                    &format!("{}: {}", task.id, task.title),
                    self.deps.resolver.as_ref(),
                )
                .await?;
            if let crate::worktree::MergeOutcome::Conflicts(files) = merge {
                self.deps.bus.send(
                    MessageDraft::new(
                        self.session_id.clone(),
                        MessageType::Request,
                        "recovery.merge_conflict",
                        json!({ "task_id": task.id, "conflicts": files }),
                    )
                    .to_role(Role::Pm)
                    .priority(Priority::Blocking),
                    self.deps.clock.now_ms(),
                )?;
            }
            self.deps.worktrees.remove(&task.id).await?;
        }

        self.deps.claims.release(&self.session_id)?;
        self.deps.bus.notify_task_complete(
            &self.session_id,
            &task.id,
            json!({ "reason": reason }),
            self.deps.clock.now_ms(),
        )?;
        self.deps.checkpoints.delete(&self.session_id)?;

        if reason == "budget_exceeded" {
            self.stop(reason);
            return Ok(());
        }
        self.state.task_id = None;
        self.state.plan.clear();
        self.state.plan_step = 0;
        self.set_phase(LoopPhase::Idle)
    }

    /// Count an error; past the limit, try diagnosis and either retry with
    /// the known fix or escalate and stop.
    async fn note_error(&mut self, message: &str) -> Result<(), EngineError> {
        self.state.consecutive_errors += 1;
        warn!(session_id = %self.session_id, errors = self.state.consecutive_errors, message, "step error");

        if self.state.consecutive_errors < self.deps.policy.max_errors {
            return self.persist();
        }

        let session = self
            .deps
            .claims
            .session(&self.session_id)?
            .ok_or_else(|| EngineError::UnknownSession(self.session_id.to_string()))?;
        match self.deps.recovery.recover_test_failure(&session, message)? {
            crate::recovery::TestFailureOutcome::KnownResolution { resolution, .. } => {
                info!(resolution, "known failure pattern; retrying with hint");
                self.state.consecutive_errors = 0;
                self.persist()
            }
            crate::recovery::TestFailureOutcome::Escalated { pattern } => {
                self.deps.bus.send(
                    MessageDraft::new(
                        self.session_id.clone(),
                        MessageType::Request,
                        "agent.errors_exhausted",
                        json!({ "task_id": self.state.task_id, "pattern": pattern }),
                    )
                    .to_role(Role::Pm)
                    .priority(Priority::Blocking)
                    .escalate_to_pm(),
                    self.deps.clock.now_ms(),
                )?;
                self.stop("max_errors_exceeded");
                Ok(())
            }
        }
    }

    /// Fold one step report into the working state the checkpoint snapshots.
    fn absorb_report(&mut self, report: &StepReport) {
        self.tool_calls += report.tool_calls;
        self.output_bytes += report.output_bytes;
        self.decisions.extend(report.decisions.iter().cloned());
        self.findings.extend(report.findings.iter().cloned());
        if !report.context.is_empty() {
            self.current_context = report.context.clone();
        }
        for file in &report.files_touched {
            if !self.files_modified.contains(file) {
                self.files_modified.push(file.clone());
            }
        }
    }

    fn save_checkpoint(&self, task: &Task) -> Result<(), EngineError> {
        let version = self.deps.checkpoints.save(
            &self.session_id,
            Checkpoint {
                task_id: Some(task.id.clone()),
                task_title: task.title.clone(),
                plan_step: self.state.plan_step,
                total_steps: self.state.plan.len() as u32,
                completed_steps: self.completed.clone(),
                key_decisions: self.decisions.clone(),
                files_modified: self.files_modified.clone(),
                current_context: self.current_context.clone(),
                important_findings: self.findings.clone(),
                tool_call_count: self.tool_calls,
                output_bytes: self.output_bytes,
                ..Checkpoint::default()
            },
            self.deps.clock.now_ms(),
        )?;
        self.deps.events.append(
            &Event::CheckpointSaved {
                session_id: self.session_id.clone(),
                version,
            },
            self.deps.clock.now(),
        )?;
        Ok(())
    }

    fn publish_progress(&self, status: AgentActivity) -> Result<(), EngineError> {
        self.deps.board.publish(
            &self.session_id,
            AgentProgress {
                task_id: self.state.task_id.clone(),
                task_title: self
                    .current_task
                    .as_ref()
                    .map(|t| t.title.clone())
                    .unwrap_or_default(),
                step: self.state.plan_step,
                total_steps: self.state.plan.len() as u32,
                status,
                files_modified: self.files_modified.clone(),
                updated_at_ms: self.deps.clock.now_ms(),
            },
        )?;
        Ok(())
    }

    async fn fetch_task(&self, task_id: &TaskId) -> Result<Option<Task>, EngineError> {
        for status in [TaskStatus::Ready, TaskStatus::Pending] {
            if let Some(task) = self
                .deps
                .tracker
                .list(status)
                .await?
                .into_iter()
                .find(|t| &t.id == task_id)
            {
                return Ok(Some(task));
            }
        }
        Ok(None)
    }

    /// Run the poller: two sleep rates, active while mid-task, idle
    /// otherwise. Cancellation is cooperative via the running flag.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        self.start().await?;
        while self.running.load(Ordering::SeqCst) {
            for event in self.poll_events()? {
                self.handle_event(event).await?;
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }
            }
            let sleep_ms = if self.state.phase == LoopPhase::Idle {
                self.deps.policy.poll_idle_ms
            } else {
                self.deps.policy.poll_active_ms
            };
            tokio::time::sleep(std::time::Duration::from_millis(sleep_ms)).await;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "agent_loop_tests.rs"]
mod tests;
