// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::claims::ClaimService;
use crate::recovery::RecoveryEngine;
use crate::worktree::{MergeResolver, NeverResolve, Resolution, WorktreeManager};
use parking_lot::Mutex;
use pilot_adapters::{FakeGit, FakeProbe, FakeTracker};
use pilot_core::test_support::ready_task;
use pilot_core::{
    AreaMap, BudgetLimits, BudgetPolicy, EnforcementMode, FakeClock, Policy, SessionState,
    WorktreePolicy,
};
use pilot_storage::{CostLedger, RoleMemory, SessionStore, StateLayout};
use std::collections::VecDeque;
use std::path::PathBuf;
use tempfile::tempdir;

struct FakeExecutor {
    plan: Vec<String>,
    reports: Mutex<VecDeque<StepReport>>,
}

impl FakeExecutor {
    fn new(plan: &[&str], reports: Vec<StepReport>) -> Arc<Self> {
        Arc::new(Self {
            plan: plan.iter().map(|s| s.to_string()).collect(),
            reports: Mutex::new(reports.into()),
        })
    }
}

#[async_trait]
impl TaskExecutor for FakeExecutor {
    async fn plan(&self, _task: &Task) -> Result<Vec<String>, String> {
        if self.plan.is_empty() {
            return Err("planner unavailable".to_string());
        }
        Ok(self.plan.clone())
    }

    async fn run_step(&self, _task: &Task, _step: u32) -> StepReport {
        self.reports.lock().pop_front().unwrap_or_else(|| {
            let mut report = StepReport::new(StepOutcome::TaskComplete, "wrap up");
            report.output_bytes = 100;
            report
        })
    }
}

fn step(outcome: StepOutcome, pressure: u8) -> StepReport {
    let mut report = StepReport::new(outcome, "step");
    report.output_bytes = 400;
    report.pressure_pct = pressure;
    report
}

struct Fixture {
    agent_loop: AgentLoop,
    tracker: FakeTracker,
    bus: Arc<MessageBus>,
    store: SessionStore,
    checkpoints: CheckpointStore,
    clock: FakeClock,
    memory: RoleMemory,
    git: FakeGit,
    _dir: tempfile::TempDir,
}

fn fixture_with(
    executor: Arc<dyn TaskExecutor>,
    budget_policy: BudgetPolicy,
    loop_policy: AgentLoopPolicy,
    worktree_policy: WorktreePolicy,
    resolver: Arc<dyn MergeResolver>,
) -> Fixture {
    let dir = tempdir().unwrap();
    let layout = StateLayout::at(dir.path());
    let clock = FakeClock::new(1_700_000_000_000);
    let store = SessionStore::new(layout.clone());
    let bus = Arc::new(MessageBus::open(layout.clone()).unwrap());
    let tracker = FakeTracker::new();
    let git = FakeGit::new();
    let checkpoints = CheckpointStore::new(layout.clone());
    let memory = RoleMemory::new(layout.clone());

    let session_id = SessionId::new("S-worker");
    store
        .save(&SessionState::new(
            session_id.clone(),
            Role::Backend,
            "ada",
            10,
            9,
            clock.now_ms(),
        ))
        .unwrap();

    // The worker's assistant process stays alive for the whole test, so
    // liveness survives fake-clock jumps past the heartbeat cutoff.
    let probe = FakeProbe::new();
    probe.add_process(9, 1, "claude");

    let claims = Arc::new(ClaimService::new(
        store.clone(),
        EventLog::new(layout.clone()),
        Arc::new(clock.clone()),
        Arc::new(probe.clone()),
        AreaMap::default(),
        Policy::default(),
    ));
    let worktrees = Arc::new(WorktreeManager::new(
        Arc::new(git.clone()),
        "/repo",
        worktree_policy,
    ));
    let budget = Arc::new(BudgetEnforcer::new(
        CostLedger::new(layout.clone()),
        budget_policy,
        Arc::new(clock.clone()),
    ));
    let recovery = Arc::new(RecoveryEngine::new(
        store.clone(),
        checkpoints.clone(),
        bus.clone(),
        memory.clone(),
        EventLog::new(layout.clone()),
        Arc::new(git.clone()),
        Arc::new(clock.clone()),
        "main",
    ));

    let deps = AgentLoopDeps {
        claims,
        worktrees,
        bus: bus.clone(),
        tracker: Arc::new(tracker.clone()),
        checkpoints: checkpoints.clone(),
        budget,
        board: ContextBoard::new(layout.clone()),
        recovery,
        events: EventLog::new(layout),
        executor,
        resolver,
        clock: Arc::new(clock.clone()),
        policy: loop_policy,
    };

    Fixture {
        agent_loop: AgentLoop::new(session_id, Role::Backend, deps),
        tracker,
        bus,
        store,
        checkpoints,
        clock,
        memory,
        git,
        _dir: dir,
    }
}

fn fixture(executor: Arc<dyn TaskExecutor>) -> Fixture {
    fixture_with(
        executor,
        BudgetPolicy::default(),
        AgentLoopPolicy::default(),
        WorktreePolicy::default(),
        Arc::new(NeverResolve),
    )
}

fn approve(f: &Fixture, task: &str) {
    f.bus
        .send(
            MessageDraft::new(
                SessionId::new("S-pm"),
                MessageType::Notify,
                "plan.approved",
                json!({ "task_id": task }),
            )
            .to_role(Role::Backend),
            f.clock.now_ms(),
        )
        .unwrap();
}

async fn drive(f: &mut Fixture) {
    for event in f.agent_loop.poll_events().unwrap() {
        f.agent_loop.handle_event(event).await.unwrap();
    }
}

#[tokio::test]
async fn happy_path_claims_plans_executes_and_completes() {
    let executor = FakeExecutor::new(
        &["write code", "test it"],
        vec![
            step(StepOutcome::Completed, 10),
            step(StepOutcome::TaskComplete, 10),
        ],
    );
    let mut f = fixture(executor);
    f.tracker.seed(ready_task("T-1", "Build feature", &[]));
    f.agent_loop.start().await.unwrap();

    // Tick: idle -> claim -> planning.
    drive(&mut f).await;
    assert_eq!(f.agent_loop.phase(), LoopPhase::WaitingApproval);

    // Claim landed and the tracker moved.
    let session = f.store.load(&SessionId::new("S-worker")).unwrap().unwrap();
    assert_eq!(session.claimed_task, Some(TaskId::new("T-1")));
    assert_eq!(
        f.tracker.get(&TaskId::new("T-1")).unwrap().status,
        TaskStatus::InProgress
    );

    // PM approves; next drive executes to completion.
    approve(&f, "T-1");
    drive(&mut f).await;
    assert_eq!(f.agent_loop.phase(), LoopPhase::Idle);

    // Task closed, claim released, completion broadcast.
    assert_eq!(
        f.tracker.get(&TaskId::new("T-1")).unwrap().status,
        TaskStatus::Done
    );
    let session = f.store.load(&SessionId::new("S-worker")).unwrap().unwrap();
    assert_eq!(session.claimed_task, None);
    let all = f.bus.all_messages().unwrap();
    assert!(all.iter().any(|m| m.topic == "task.completed"));
}

#[tokio::test]
async fn planning_sends_approval_request_with_ack() {
    let executor = FakeExecutor::new(&["one"], vec![]);
    let mut f = fixture(executor);
    f.tracker.seed(ready_task("T-1", "Work", &[]));
    f.agent_loop.start().await.unwrap();
    drive(&mut f).await;

    let all = f.bus.all_messages().unwrap();
    let request = all
        .iter()
        .find(|m| m.topic == "plan.approval_request")
        .unwrap();
    assert_eq!(request.to_role, Some(Role::Pm));
    assert!(request.ack.as_ref().unwrap().required);
    // The ack is tracked as pending.
    assert!(!f.bus.acks().pending().unwrap().is_empty());
}

#[tokio::test]
async fn plan_rejection_replans() {
    let executor = FakeExecutor::new(&["one"], vec![]);
    let mut f = fixture(executor);
    f.tracker.seed(ready_task("T-1", "Work", &[]));
    f.agent_loop.start().await.unwrap();
    drive(&mut f).await;
    assert_eq!(f.agent_loop.phase(), LoopPhase::WaitingApproval);

    f.bus
        .send(
            MessageDraft::new(
                SessionId::new("S-pm"),
                MessageType::Notify,
                "plan.rejected",
                json!({ "task_id": "T-1", "feedback": "too vague" }),
            )
            .to_role(Role::Backend),
            f.clock.now_ms(),
        )
        .unwrap();

    for event in f.agent_loop.poll_events().unwrap() {
        // Stop before the trailing tick re-submits the plan.
        if event == WireEvent::Tick {
            break;
        }
        f.agent_loop.handle_event(event).await.unwrap();
    }
    assert_eq!(f.agent_loop.phase(), LoopPhase::Planning);
}

#[tokio::test]
async fn approval_timeout_escalates_when_auto_plan_disabled() {
    let executor = FakeExecutor::new(&["one"], vec![]);
    let mut f = fixture(executor);
    f.tracker.seed(ready_task("T-1", "Work", &[]));
    f.agent_loop.start().await.unwrap();
    drive(&mut f).await;

    f.clock.advance(AgentLoopPolicy::default().approval_timeout_ms + 1);
    drive(&mut f).await;

    assert_eq!(f.agent_loop.phase(), LoopPhase::WaitingApproval);
    let all = f.bus.all_messages().unwrap();
    let overdue = all
        .iter()
        .find(|m| m.topic == "plan.approval_overdue")
        .unwrap();
    assert_eq!(overdue.priority, Priority::Blocking);
    assert!(overdue.escalate_to_pm);
}

#[tokio::test]
async fn approval_timeout_proceeds_when_auto_plan_enabled() {
    let executor = FakeExecutor::new(
        &["one"],
        vec![step(StepOutcome::TaskComplete, 10)],
    );
    let mut f = fixture_with(
        executor,
        BudgetPolicy::default(),
        AgentLoopPolicy {
            auto_plan_on_timeout: true,
            ..AgentLoopPolicy::default()
        },
        WorktreePolicy::default(),
        Arc::new(NeverResolve),
    );
    f.tracker.seed(ready_task("T-1", "Work", &[]));
    f.agent_loop.start().await.unwrap();
    drive(&mut f).await;

    f.clock.advance(AgentLoopPolicy::default().approval_timeout_ms + 1);
    drive(&mut f).await;
    // Timed out, auto-proceeded, executed to completion.
    assert_eq!(f.agent_loop.phase(), LoopPhase::Idle);
}

#[tokio::test]
async fn pressure_triggers_checkpoint() {
    let executor = FakeExecutor::new(
        &["one", "two"],
        vec![
            step(StepOutcome::Completed, 75),
            step(StepOutcome::TaskComplete, 10),
        ],
    );
    let mut f = fixture(executor);
    f.tracker.seed(ready_task("T-1", "Work", &[]));
    f.agent_loop.start().await.unwrap();
    drive(&mut f).await;
    approve(&f, "T-1");
    drive(&mut f).await;

    // First executing pass stopped at the checkpoint.
    assert_eq!(f.agent_loop.phase(), LoopPhase::Executing);
    let checkpoint = f
        .checkpoints
        .load(&SessionId::new("S-worker"))
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.version, 1);
    assert_eq!(checkpoint.plan_step, 1);
    assert_eq!(checkpoint.task_id, Some(TaskId::new("T-1")));
}

#[tokio::test]
async fn checkpoint_carries_results_decisions_findings_and_counters() {
    let mut rich = step(StepOutcome::Completed, 75);
    rich.result = "12 call sites found".to_string();
    rich.decisions = vec!["keep the v1 endpoint until cutover".to_string()];
    rich.findings = vec!["legacy tokens lack an expiry claim".to_string()];
    rich.context = "auditing auth call sites".to_string();
    rich.files_touched = vec![PathBuf::from("src/auth/mod.rs")];
    rich.tool_calls = 7;

    let executor = FakeExecutor::new(
        &["audit", "fix"],
        vec![rich, step(StepOutcome::TaskComplete, 10)],
    );
    let mut f = fixture(executor);
    f.tracker.seed(ready_task("T-1", "Migrate auth", &[]));
    f.agent_loop.start().await.unwrap();
    drive(&mut f).await;
    approve(&f, "T-1");
    drive(&mut f).await; // step 1 crosses the pressure threshold

    let checkpoint = f
        .checkpoints
        .load(&SessionId::new("S-worker"))
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.completed_steps.len(), 1);
    assert_eq!(checkpoint.completed_steps[0].result, "12 call sites found");
    assert_eq!(
        checkpoint.key_decisions,
        vec!["keep the v1 endpoint until cutover"]
    );
    assert_eq!(
        checkpoint.important_findings,
        vec!["legacy tokens lack an expiry claim"]
    );
    assert_eq!(checkpoint.current_context, "auditing auth call sites");
    assert_eq!(
        checkpoint.files_modified,
        vec![PathBuf::from("src/auth/mod.rs")]
    );
    assert_eq!(checkpoint.tool_call_count, 7);
    assert_eq!(checkpoint.output_bytes, 400);
}

struct AcceptAll;

impl MergeResolver for AcceptAll {
    fn resolve(&self, conflicts: &[PathBuf]) -> Resolution {
        Resolution {
            success: true,
            resolutions: conflicts
                .iter()
                .map(|p| (p.clone(), "take branch side".to_string()))
                .collect(),
            needs_escalation: false,
        }
    }
}

#[tokio::test]
async fn auto_resolve_merge_applies_accepted_resolutions() {
    let executor = FakeExecutor::new(&["one"], vec![step(StepOutcome::TaskComplete, 10)]);
    let mut f = fixture_with(
        executor,
        BudgetPolicy::default(),
        AgentLoopPolicy::default(),
        WorktreePolicy {
            auto_resolve: true,
            ..WorktreePolicy::default()
        },
        Arc::new(AcceptAll),
    );
    f.tracker.seed(ready_task("T-1", "Work", &[]));
    f.agent_loop.start().await.unwrap();
    drive(&mut f).await;

    // A conflict the resolver's applied fixes clear before the commit.
    f.git.conflict_once("pilot/t-1", &["src/a.rs"]);
    approve(&f, "T-1");
    drive(&mut f).await;

    assert_eq!(f.agent_loop.phase(), LoopPhase::Idle);
    assert_eq!(f.git.merged().len(), 1);
    // Nothing escalated to the PM.
    let all = f.bus.all_messages().unwrap();
    assert!(!all.iter().any(|m| m.topic == "recovery.merge_conflict"));
}

#[tokio::test]
async fn declined_resolution_still_escalates_conflicts() {
    let executor = FakeExecutor::new(&["one"], vec![step(StepOutcome::TaskComplete, 10)]);
    let mut f = fixture_with(
        executor,
        BudgetPolicy::default(),
        AgentLoopPolicy::default(),
        WorktreePolicy {
            auto_resolve: true,
            ..WorktreePolicy::default()
        },
        Arc::new(NeverResolve),
    );
    f.tracker.seed(ready_task("T-1", "Work", &[]));
    f.agent_loop.start().await.unwrap();
    drive(&mut f).await;

    f.git.conflict_on("pilot/t-1", &["src/a.rs"]);
    approve(&f, "T-1");
    drive(&mut f).await;

    assert!(f.git.merged().is_empty());
    let all = f.bus.all_messages().unwrap();
    assert!(all.iter().any(|m| m.topic == "recovery.merge_conflict"));
}

#[tokio::test]
async fn hard_budget_exceeded_stops_the_loop() {
    let executor = FakeExecutor::new(&["one"], vec![step(StepOutcome::Completed, 10)]);
    let budget_policy = BudgetPolicy {
        per_task: BudgetLimits {
            warn_tokens: 1,
            block_tokens: 2,
        },
        enforcement: EnforcementMode::Hard,
        ..BudgetPolicy::default()
    };
    let mut f = fixture_with(
        executor,
        budget_policy,
        AgentLoopPolicy::default(),
        WorktreePolicy::default(),
        Arc::new(NeverResolve),
    );
    f.tracker.seed(ready_task("T-1", "Work", &[]));
    f.agent_loop.start().await.unwrap();
    drive(&mut f).await;
    approve(&f, "T-1");

    // Seed spend over the block threshold, then drive.
    let ledger = CostLedger::new(StateLayout::at(f._dir.path()));
    ledger
        .record_task_cost(
            &SessionId::new("S-worker"),
            &TaskId::new("T-1"),
            1_000,
            &f.clock.today(),
        )
        .unwrap();
    drive(&mut f).await;

    assert_eq!(f.agent_loop.phase(), LoopPhase::Stopped);
    assert_eq!(
        f.agent_loop.state().stop_reason.as_deref(),
        Some("budget_exceeded")
    );
    // Claim was released on the way out.
    let session = f.store.load(&SessionId::new("S-worker")).unwrap().unwrap();
    assert_eq!(session.claimed_task, None);
}

#[tokio::test]
async fn repeated_errors_escalate_and_stop() {
    let executor = FakeExecutor::new(
        &["one"],
        vec![
            step(StepOutcome::Error("error: boom".to_string()), 10),
            step(StepOutcome::Error("error: boom".to_string()), 10),
            step(StepOutcome::Error("error: boom".to_string()), 10),
        ],
    );
    let mut f = fixture(executor);
    f.tracker.seed(ready_task("T-1", "Work", &[]));
    f.agent_loop.start().await.unwrap();
    drive(&mut f).await;
    approve(&f, "T-1");

    drive(&mut f).await; // error 1
    drive(&mut f).await; // error 2
    drive(&mut f).await; // error 3 -> diagnose -> escalate -> stop

    assert_eq!(f.agent_loop.phase(), LoopPhase::Stopped);
    let all = f.bus.all_messages().unwrap();
    assert!(all.iter().any(|m| m.topic == "agent.errors_exhausted"));
    // The unknown pattern was remembered.
    assert!(!f.memory.entries(Role::Backend).unwrap().is_empty());
}

#[tokio::test]
async fn known_error_pattern_resets_the_counter() {
    let executor = FakeExecutor::new(
        &["one"],
        vec![
            step(StepOutcome::Error("error: flaky dns".to_string()), 10),
            step(StepOutcome::Error("error: flaky dns".to_string()), 10),
            step(StepOutcome::Error("error: flaky dns".to_string()), 10),
            step(StepOutcome::TaskComplete, 10),
        ],
    );
    let mut f = fixture(executor);
    f.memory
        .record(
            Role::Backend,
            &pilot_storage::MemoryEntry {
                pattern: "error: flaky dns".to_string(),
                task_id: None,
                resolution: Some("retry with warm cache".to_string()),
                recorded_at_ms: 0,
            },
        )
        .unwrap();
    f.tracker.seed(ready_task("T-1", "Work", &[]));
    f.agent_loop.start().await.unwrap();
    drive(&mut f).await;
    approve(&f, "T-1");

    drive(&mut f).await;
    drive(&mut f).await;
    drive(&mut f).await; // third error hits the limit, resolution resets

    assert_ne!(f.agent_loop.phase(), LoopPhase::Stopped);
    assert_eq!(f.agent_loop.state().consecutive_errors, 0);

    drive(&mut f).await; // completes
    assert_eq!(f.agent_loop.phase(), LoopPhase::Idle);
}

#[tokio::test]
async fn start_resumes_from_checkpoint() {
    let executor = FakeExecutor::new(&["one"], vec![]);
    let mut f = fixture(executor);

    // A previous incarnation died mid-execution.
    f.checkpoints
        .save(
            &SessionId::new("S-worker"),
            Checkpoint {
                task_id: Some(TaskId::new("T-9")),
                task_title: "Old work".to_string(),
                plan_step: 3,
                total_steps: 6,
                ..Checkpoint::default()
            },
            0,
        )
        .unwrap();
    fsutil::write_json_atomic(
        &f.agent_loop.deps.claims.layout().loop_state_file(&SessionId::new("S-worker")),
        &AgentLoopState {
            phase: LoopPhase::Executing,
            task_id: Some(TaskId::new("T-9")),
            ..AgentLoopState::default()
        },
    )
    .unwrap();

    f.agent_loop.start().await.unwrap();
    assert_eq!(f.agent_loop.phase(), LoopPhase::Executing);
    assert_eq!(f.agent_loop.state().plan_step, 3);
    assert_eq!(f.agent_loop.state().task_id, Some(TaskId::new("T-9")));
}

#[tokio::test]
async fn start_without_checkpoint_releases_claim() {
    let executor = FakeExecutor::new(&["one"], vec![]);
    let mut f = fixture(executor);

    let mut session = f.store.load(&SessionId::new("S-worker")).unwrap().unwrap();
    session.claimed_task = Some(TaskId::new("T-9"));
    f.store.save(&session).unwrap();
    fsutil::write_json_atomic(
        &f.agent_loop.deps.claims.layout().loop_state_file(&SessionId::new("S-worker")),
        &AgentLoopState {
            phase: LoopPhase::Executing,
            task_id: Some(TaskId::new("T-9")),
            ..AgentLoopState::default()
        },
    )
    .unwrap();

    f.agent_loop.start().await.unwrap();
    assert_eq!(f.agent_loop.phase(), LoopPhase::Idle);
    let session = f.store.load(&SessionId::new("S-worker")).unwrap().unwrap();
    assert_eq!(session.claimed_task, None);
}

#[tokio::test]
async fn lockdown_stops_immediately() {
    let executor = FakeExecutor::new(&["one"], vec![]);
    let mut f = fixture(executor);
    f.agent_loop.start().await.unwrap();
    f.agent_loop
        .handle_event(WireEvent::Lockdown)
        .await
        .unwrap();
    assert_eq!(f.agent_loop.phase(), LoopPhase::Stopped);
    assert_eq!(
        f.agent_loop.state().stop_reason.as_deref(),
        Some("admin_lockdown")
    );
}
