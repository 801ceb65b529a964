// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pilot-engine: the coordination components of the Pilot substrate.
//!
//! Each module is one component of the design: session registry and
//! liveness, task leases and area locks, worktree lifecycle, scheduling,
//! decomposition, budget enforcement, crash recovery, the per-agent state
//! machine, the PM supervisory loop, and the external-channel conversation
//! handler. Everything takes its collaborators (stores, adapters, policy,
//! clock) at construction; public operations return structured results and
//! never panic across a process boundary.

pub mod agent_loop;
pub mod budget;
pub mod channel;
pub mod claims;
pub mod decompose;
pub mod error;
pub mod pm_loop;
pub mod recovery;
pub mod registry;
pub mod scheduler;
pub mod worktree;

pub use agent_loop::{
    AgentLoop, AgentLoopDeps, AgentLoopState, LoopPhase, StepOutcome, StepReport, TaskExecutor,
    WireEvent,
};
pub use budget::{BudgetEnforcer, BudgetStatus, BudgetVerdict};
pub use channel::{ConversationHandler, PendingApproval};
pub use claims::{ClaimDenial, ClaimOutcome, ClaimService, EditVerdict};
pub use decompose::{
    analyze_import_graph, build_dependency_dag, classify_task_domain, decompose_task,
    generate_subtasks, should_decompose, subtask_drafts, DecompositionOutcome, DomainInfo,
    SubtaskSpec, TaskDag, TaskDomain,
};
pub use error::EngineError;
pub use pm_loop::{PmLoop, PrStatusSource, ScanReport};
pub use recovery::{
    MergeConflictOutcome, RecoveryAssessment, RecoveryEngine, RecoveryStrategy,
    TestFailureOutcome,
};
pub use registry::{CleanupReport, Registered, SessionIdentity, SessionRegistry};
pub use scheduler::{
    AgentSnapshot, Assignment, Autoscaler, AutoscalerInputs, ScaleDecision, Scheduler,
    SchedulerInputs,
};
pub use worktree::{MergeOutcome, MergeResolver, NeverResolve, Resolution, WorktreeManager};
