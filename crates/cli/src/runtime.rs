// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Component wiring.
//!
//! All collaborators are constructed once here and handed to commands and
//! loops; nothing discovers a dependency at call time.

use anyhow::Result;
use pilot_adapters::{BdTracker, CliGit, FileChannel, IssueTracker, ProcessProbe, SysProbe};
use pilot_core::{AreaMap, Clock, Policy, SessionId, SystemClock};
use pilot_engine::{
    BudgetEnforcer, ClaimService, ConversationHandler, RecoveryEngine, SessionRegistry,
    WorktreeManager,
};
use pilot_storage::{
    CheckpointStore, ContextBoard, CostLedger, EventLog, MessageBus, RoleMemory, SessionStore,
    StateLayout,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Fully wired component graph.
pub struct Runtime {
    pub layout: StateLayout,
    pub policy: Policy,
    pub repo: PathBuf,
    pub clock: Arc<dyn Clock>,
    pub store: SessionStore,
    pub bus: Arc<MessageBus>,
    pub board: ContextBoard,
    pub events: EventLog,
    pub checkpoints: CheckpointStore,
    pub memory: RoleMemory,
    registry: Arc<SessionRegistry>,
    claims: Arc<ClaimService>,
    worktrees: Arc<WorktreeManager>,
    budget: Arc<BudgetEnforcer>,
    recovery: Arc<RecoveryEngine>,
    tracker: Arc<dyn IssueTracker>,
}

impl Runtime {
    pub fn bootstrap(state_dir: Option<PathBuf>, repo: Option<PathBuf>) -> Result<Self> {
        let layout = match state_dir {
            Some(dir) => StateLayout::at(dir),
            None => StateLayout::resolve(),
        };
        let policy = Policy::load_or_default(&layout.policy_file())?;
        let repo = repo.unwrap_or_else(|| PathBuf::from("."));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let store = SessionStore::new(layout.clone());
        let bus = Arc::new(MessageBus::open(layout.clone())?);
        let board = ContextBoard::new(layout.clone());
        let events = EventLog::new(layout.clone());
        let checkpoints = CheckpointStore::new(layout.clone());
        let memory = RoleMemory::new(layout.clone());
        let git = Arc::new(CliGit);
        let tracker: Arc<dyn IssueTracker> = Arc::new(BdTracker::default());
        let probe: Arc<dyn ProcessProbe> = Arc::new(SysProbe);

        let registry = Arc::new(SessionRegistry::new(
            store.clone(),
            events.clone(),
            bus.clone(),
            board.clone(),
            probe.clone(),
            clock.clone(),
            policy.sessions.clone(),
        ));
        let claims = Arc::new(ClaimService::new(
            store.clone(),
            events.clone(),
            clock.clone(),
            probe,
            AreaMap::default(),
            policy.clone(),
        ));
        let worktrees = Arc::new(WorktreeManager::new(
            git.clone(),
            repo.clone(),
            policy.worktree.clone(),
        ));
        let budget = Arc::new(BudgetEnforcer::new(
            CostLedger::new(layout.clone()),
            policy.budget.clone(),
            clock.clone(),
        ));
        let recovery = Arc::new(RecoveryEngine::new(
            store.clone(),
            checkpoints.clone(),
            bus.clone(),
            memory.clone(),
            events.clone(),
            git,
            clock.clone(),
            policy.worktree.base_branch.clone(),
        ));

        Ok(Self {
            layout,
            policy,
            repo,
            clock,
            store,
            bus,
            board,
            events,
            checkpoints,
            memory,
            registry,
            claims,
            worktrees,
            budget,
            recovery,
            tracker,
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn claims(&self) -> &Arc<ClaimService> {
        &self.claims
    }

    pub fn worktrees(&self) -> &Arc<WorktreeManager> {
        &self.worktrees
    }

    pub fn budget(&self) -> &Arc<BudgetEnforcer> {
        &self.budget
    }

    pub fn recovery(&self) -> &Arc<RecoveryEngine> {
        &self.recovery
    }

    pub fn tracker(&self) -> &Arc<dyn IssueTracker> {
        &self.tracker
    }

    /// Conversation handler for the PM loop's channel scan.
    pub fn conversation(&self, pm_session: SessionId) -> ConversationHandler {
        ConversationHandler::new(
            self.layout.clone(),
            Arc::new(FileChannel::new(
                self.layout.clone(),
                self.policy.channel.max_message_len,
            )),
            self.registry.clone(),
            self.claims.clone(),
            self.tracker.clone(),
            self.board.clone(),
            self.budget.clone(),
            self.bus.clone(),
            self.events.clone(),
            self.clock.clone(),
            self.policy.channel.clone(),
            pm_session,
        )
    }

    /// Resolve the calling session, honoring `PILOT_SESSION_ID`.
    pub fn current_session(&self) -> Result<Option<SessionId>> {
        let env_session = std::env::var("PILOT_SESSION_ID").ok();
        let identity = self
            .registry
            .resolve_identity(env_session.as_deref(), std::process::id())?;
        Ok(identity.map(|i| i.session_id().clone()))
    }
}
