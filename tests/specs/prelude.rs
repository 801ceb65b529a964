//! Shared fixture for the behavioral specs.

use pilot_adapters::{FakeGit, FakeProbe};
use pilot_core::{
    AreaMap, Clock, FakeClock, Policy, Role, SessionId, SessionPolicy, SessionState,
};
use pilot_engine::{ClaimService, RecoveryEngine, SessionRegistry};
use pilot_storage::{
    CheckpointStore, ContextBoard, CostLedger, EventLog, MessageBus, RoleMemory, SessionStore,
    StateLayout,
};
use std::sync::Arc;

pub struct World {
    pub layout: StateLayout,
    pub clock: FakeClock,
    pub probe: FakeProbe,
    pub git: FakeGit,
    pub store: SessionStore,
    pub bus: Arc<MessageBus>,
    pub checkpoints: CheckpointStore,
    pub ledger: CostLedger,
    pub memory: RoleMemory,
    pub registry: SessionRegistry,
    pub claims: ClaimService,
    pub recovery: RecoveryEngine,
    _dir: tempfile::TempDir,
}

impl World {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = StateLayout::at(dir.path());
        let clock = FakeClock::new(1_700_000_000_000);
        let probe = FakeProbe::new();
        let git = FakeGit::new();
        let store = SessionStore::new(layout.clone());
        let bus = Arc::new(MessageBus::open(layout.clone()).unwrap());
        let board = ContextBoard::new(layout.clone());
        let checkpoints = CheckpointStore::new(layout.clone());
        let ledger = CostLedger::new(layout.clone());
        let memory = RoleMemory::new(layout.clone());

        let registry = SessionRegistry::new(
            store.clone(),
            EventLog::new(layout.clone()),
            bus.clone(),
            board.clone(),
            Arc::new(probe.clone()),
            Arc::new(clock.clone()),
            SessionPolicy::default(),
        );
        let claims = ClaimService::new(
            store.clone(),
            EventLog::new(layout.clone()),
            Arc::new(clock.clone()),
            Arc::new(probe.clone()),
            AreaMap::default(),
            Policy::default(),
        );
        let recovery = RecoveryEngine::new(
            store.clone(),
            checkpoints.clone(),
            bus.clone(),
            memory.clone(),
            EventLog::new(layout.clone()),
            Arc::new(git.clone()),
            Arc::new(clock.clone()),
            "main",
        );

        Self {
            layout,
            clock,
            probe,
            git,
            store,
            bus,
            checkpoints,
            ledger,
            memory,
            registry,
            claims,
            recovery,
            _dir: dir,
        }
    }

    /// Seed a terminal (assistant + shell + hook) and register a session.
    pub fn register_terminal(
        &self,
        assistant_pid: u32,
        role: Role,
        name: &str,
    ) -> SessionState {
        let shell = assistant_pid + 1;
        let hook = assistant_pid + 2;
        self.probe.add_process(assistant_pid, 1, "claude");
        self.probe.add_process(shell, assistant_pid, "zsh");
        self.probe.add_process(hook, shell, "pilot");
        self.registry.register(role, name, hook).unwrap().session
    }

    /// A directly-seeded live session (no registry involvement).
    pub fn seed_session(&self, id: &str, role: Role, assistant_pid: u32) -> SessionState {
        self.probe.add_process(assistant_pid, 1, "claude");
        let mut session = SessionState::new(
            SessionId::new(id),
            role,
            format!("agent-{id}"),
            assistant_pid + 1,
            assistant_pid,
            self.clock.now_ms(),
        );
        session.heartbeat_ms = self.clock.now_ms();
        self.store.save(&session).unwrap();
        session
    }
}
