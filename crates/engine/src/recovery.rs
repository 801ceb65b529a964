// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash recovery.
//!
//! For a dead session the engine picks one of three strategies: resume
//! from its checkpoint, release-and-reassign its claim, or plain cleanup.
//! Two domain recoverers handle merge conflicts (rebase, then escalate)
//! and test failures (role memory lookup, then escalate).

use crate::error::EngineError;
use pilot_adapters::Git;
use pilot_core::{Clock, Event, MessageDraft, MessageType, Priority, Role, SessionId, SessionState, TaskId};
use pilot_storage::{
    build_restoration_prompt, Checkpoint, CheckpointStore, EventLog, MemoryEntry, MessageBus,
    RoleMemory, SessionStore,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// What to do with a crashed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Checkpoint with a task: a successor resumes from the plan step.
    Resume,
    /// Claim but no checkpoint: release and hand the task back to the PM.
    Reassign,
    /// Nothing held: remove the session's residue.
    Cleanup,
}

impl RecoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::Resume => "resume",
            RecoveryStrategy::Reassign => "reassign",
            RecoveryStrategy::Cleanup => "cleanup",
        }
    }
}

/// Assessment result.
#[derive(Debug, Clone)]
pub struct RecoveryAssessment {
    pub strategy: RecoveryStrategy,
    pub checkpoint: Option<Checkpoint>,
    pub session: Option<SessionState>,
}

/// Outcome of the merge-conflict recoverer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeConflictOutcome {
    RebasedClean,
    Escalated { conflicts: Vec<std::path::PathBuf> },
}

/// Outcome of the test-failure recoverer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestFailureOutcome {
    KnownResolution { pattern: String, resolution: String },
    Escalated { pattern: String },
}

/// The recovery engine.
pub struct RecoveryEngine {
    store: SessionStore,
    checkpoints: CheckpointStore,
    bus: Arc<MessageBus>,
    memory: RoleMemory,
    events: EventLog,
    git: Arc<dyn Git>,
    clock: Arc<dyn Clock>,
    base_branch: String,
}

impl RecoveryEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: SessionStore,
        checkpoints: CheckpointStore,
        bus: Arc<MessageBus>,
        memory: RoleMemory,
        events: EventLog,
        git: Arc<dyn Git>,
        clock: Arc<dyn Clock>,
        base_branch: impl Into<String>,
    ) -> Self {
        Self {
            store,
            checkpoints,
            bus,
            memory,
            events,
            git,
            clock,
            base_branch: base_branch.into(),
        }
    }

    /// Pick a strategy for a dead session.
    pub fn assess_recovery(&self, session_id: &SessionId) -> Result<RecoveryAssessment, EngineError> {
        let session = self.store.load(session_id)?;
        let checkpoint = self.checkpoints.load(session_id)?;

        let strategy = match (&checkpoint, &session) {
            (Some(cp), _) if cp.task_id.is_some() => RecoveryStrategy::Resume,
            (_, Some(s)) if s.claimed_task.is_some() => RecoveryStrategy::Reassign,
            _ => RecoveryStrategy::Cleanup,
        };

        self.events.append(
            &Event::RecoveryAssessed {
                session_id: session_id.clone(),
                strategy: strategy.as_str().to_string(),
            },
            self.clock.now(),
        )?;
        Ok(RecoveryAssessment {
            strategy,
            checkpoint,
            session,
        })
    }

    /// Load the checkpoint and render the cold-resume prompt.
    pub fn recover_from_checkpoint(
        &self,
        dead: &SessionId,
    ) -> Result<Option<(Checkpoint, String)>, EngineError> {
        let Some(checkpoint) = self.checkpoints.load(dead)? else {
            return Ok(None);
        };
        let prompt = build_restoration_prompt(&checkpoint);
        Ok(Some((checkpoint, prompt)))
    }

    /// Release a dead session's claim and tell the PM to reassign.
    pub fn release_and_reassign(
        &self,
        dead: &SessionId,
        pm: &SessionId,
    ) -> Result<Option<TaskId>, EngineError> {
        let Some(mut session) = self.store.load(dead)? else {
            return Err(EngineError::UnknownSession(dead.to_string()));
        };
        let Some(task) = session.claimed_task.clone() else {
            return Ok(None);
        };
        let role = session.role;
        session.release_claim();
        self.store.save(&session)?;

        self.bus.send_to_role(
            pm,
            Role::Pm,
            "task.needs_reassign",
            json!({ "task_id": task, "dead_session": dead, "role": role }),
            self.clock.now_ms(),
        )?;
        self.memory.record(
            role,
            &MemoryEntry {
                pattern: format!("session died holding {task}"),
                task_id: Some(task.clone()),
                resolution: None,
                recorded_at_ms: self.clock.now_ms(),
            },
        )?;
        self.events.append(
            &Event::RecoveryReassigned {
                session_id: dead.clone(),
                task_id: task.clone(),
            },
            self.clock.now(),
        )?;
        info!(session_id = %dead, task_id = %task, "claim released for reassignment");
        Ok(Some(task))
    }

    /// Transfer a dead session's claim, locks, and worktree to a live one.
    pub fn recover_session(
        &self,
        dead_id: &SessionId,
        new_id: &SessionId,
        lease_ms: u64,
    ) -> Result<bool, EngineError> {
        let Some(mut dead) = self.store.load(dead_id)? else {
            return Err(EngineError::UnknownSession(dead_id.to_string()));
        };
        let Some(mut new) = self.store.load(new_id)? else {
            return Err(EngineError::UnknownSession(new_id.to_string()));
        };
        let Some(task) = dead.claimed_task.clone() else {
            return Ok(false);
        };

        let now_ms = self.clock.now_ms();
        new.claimed_task = Some(task);
        new.claimed_at_ms = Some(now_ms);
        new.lease_expires_at_ms = Some(now_ms + lease_ms);
        new.locked_areas = std::mem::take(&mut dead.locked_areas);
        new.locked_files = std::mem::take(&mut dead.locked_files);
        new.worktree_path = dead.worktree_path.take();
        dead.release_claim();

        self.store.save(&dead)?;
        self.store.save(&new)?;
        self.events.append(
            &Event::SessionRecovered {
                session_id: dead_id.clone(),
                new_session_id: new_id.clone(),
            },
            self.clock.now(),
        )?;
        info!(from = %dead_id, to = %new_id, "claim transferred");
        Ok(true)
    }

    /// Remove a dead session's residue (lockfile, cursor, loop state).
    pub fn cleanup(&self, dead: &SessionId) -> Result<(), EngineError> {
        self.store.remove_lockfile(dead)?;
        self.bus.remove_cursor(dead)?;
        let loop_state = self.store.layout().loop_state_file(dead);
        if loop_state.exists() {
            std::fs::remove_file(&loop_state).map_err(pilot_storage::StoreError::from)?;
        }
        self.events.append(
            &Event::RecoveryCleaned {
                session_id: dead.clone(),
            },
            self.clock.now(),
        )?;
        Ok(())
    }

    /// Merge-conflict recovery: rebase the worktree onto the base branch;
    /// on conflict, remember the failure and raise a blocking PM request.
    pub async fn recover_merge_conflict(
        &self,
        session: &SessionState,
        worktree: &Path,
    ) -> Result<MergeConflictOutcome, EngineError> {
        match self.git.rebase(worktree, &self.base_branch).await? {
            Ok(()) => Ok(MergeConflictOutcome::RebasedClean),
            Err(conflicts) => {
                warn!(session_id = %session.id, files = conflicts.len(), "rebase conflicts");
                self.memory.record(
                    session.role,
                    &MemoryEntry {
                        pattern: format!(
                            "merge conflict in {}",
                            conflicts
                                .iter()
                                .map(|p| p.display().to_string())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ),
                        task_id: session.claimed_task.clone(),
                        resolution: None,
                        recorded_at_ms: self.clock.now_ms(),
                    },
                )?;
                self.bus.send(
                    MessageDraft::new(
                        session.id.clone(),
                        MessageType::Request,
                        "recovery.merge_conflict",
                        json!({
                            "task_id": session.claimed_task,
                            "conflicts": conflicts,
                        }),
                    )
                    .to_role(Role::Pm)
                    .priority(Priority::Blocking),
                    self.clock.now_ms(),
                )?;
                Ok(MergeConflictOutcome::Escalated { conflicts })
            }
        }
    }

    /// Test-failure recovery: extract a pattern, consult role memory,
    /// escalate when unknown.
    pub fn recover_test_failure(
        &self,
        session: &SessionState,
        output: &str,
    ) -> Result<TestFailureOutcome, EngineError> {
        let pattern = extract_error_pattern(output);

        if let Some(entry) = self.memory.lookup_resolution(session.role, &pattern)? {
            if let Some(resolution) = entry.resolution {
                return Ok(TestFailureOutcome::KnownResolution {
                    pattern,
                    resolution,
                });
            }
        }

        self.memory.record(
            session.role,
            &MemoryEntry {
                pattern: pattern.clone(),
                task_id: session.claimed_task.clone(),
                resolution: None,
                recorded_at_ms: self.clock.now_ms(),
            },
        )?;
        self.bus.send_to_role(
            &session.id,
            Role::Pm,
            "recovery.test_failure",
            json!({ "task_id": session.claimed_task, "pattern": pattern }),
            self.clock.now_ms(),
        )?;
        Ok(TestFailureOutcome::Escalated { pattern })
    }

    /// Messages sent by the domain recoverers land on the bus; expose it
    /// for callers wiring scans together.
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }
}

/// First error-looking line of test output, truncated to 120 chars.
pub fn extract_error_pattern(output: &str) -> String {
    let markers = ["error", "failed", "panicked", "assertion"];
    let line = output
        .lines()
        .find(|l| {
            let lower = l.to_ascii_lowercase();
            markers.iter().any(|m| lower.contains(m))
        })
        .unwrap_or_else(|| output.lines().next().unwrap_or(""))
        .trim();
    line.chars().take(120).collect()
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
