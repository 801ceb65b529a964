// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task leases and area locks.
//!
//! A claim is exclusive, time-bounded ownership of a task; expiry releases
//! it implicitly; the next reader simply sees the task unclaimed. Area
//! locks are advisory coarse-grained mutual exclusion enforced by the
//! pre-edit governance check. Conflicts are structured denials naming the
//! holder, never errors.
//!
//! Exclusivity is defined over *live* sessions: nominally active, with a
//! fresh heartbeat or a running assistant process. A crashed claimant the
//! cleanup sweep has not reached yet must not block the next claimant.

use crate::error::EngineError;
use glob::Pattern;
use pilot_adapters::ProcessProbe;
use pilot_core::{Area, AreaMap, Clock, Event, Policy, SessionId, SessionState, TaskId};
use pilot_storage::{EventLog, SessionStore};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// The conflicting holder surfaced by a denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimDenial {
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_expires_at_ms: Option<u64>,
}

/// Result of a claim or lock attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClaimOutcome {
    Granted,
    Denied { existing: ClaimDenial },
}

impl ClaimOutcome {
    pub fn granted(&self) -> bool {
        matches!(self, ClaimOutcome::Granted)
    }
}

/// Verdict of the pre-edit governance check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum EditVerdict {
    Allowed,
    Denied { reason: String },
}

impl EditVerdict {
    pub fn allowed(&self) -> bool {
        matches!(self, EditVerdict::Allowed)
    }
}

/// Lease and lock coordinator.
pub struct ClaimService {
    store: SessionStore,
    events: EventLog,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn ProcessProbe>,
    area_map: AreaMap,
    policy: Policy,
    never_edit: Vec<Pattern>,
    no_task_required: Vec<Pattern>,
}

impl ClaimService {
    pub fn new(
        store: SessionStore,
        events: EventLog,
        clock: Arc<dyn Clock>,
        probe: Arc<dyn ProcessProbe>,
        area_map: AreaMap,
        policy: Policy,
    ) -> Self {
        let compile = |globs: &[String]| {
            globs
                .iter()
                .filter_map(|g| Pattern::new(g).ok())
                .collect::<Vec<_>>()
        };
        let never_edit = compile(&policy.exceptions.never_edit);
        let no_task_required = compile(&policy.exceptions.no_task_required);
        Self {
            store,
            events,
            clock,
            probe,
            area_map,
            policy,
            never_edit,
            no_task_required,
        }
    }

    pub fn layout(&self) -> &pilot_storage::StateLayout {
        self.store.layout()
    }

    pub fn area_map(&self) -> &AreaMap {
        &self.area_map
    }

    /// Read-only session lookup for collaborators.
    pub fn session(&self, id: &SessionId) -> Result<Option<SessionState>, EngineError> {
        Ok(self.store.load(id)?)
    }

    fn load_session(&self, id: &SessionId) -> Result<SessionState, EngineError> {
        self.store
            .load(id)?
            .ok_or_else(|| EngineError::UnknownSession(id.to_string()))
    }

    /// Sessions counted for exclusivity: nominally active with a fresh
    /// heartbeat or a running assistant process. Same predicate as the
    /// registry's active-session listing.
    fn live_sessions(&self) -> Result<Vec<SessionState>, EngineError> {
        let now_ms = self.clock.now_ms();
        let stale_after = self.policy.sessions.stale_after_ms();
        Ok(self
            .store
            .list_nominally_active()?
            .into_iter()
            .filter(|s| {
                s.heartbeat_fresh(now_ms, stale_after) || self.probe.is_alive(s.parent_pid)
            })
            .collect())
    }

    /// Which live session currently holds `task` under an unexpired lease.
    pub fn task_holder(&self, task: &TaskId) -> Result<Option<ClaimDenial>, EngineError> {
        let now_ms = self.clock.now_ms();
        Ok(self
            .live_sessions()?
            .into_iter()
            .find(|s| s.holds_task(task, now_ms))
            .map(|s| ClaimDenial {
                lease_expires_at_ms: s.lease_expires_at_ms,
                task_id: s.claimed_task,
                session_id: s.id,
            }))
    }

    /// Attempt to claim `task` for `session` with a lease of `lease_ms`.
    pub fn claim(
        &self,
        session_id: &SessionId,
        task: &TaskId,
        lease_ms: u64,
    ) -> Result<ClaimOutcome, EngineError> {
        let now_ms = self.clock.now_ms();

        if let Some(existing) = self.task_holder(task)? {
            if existing.session_id != *session_id {
                return Ok(ClaimOutcome::Denied { existing });
            }
        }

        let mut session = self.load_session(session_id)?;
        if let Some(current) = &session.claimed_task {
            if current != task && session.lease_live(now_ms) {
                // One claim per session; release first.
                return Ok(ClaimOutcome::Denied {
                    existing: ClaimDenial {
                        session_id: session.id.clone(),
                        task_id: session.claimed_task.clone(),
                        lease_expires_at_ms: session.lease_expires_at_ms,
                    },
                });
            }
        }

        session.claimed_task = Some(task.clone());
        session.claimed_at_ms = Some(now_ms);
        session.lease_expires_at_ms = Some(now_ms + lease_ms);
        self.store.save(&session)?;
        self.events.append(
            &Event::TaskClaimed {
                session_id: session_id.clone(),
                task_id: task.clone(),
                lease_expires_at_ms: now_ms + lease_ms,
            },
            self.clock.now(),
        )?;
        info!(session_id = %session_id, task_id = %task, lease_ms, "task claimed");
        Ok(ClaimOutcome::Granted)
    }

    /// Release the session's claim, unlocking all areas and files.
    ///
    /// Worktree teardown is the caller's concern (the worktree manager is
    /// its own component); this clears only the lease and lock state.
    pub fn release(&self, session_id: &SessionId) -> Result<Option<TaskId>, EngineError> {
        let mut session = self.load_session(session_id)?;
        let task = session.claimed_task.clone();
        let had_locks = !session.locked_areas.is_empty() || !session.locked_files.is_empty();
        session.release_claim();
        self.store.save(&session)?;

        if let Some(task) = &task {
            self.events.append(
                &Event::TaskReleased {
                    session_id: session_id.clone(),
                    task_id: task.clone(),
                },
                self.clock.now(),
            )?;
        }
        if had_locks {
            self.events.append(
                &Event::LocksReleased {
                    session_id: session_id.clone(),
                },
                self.clock.now(),
            )?;
        }
        Ok(task)
    }

    /// Record the worktree checkout attached to the current claim.
    pub fn record_worktree(
        &self,
        session_id: &SessionId,
        path: Option<std::path::PathBuf>,
    ) -> Result<(), EngineError> {
        let mut session = self.load_session(session_id)?;
        session.worktree_path = path;
        self.store.save(&session)?;
        Ok(())
    }

    /// Bump the lease expiry, only while the session still holds the task.
    pub fn extend(
        &self,
        session_id: &SessionId,
        task: &TaskId,
        extra_ms: u64,
    ) -> Result<bool, EngineError> {
        let now_ms = self.clock.now_ms();
        let mut session = self.load_session(session_id)?;
        if !session.holds_task(task, now_ms) {
            return Ok(false);
        }
        let base = session.lease_expires_at_ms.unwrap_or(now_ms);
        session.lease_expires_at_ms = Some(base + extra_ms);
        self.store.save(&session)?;
        Ok(true)
    }

    /// Which live session holds `area`.
    pub fn area_holder(&self, area: Area) -> Result<Option<SessionId>, EngineError> {
        Ok(self
            .live_sessions()?
            .into_iter()
            .find(|s| s.locked_areas.contains(&area))
            .map(|s| s.id))
    }

    /// Lock a symbolic area for the session.
    pub fn lock_area(&self, session_id: &SessionId, area: Area) -> Result<ClaimOutcome, EngineError> {
        if let Some(holder) = self.area_holder(area)? {
            if holder != *session_id {
                return Ok(ClaimOutcome::Denied {
                    existing: ClaimDenial {
                        session_id: holder,
                        task_id: None,
                        lease_expires_at_ms: None,
                    },
                });
            }
            return Ok(ClaimOutcome::Granted);
        }

        let mut session = self.load_session(session_id)?;
        session.locked_areas.insert(area);
        self.store.save(&session)?;
        self.events.append(
            &Event::AreaLocked {
                session_id: session_id.clone(),
                area,
            },
            self.clock.now(),
        )?;
        Ok(ClaimOutcome::Granted)
    }

    pub fn unlock_area(&self, session_id: &SessionId, area: Area) -> Result<(), EngineError> {
        let mut session = self.load_session(session_id)?;
        if session.locked_areas.remove(&area) {
            self.store.save(&session)?;
            self.events.append(
                &Event::AreaUnlocked {
                    session_id: session_id.clone(),
                    area,
                },
                self.clock.now(),
            )?;
        }
        Ok(())
    }

    /// Pre-edit governance: never-edit globs, foreign area locks, and the
    /// task-required rule.
    pub fn check_edit(
        &self,
        session_id: &SessionId,
        path: &Path,
    ) -> Result<EditVerdict, EngineError> {
        if self.never_edit.iter().any(|p| p.matches_path(path)) {
            return Ok(EditVerdict::Denied {
                reason: format!("{} is on the never-edit list", path.display()),
            });
        }

        let session = self.load_session(session_id)?;

        if self.policy.areas.locking_enabled {
            if let Some(area) = self.area_map.area_for(path) {
                if let Some(holder) = self.area_holder(area)? {
                    if holder != *session_id {
                        return Ok(EditVerdict::Denied {
                            reason: format!(
                                "area {area} is locked by session {holder}"
                            ),
                        });
                    }
                }
            }
        }

        let exempt = self.no_task_required.iter().any(|p| p.matches_path(path));
        if !exempt && session.claimed_task.is_none() {
            return Ok(EditVerdict::Denied {
                reason: "no task claimed; claim a task before editing".to_string(),
            });
        }

        Ok(EditVerdict::Allowed)
    }
}

#[cfg(test)]
#[path = "claims_tests.rs"]
mod tests;
