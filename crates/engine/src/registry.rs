// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session registry and liveness.
//!
//! Identity is anchored to the interactive assistant's PID, resolved by
//! walking the process tree from the hook invocation upward. Liveness is
//! lockfile + live PID with the session record's parent PID as fallback;
//! a fresh heartbeat alone is never trusted over a dead process, and a
//! stale heartbeat with a live process is repaired by refreshing, never by
//! ending the session.

use crate::error::EngineError;
use pilot_adapters::{walk_to_assistant, ProcessProbe};
use pilot_core::{Clock, Event, Role, SessionId, SessionState, SessionPolicy};
use pilot_storage::{ContextBoard, EventLog, Lockfile, MessageBus, SessionStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Heartbeat events are logged at most once per this interval.
const HEARTBEAT_LOG_INTERVAL_MS: u64 = 5 * 60 * 1000;

/// How a session identity was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionIdentity {
    FromEnv(SessionId),
    FromPid(SessionId),
    FromWalk(SessionId),
    Resurrected(SessionId),
}

impl SessionIdentity {
    pub fn session_id(&self) -> &SessionId {
        match self {
            SessionIdentity::FromEnv(id)
            | SessionIdentity::FromPid(id)
            | SessionIdentity::FromWalk(id)
            | SessionIdentity::Resurrected(id) => id,
        }
    }
}

/// Result of a registration.
#[derive(Debug, Clone)]
pub struct Registered {
    pub session: SessionState,
    pub resurrected: bool,
}

/// Summary of one cleanup sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub zombies_repaired: Vec<SessionId>,
    pub heartbeats_refreshed: Vec<SessionId>,
    pub ended: Vec<SessionId>,
    pub archived: Vec<SessionId>,
}

/// The registry.
pub struct SessionRegistry {
    store: SessionStore,
    events: EventLog,
    bus: Arc<MessageBus>,
    board: ContextBoard,
    probe: Arc<dyn ProcessProbe>,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
}

impl SessionRegistry {
    pub fn new(
        store: SessionStore,
        events: EventLog,
        bus: Arc<MessageBus>,
        board: ContextBoard,
        probe: Arc<dyn ProcessProbe>,
        clock: Arc<dyn Clock>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            store,
            events,
            bus,
            board,
            probe,
            clock,
            policy,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Resolve the assistant PID anchoring the given hook PID.
    ///
    /// Falls back to the hook's own PID when no ancestor matches, so a
    /// session still forms in unusual process topologies.
    pub fn resolve_assistant_pid(&self, hook_pid: u32) -> u32 {
        walk_to_assistant(self.probe.as_ref(), hook_pid, &self.policy.assistant_process)
            .unwrap_or(hook_pid)
    }

    /// Register the calling hook invocation.
    ///
    /// Prefers resurrecting the most recent ended session recorded against
    /// the same assistant PID, so re-invoked hooks in one terminal rejoin
    /// their state instead of proliferating sessions. The window is
    /// serialized with the registration file lock.
    pub fn register(
        &self,
        role: Role,
        agent_name: &str,
        hook_pid: u32,
    ) -> Result<Registered, EngineError> {
        let parent_pid = self.resolve_assistant_pid(hook_pid);
        let now_ms = self.clock.now_ms();

        let registered = self.store.with_registration_lock(|| {
            if let Some(mut session) = self.store.latest_ended_for_parent(parent_pid)? {
                session.resurrect(hook_pid, now_ms);
                self.store.save(&session)?;
                return Ok(Registered {
                    session,
                    resurrected: true,
                });
            }

            let session = SessionState::new(
                SessionId::generate(now_ms),
                role,
                agent_name,
                hook_pid,
                parent_pid,
                now_ms,
            );
            self.store.save(&session)?;
            Ok(Registered {
                session,
                resurrected: false,
            })
        })?;

        let session = &registered.session;
        self.store.write_lockfile(&Lockfile {
            session_id: session.id.clone(),
            pid: hook_pid,
            parent_pid,
            created_at_ms: now_ms,
        })?;

        let event = if registered.resurrected {
            Event::SessionResurrected {
                session_id: session.id.clone(),
                parent_pid,
            }
        } else {
            Event::SessionStarted {
                session_id: session.id.clone(),
                pid: hook_pid,
                parent_pid,
            }
        };
        self.events.append(&event, self.clock.now())?;
        info!(session_id = %session.id, parent_pid, resurrected = registered.resurrected, "registered session");
        Ok(registered)
    }

    /// PID-anchored liveness.
    ///
    /// Fast path: lockfile present and its recorded assistant PID runs.
    /// A lockfile whose PID is gone is stale and removed. Fallback: the
    /// session record's parent PID still runs.
    pub fn is_alive(&self, id: &SessionId) -> Result<bool, EngineError> {
        if let Some(lock) = self.store.read_lockfile(id)? {
            if self.probe.is_alive(lock.parent_pid) {
                return Ok(true);
            }
            debug!(session_id = %id, pid = lock.parent_pid, "removing stale lockfile");
            self.store.remove_lockfile(id)?;
        }
        if let Some(session) = self.store.load(id)? {
            return Ok(self.probe.is_alive(session.parent_pid));
        }
        Ok(false)
    }

    /// Sessions that are nominally active and actually live: fresh
    /// heartbeat, or (covering long tool calls) a running process.
    pub fn get_active_sessions(
        &self,
        exclude: Option<&SessionId>,
    ) -> Result<Vec<SessionState>, EngineError> {
        let now_ms = self.clock.now_ms();
        let stale_after = self.policy.stale_after_ms();
        Ok(self
            .store
            .list_nominally_active()?
            .into_iter()
            .filter(|s| Some(&s.id) != exclude)
            .filter(|s| {
                s.heartbeat_fresh(now_ms, stale_after) || self.probe.is_alive(s.parent_pid)
            })
            .collect())
    }

    /// Refresh the heartbeat of the session owning the calling process.
    ///
    /// Locates the session by walked assistant PID, falling back to the
    /// most recently heartbeaten active session. A heartbeat event is
    /// logged only when the rate-limit interval has elapsed, to bound
    /// event-log growth.
    pub fn heartbeat(&self, hook_pid: u32) -> Result<Option<SessionId>, EngineError> {
        let parent_pid = self.resolve_assistant_pid(hook_pid);
        let now_ms = self.clock.now_ms();

        let mut candidates = self.store.list_nominally_active()?;
        let index = candidates
            .iter()
            .position(|s| s.parent_pid == parent_pid || s.pid == hook_pid)
            .or_else(|| {
                // No PID match: fall back to the most recently heartbeaten
                // active session (heartbeat only; identity resolution for
                // tools never guesses like this).
                candidates
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, s)| s.heartbeat_ms)
                    .map(|(i, _)| i)
            });
        let Some(index) = index else {
            return Ok(None);
        };
        let session = &mut candidates[index];

        let previous = session.heartbeat_ms;
        session.heartbeat_ms = now_ms;
        self.store.save(session)?;

        if now_ms.saturating_sub(previous) >= HEARTBEAT_LOG_INTERVAL_MS
            || previous / HEARTBEAT_LOG_INTERVAL_MS != now_ms / HEARTBEAT_LOG_INTERVAL_MS
        {
            self.events.append(
                &Event::Heartbeat {
                    session_id: session.id.clone(),
                },
                self.clock.now(),
            )?;
        }
        Ok(Some(session.id.clone()))
    }

    /// Resolve the calling tool's session identity.
    ///
    /// Order: explicit environment value, direct parent PID match, walked
    /// assistant PID match, then resurrection of an ended session recorded
    /// against the walked PID. Never guesses by recency, which
    /// bleeds sessions across terminals.
    pub fn resolve_identity(
        &self,
        env_session: Option<&str>,
        hook_pid: u32,
    ) -> Result<Option<SessionIdentity>, EngineError> {
        if let Some(env_session) = env_session {
            let id = SessionId::new(env_session);
            if self.store.load(&id)?.is_some() {
                return Ok(Some(SessionIdentity::FromEnv(id)));
            }
        }

        let active = self.store.list_nominally_active()?;

        if let Some(direct_parent) = self.probe.parent_of(hook_pid) {
            if let Some(session) = active
                .iter()
                .find(|s| s.pid == direct_parent || s.parent_pid == direct_parent)
            {
                return Ok(Some(SessionIdentity::FromPid(session.id.clone())));
            }
        }

        let walked = self.resolve_assistant_pid(hook_pid);
        if let Some(session) = active.iter().find(|s| s.parent_pid == walked) {
            return Ok(Some(SessionIdentity::FromWalk(session.id.clone())));
        }

        if let Some(mut session) = self.store.latest_ended_for_parent(walked)? {
            let now_ms = self.clock.now_ms();
            session.resurrect(hook_pid, now_ms);
            self.store.save(&session)?;
            self.events.append(
                &Event::SessionResurrected {
                    session_id: session.id.clone(),
                    parent_pid: walked,
                },
                self.clock.now(),
            )?;
            return Ok(Some(SessionIdentity::Resurrected(session.id)));
        }

        Ok(None)
    }

    /// End a session and tear down everything registered against it.
    pub fn end_session(&self, id: &SessionId, reason: &str) -> Result<(), EngineError> {
        let Some(mut session) = self.store.load(id)? else {
            return Err(EngineError::UnknownSession(id.to_string()));
        };
        session.end(reason, self.clock.now_ms());
        self.store.save(&session)?;
        self.store.remove_lockfile(id)?;
        self.bus.remove_cursor(id)?;
        self.board.remove(id)?;
        self.events.append(
            &Event::SessionEnded {
                session_id: id.clone(),
                reason: reason.to_string(),
            },
            self.clock.now(),
        )?;
        info!(session_id = %id, reason, "session ended");
        Ok(())
    }

    /// One cleanup sweep: repair zombies, check stale heartbeats against
    /// process liveness, and archive old ended sessions.
    ///
    /// Worktree orphan GC is the PM loop's job (it owns the worktree
    /// manager); this sweep covers registry-owned state only.
    pub fn cleanup_stale_sessions(&self) -> Result<CleanupReport, EngineError> {
        let now_ms = self.clock.now_ms();
        let stale_after = self.policy.stale_after_ms();
        let mut report = CleanupReport::default();

        for mut session in self.store.list()? {
            if session.is_zombie() {
                warn!(session_id = %session.id, "repairing zombie session");
                session.end("zombie_repair", session.ended_at_ms.unwrap_or(now_ms));
                self.store.save(&session)?;
                self.store.remove_lockfile(&session.id)?;
                self.bus.remove_cursor(&session.id)?;
                self.board.remove(&session.id)?;
                self.events.append(
                    &Event::SessionEnded {
                        session_id: session.id.clone(),
                        reason: "zombie_repair".to_string(),
                    },
                    self.clock.now(),
                )?;
                report.zombies_repaired.push(session.id.clone());
                continue;
            }

            if !session.is_nominally_active() {
                continue;
            }
            if session.heartbeat_fresh(now_ms, stale_after) {
                continue;
            }

            if self.probe.is_alive(session.parent_pid) {
                // Live but quiet: a long tool call, not a crash.
                session.heartbeat_ms = now_ms;
                self.store.save(&session)?;
                report.heartbeats_refreshed.push(session.id.clone());
            } else {
                self.end_session(&session.id, "stale_dead_process")?;
                report.ended.push(session.id.clone());
            }
        }

        report.archived = self
            .store
            .archive_ended(self.policy.archive_after_ms, now_ms)?;
        Ok(report)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
