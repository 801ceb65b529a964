// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session record and lockfile repository.
//!
//! One JSON file per session under `state/sessions/`, one lockfile per
//! live session under `state/locks/`. The registration window (find an
//! ended session to resurrect, or create a fresh one) is serialized across
//! processes with an advisory `fs2` lock.

use crate::fsutil::{read_json, write_json_atomic, StoreError};
use crate::layout::StateLayout;
use fs2::FileExt;
use pilot_core::{SessionId, SessionState, SessionStatus};
use serde::{Deserialize, Serialize};
use std::fs::File;
use tracing::warn;

/// Lockfile contents: presence plus a live PID means the session is alive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lockfile {
    pub session_id: SessionId,
    pub pid: u32,
    pub parent_pid: u32,
    pub created_at_ms: u64,
}

/// Repository for session state files and lockfiles.
#[derive(Debug, Clone)]
pub struct SessionStore {
    layout: StateLayout,
}

impl SessionStore {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn save(&self, session: &SessionState) -> Result<(), StoreError> {
        write_json_atomic(&self.layout.session_file(&session.id), session)
    }

    pub fn load(&self, id: &SessionId) -> Result<Option<SessionState>, StoreError> {
        read_json(&self.layout.session_file(id))
    }

    pub fn remove(&self, id: &SessionId) -> Result<(), StoreError> {
        let path = self.layout.session_file(id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// All session records, unparseable files skipped with a warning.
    pub fn list(&self) -> Result<Vec<SessionState>, StoreError> {
        let dir = self.layout.sessions_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match read_json::<SessionState>(&path) {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable session file");
                }
            }
        }
        sessions.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(sessions)
    }

    /// Sessions with `status == active` regardless of process liveness.
    pub fn list_nominally_active(&self) -> Result<Vec<SessionState>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|s| s.is_nominally_active())
            .collect())
    }

    /// Most recently ended session whose recorded parent PID matches.
    ///
    /// This is the resurrection candidate for a re-invoked hook in the
    /// same terminal.
    pub fn latest_ended_for_parent(
        &self,
        parent_pid: u32,
    ) -> Result<Option<SessionState>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|s| s.status == SessionStatus::Ended && s.parent_pid == parent_pid)
            .max_by_key(|s| s.ended_at_ms.unwrap_or(0)))
    }

    /// Move ended sessions older than `threshold_ms` into the archive.
    pub fn archive_ended(
        &self,
        threshold_ms: u64,
        now_ms: u64,
    ) -> Result<Vec<SessionId>, StoreError> {
        let archive = self.layout.session_archive_dir();
        let mut moved = Vec::new();
        for session in self.list()? {
            let Some(ended_at) = session.ended_at_ms else {
                continue;
            };
            if session.status != SessionStatus::Ended {
                continue;
            }
            if now_ms.saturating_sub(ended_at) < threshold_ms {
                continue;
            }
            std::fs::create_dir_all(&archive)?;
            let from = self.layout.session_file(&session.id);
            let to = archive.join(format!("{}.json", session.id));
            std::fs::rename(&from, &to)?;
            moved.push(session.id);
        }
        Ok(moved)
    }

    // -- lockfiles --

    pub fn write_lockfile(&self, lock: &Lockfile) -> Result<(), StoreError> {
        write_json_atomic(&self.layout.lockfile(&lock.session_id), lock)
    }

    pub fn read_lockfile(&self, id: &SessionId) -> Result<Option<Lockfile>, StoreError> {
        read_json(&self.layout.lockfile(id))
    }

    pub fn remove_lockfile(&self, id: &SessionId) -> Result<(), StoreError> {
        let path = self.layout.lockfile(id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Run `f` while holding the cross-process registration lock.
    ///
    /// Serializes the resurrection window so two hooks racing on the same
    /// parent PID cannot both create a session.
    pub fn with_registration_lock<T>(
        &self,
        f: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let path = self.layout.registration_lock();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        file.lock_exclusive()?;
        let result = f();
        if let Err(e) = fs2::FileExt::unlock(&file) {
            warn!(error = %e, "failed to release registration lock");
        }
        result
    }
}

#[cfg(test)]
#[path = "session_store_tests.rs"]
mod tests;
