// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task isolated worktrees.
//!
//! Each claimed task gets a branch `<prefix><sanitized-task-id>` checked
//! out at `<base>/<sanitized-task-id>` and VCS-locked with a reason naming
//! the owning session. Task ids are sanitized before they appear in any
//! branch, path, or argv entry; unsanitized input never reaches a shell.

use crate::error::EngineError;
use pilot_core::{SessionId, TaskId, WorktreePolicy};
use pilot_adapters::Git;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    /// Precheck or resolution failed; conflicts need escalation.
    Conflicts(Vec<PathBuf>),
}

/// Opaque semantic conflict resolver contract.
///
/// The engine assumes nothing about its depth; the default implementation
/// always escalates.
pub trait MergeResolver: Send + Sync {
    fn resolve(&self, conflicts: &[PathBuf]) -> Resolution;
}

/// Resolver verdict.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub success: bool,
    pub resolutions: Vec<(PathBuf, String)>,
    pub needs_escalation: bool,
}

/// Resolver that never resolves anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverResolve;

impl MergeResolver for NeverResolve {
    fn resolve(&self, _conflicts: &[PathBuf]) -> Resolution {
        Resolution {
            success: false,
            resolutions: Vec::new(),
            needs_escalation: true,
        }
    }
}

/// Reduce a task id to branch/path-safe characters.
pub fn sanitize_task_id(task: &TaskId) -> String {
    task.as_str()
        .to_ascii_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Worktree lifecycle manager.
pub struct WorktreeManager {
    git: Arc<dyn Git>,
    repo: PathBuf,
    policy: WorktreePolicy,
}

impl WorktreeManager {
    pub fn new(git: Arc<dyn Git>, repo: impl Into<PathBuf>, policy: WorktreePolicy) -> Self {
        Self {
            git,
            repo: repo.into(),
            policy,
        }
    }

    pub fn branch_for(&self, task: &TaskId) -> String {
        format!("{}{}", self.policy.branch_prefix, sanitize_task_id(task))
    }

    pub fn path_for(&self, task: &TaskId) -> PathBuf {
        let base = if self.policy.base_dir.is_absolute() {
            self.policy.base_dir.clone()
        } else {
            self.repo.join(&self.policy.base_dir)
        };
        base.join(sanitize_task_id(task))
    }

    fn lock_reason(session: &SessionId) -> String {
        format!("claimed by {session}")
    }

    /// Create (or reuse) the worktree for a task and lock it to `session`.
    ///
    /// Returns `None` when worktrees are disabled by policy. Reuse is
    /// idempotent: an existing checkout is re-locked, not re-created.
    pub async fn create(
        &self,
        task: &TaskId,
        session: &SessionId,
    ) -> Result<Option<PathBuf>, EngineError> {
        if !self.policy.enabled {
            return Ok(None);
        }
        let path = self.path_for(task);
        let branch = self.branch_for(task);

        let existing = self
            .git
            .worktree_list(&self.repo)
            .await?
            .into_iter()
            .any(|info| info.path == path);
        if !existing {
            self.git
                .worktree_add(&self.repo, &path, &branch, &self.policy.base_branch)
                .await?;
            info!(task_id = %task, path = %path.display(), branch, "worktree created");
        }

        self.git
            .worktree_lock(&self.repo, &path, &Self::lock_reason(session))
            .await?;
        Ok(Some(path))
    }

    /// Remove the worktree and delete its branch.
    ///
    /// Unlocks first, then removes, falling back to `--force` when the
    /// plain removal fails (dirty tree, stale admin files).
    pub async fn remove(&self, task: &TaskId) -> Result<(), EngineError> {
        if !self.policy.enabled {
            return Ok(());
        }
        let path = self.path_for(task);
        let branch = self.branch_for(task);

        if let Err(e) = self.git.worktree_unlock(&self.repo, &path).await {
            warn!(task_id = %task, error = %e, "worktree unlock failed");
        }
        if let Err(first) = self.git.worktree_remove(&self.repo, &path, false).await {
            warn!(task_id = %task, error = %first, "worktree remove failed, forcing");
            self.git.worktree_remove(&self.repo, &path, true).await?;
        }
        if let Err(e) = self.git.branch_delete(&self.repo, &branch).await {
            warn!(branch, error = %e, "branch delete failed");
        }
        Ok(())
    }

    /// Merge the task branch into the base branch.
    ///
    /// Runs the conflict precheck first. On conflicts, consults the
    /// resolver only when auto-resolution is enabled; anything unresolved
    /// comes back as [`MergeOutcome::Conflicts`] for escalation.
    pub async fn merge(
        &self,
        task: &TaskId,
        message: &str,
        resolver: &dyn MergeResolver,
    ) -> Result<MergeOutcome, EngineError> {
        let branch = self.branch_for(task);

        let check = self.git.merge_precheck(&self.repo, &branch).await?;
        if !check.clean {
            if self.policy.auto_resolve {
                let resolution = resolver.resolve(&check.conflicts);
                if !resolution.success || resolution.needs_escalation {
                    return Ok(MergeOutcome::Conflicts(check.conflicts));
                }
                info!(task_id = %task, resolved = resolution.resolutions.len(), "conflicts auto-resolved");
            } else {
                return Ok(MergeOutcome::Conflicts(check.conflicts));
            }
        }

        self.git
            .merge(&self.repo, &branch, self.policy.merge_strategy, message)
            .await?;
        info!(task_id = %task, branch, strategy = ?self.policy.merge_strategy, "merged");
        Ok(MergeOutcome::Merged)
    }

    /// Remove worktrees whose lock names a session that is no longer live.
    pub async fn gc_orphans(&self, live: &[SessionId]) -> Result<Vec<PathBuf>, EngineError> {
        if !self.policy.enabled {
            return Ok(Vec::new());
        }
        let mut removed = Vec::new();
        for info in self.git.worktree_list(&self.repo).await? {
            let Some(reason) = &info.locked_reason else {
                continue;
            };
            let Some(owner) = reason.strip_prefix("claimed by ") else {
                continue;
            };
            if live.iter().any(|s| s.as_str() == owner.trim()) {
                continue;
            }
            warn!(path = %info.path.display(), owner, "reclaiming orphan worktree");
            if let Err(e) = self.git.worktree_unlock(&self.repo, &info.path).await {
                warn!(error = %e, "orphan unlock failed");
            }
            if let Err(e) = self.git.worktree_remove(&self.repo, &info.path, true).await {
                warn!(error = %e, "orphan remove failed");
                continue;
            }
            if let Some(branch) = &info.branch {
                let _ = self.git.branch_delete(&self.repo, branch).await;
            }
            removed.push(info.path);
        }
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "worktree_tests.rs"]
mod tests;
