// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git collaborator.
//!
//! Covers exactly the surface the worktree manager and recovery engine
//! consume: worktree lifecycle (add/remove/lock/unlock/list), branch
//! deletion, merge with a no-commit precheck, and rebase. Nothing here
//! interpolates unsanitized input into a shell; arguments are passed as
//! argv entries.

mod cli;

pub use cli::CliGit;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeGit;

use async_trait::async_trait;
use pilot_core::MergeStrategy;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from git operations.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("{0}")]
    Invocation(String),
}

/// One entry from `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: Option<String>,
    pub locked_reason: Option<String>,
}

/// Result of a merge precheck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCheck {
    pub clean: bool,
    pub conflicts: Vec<PathBuf>,
}

/// Narrow git interface consumed by the core.
#[async_trait]
pub trait Git: Send + Sync {
    /// `git worktree add <path> -b <branch> <base>` (checkout included).
    async fn worktree_add(
        &self,
        repo: &Path,
        path: &Path,
        branch: &str,
        base: &str,
    ) -> Result<(), GitError>;

    /// `git worktree remove [--force] <path>`.
    async fn worktree_remove(&self, repo: &Path, path: &Path, force: bool) -> Result<(), GitError>;

    /// `git worktree lock --reason <reason> <path>`.
    async fn worktree_lock(&self, repo: &Path, path: &Path, reason: &str) -> Result<(), GitError>;

    /// `git worktree unlock <path>`.
    async fn worktree_unlock(&self, repo: &Path, path: &Path) -> Result<(), GitError>;

    /// Parsed `git worktree list --porcelain`.
    async fn worktree_list(&self, repo: &Path) -> Result<Vec<WorktreeInfo>, GitError>;

    /// `git branch -D <branch>`.
    async fn branch_delete(&self, repo: &Path, branch: &str) -> Result<(), GitError>;

    /// Conflict precheck: `merge --no-commit --no-ff` then abort. Never
    /// leaves a merge in progress.
    async fn merge_precheck(&self, repo: &Path, branch: &str) -> Result<MergeCheck, GitError>;

    /// Commit the merge with the given strategy.
    async fn merge(
        &self,
        repo: &Path,
        branch: &str,
        strategy: MergeStrategy,
        message: &str,
    ) -> Result<(), GitError>;

    /// `git merge --abort`.
    async fn merge_abort(&self, repo: &Path) -> Result<(), GitError>;

    /// `git rebase <base>` inside `dir`. Returns conflicted files on
    /// failure after aborting the rebase.
    async fn rebase(&self, dir: &Path, base: &str) -> Result<Result<(), Vec<PathBuf>>, GitError>;

    /// Conflicted paths from `git status --porcelain`.
    async fn conflicted_files(&self, dir: &Path) -> Result<Vec<PathBuf>, GitError>;
}

/// Parse `git worktree list --porcelain` output.
pub(crate) fn parse_worktree_list(output: &str) -> Vec<WorktreeInfo> {
    let mut infos = Vec::new();
    let mut current: Option<WorktreeInfo> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(info) = current.take() {
                infos.push(info);
            }
            current = Some(WorktreeInfo {
                path: PathBuf::from(path),
                branch: None,
                locked_reason: None,
            });
        } else if let Some(branch) = line.strip_prefix("branch ") {
            if let Some(info) = current.as_mut() {
                info.branch = Some(
                    branch
                        .strip_prefix("refs/heads/")
                        .unwrap_or(branch)
                        .to_string(),
                );
            }
        } else if let Some(reason) = line.strip_prefix("locked") {
            if let Some(info) = current.as_mut() {
                info.locked_reason = Some(reason.trim().to_string());
            }
        }
    }
    if let Some(info) = current.take() {
        infos.push(info);
    }
    infos
}

/// Parse conflicted paths (`UU`, `AA`, `DD`, …) out of porcelain status.
pub(crate) fn parse_conflicts(status: &str) -> Vec<PathBuf> {
    status
        .lines()
        .filter_map(|line| {
            let code = line.get(..2)?;
            let both_changed = matches!(code, "UU" | "AA" | "DD" | "AU" | "UA" | "DU" | "UD");
            if both_changed {
                Some(PathBuf::from(line.get(3..)?.trim()))
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
