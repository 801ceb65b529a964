// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git CLI implementation.

use super::{parse_conflicts, parse_worktree_list, Git, GitError, MergeCheck, WorktreeInfo};
use crate::subprocess::{run_with_timeout, MERGE_TIMEOUT, QUERY_TIMEOUT, WORKTREE_TIMEOUT};
use async_trait::async_trait;
use pilot_core::MergeStrategy;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Production git adapter shelling out to `git`.
#[derive(Debug, Clone, Default)]
pub struct CliGit;

impl CliGit {
    async fn git(
        &self,
        dir: &Path,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output, GitError> {
        debug!(dir = %dir.display(), ?args, "git");
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(dir);
        run_with_timeout(&format!("git {}", args.join(" ")), cmd, timeout)
            .await
            .map_err(GitError::Invocation)
    }

    async fn git_ok(
        &self,
        dir: &Path,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output, GitError> {
        let output = self.git(dir, args, timeout).await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(GitError::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl Git for CliGit {
    async fn worktree_add(
        &self,
        repo: &Path,
        path: &Path,
        branch: &str,
        base: &str,
    ) -> Result<(), GitError> {
        let path_str = path.to_string_lossy();
        self.git_ok(
            repo,
            &["worktree", "add", path_str.as_ref(), "-b", branch, base],
            WORKTREE_TIMEOUT,
        )
        .await
        .map(drop)
    }

    async fn worktree_remove(&self, repo: &Path, path: &Path, force: bool) -> Result<(), GitError> {
        let path_str = path.to_string_lossy();
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(path_str.as_ref());
        self.git_ok(repo, &args, WORKTREE_TIMEOUT).await.map(drop)
    }

    async fn worktree_lock(&self, repo: &Path, path: &Path, reason: &str) -> Result<(), GitError> {
        let path_str = path.to_string_lossy();
        self.git_ok(
            repo,
            &["worktree", "lock", "--reason", reason, path_str.as_ref()],
            QUERY_TIMEOUT,
        )
        .await
        .map(drop)
    }

    async fn worktree_unlock(&self, repo: &Path, path: &Path) -> Result<(), GitError> {
        let path_str = path.to_string_lossy();
        self.git_ok(repo, &["worktree", "unlock", path_str.as_ref()], QUERY_TIMEOUT)
            .await
            .map(drop)
    }

    async fn worktree_list(&self, repo: &Path) -> Result<Vec<WorktreeInfo>, GitError> {
        let output = self
            .git_ok(repo, &["worktree", "list", "--porcelain"], QUERY_TIMEOUT)
            .await?;
        Ok(parse_worktree_list(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn branch_delete(&self, repo: &Path, branch: &str) -> Result<(), GitError> {
        self.git_ok(repo, &["branch", "-D", branch], QUERY_TIMEOUT)
            .await
            .map(drop)
    }

    async fn merge_precheck(&self, repo: &Path, branch: &str) -> Result<MergeCheck, GitError> {
        let output = self
            .git(
                repo,
                &["merge", "--no-commit", "--no-ff", branch],
                MERGE_TIMEOUT,
            )
            .await?;

        let conflicts = if output.status.success() {
            Vec::new()
        } else {
            self.conflicted_files(repo).await?
        };

        // Always abort: the precheck must leave no merge in progress. A
        // failure here is benign when nothing was started.
        let _ = self
            .git(repo, &["merge", "--abort"], MERGE_TIMEOUT)
            .await;

        Ok(MergeCheck {
            clean: output.status.success(),
            conflicts,
        })
    }

    async fn merge(
        &self,
        repo: &Path,
        branch: &str,
        strategy: MergeStrategy,
        message: &str,
    ) -> Result<(), GitError> {
        match strategy {
            MergeStrategy::Squash => {
                self.git_ok(repo, &["merge", "--squash", branch], MERGE_TIMEOUT)
                    .await?;
                self.git_ok(repo, &["commit", "-m", message], MERGE_TIMEOUT)
                    .await
                    .map(drop)
            }
            MergeStrategy::NoFf => self
                .git_ok(
                    repo,
                    &["merge", "--no-ff", "-m", message, branch],
                    MERGE_TIMEOUT,
                )
                .await
                .map(drop),
        }
    }

    async fn merge_abort(&self, repo: &Path) -> Result<(), GitError> {
        self.git_ok(repo, &["merge", "--abort"], MERGE_TIMEOUT)
            .await
            .map(drop)
    }

    async fn rebase(&self, dir: &Path, base: &str) -> Result<Result<(), Vec<PathBuf>>, GitError> {
        let output = self.git(dir, &["rebase", base], MERGE_TIMEOUT).await?;
        if output.status.success() {
            return Ok(Ok(()));
        }
        let conflicts = self.conflicted_files(dir).await?;
        let _ = self
            .git(dir, &["rebase", "--abort"], MERGE_TIMEOUT)
            .await;
        Ok(Err(conflicts))
    }

    async fn conflicted_files(&self, dir: &Path) -> Result<Vec<PathBuf>, GitError> {
        let output = self
            .git_ok(dir, &["status", "--porcelain"], QUERY_TIMEOUT)
            .await?;
        Ok(parse_conflicts(&String::from_utf8_lossy(&output.stdout)))
    }
}
