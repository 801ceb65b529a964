// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable in-memory git for tests.

use super::{Git, GitError, MergeCheck, WorktreeInfo};
use async_trait::async_trait;
use parking_lot::Mutex;
use pilot_core::MergeStrategy;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default)]
struct FakeGitState {
    worktrees: HashMap<PathBuf, WorktreeInfo>,
    branches: HashSet<String>,
    /// Branches scripted to conflict on merge/rebase, with their files.
    conflicts: HashMap<String, Vec<PathBuf>>,
    /// Branches whose conflict is consumed by the first precheck, as if a
    /// resolver applied fixes afterward.
    conflicts_once: HashMap<String, Vec<PathBuf>>,
    rebase_conflicts: Vec<PathBuf>,
    merged: Vec<(String, MergeStrategy)>,
    calls: Vec<String>,
}

/// In-memory git double recording every call.
#[derive(Debug, Clone, Default)]
pub struct FakeGit {
    state: Arc<Mutex<FakeGitState>>,
}

impl FakeGit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `branch` to conflict on merge precheck with `files`.
    pub fn conflict_on(&self, branch: &str, files: &[&str]) {
        self.state
            .lock()
            .conflicts
            .insert(branch.to_string(), files.iter().map(PathBuf::from).collect());
    }

    /// Script a conflict that clears after one precheck (a resolution was
    /// applied); the following merge succeeds.
    pub fn conflict_once(&self, branch: &str, files: &[&str]) {
        self.state
            .lock()
            .conflicts_once
            .insert(branch.to_string(), files.iter().map(PathBuf::from).collect());
    }

    /// Script the next rebase to conflict with `files`.
    pub fn conflict_on_rebase(&self, files: &[&str]) {
        self.state.lock().rebase_conflicts = files.iter().map(PathBuf::from).collect();
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn merged(&self) -> Vec<(String, MergeStrategy)> {
        self.state.lock().merged.clone()
    }

    pub fn has_branch(&self, branch: &str) -> bool {
        self.state.lock().branches.contains(branch)
    }

    fn record(&self, call: String) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl Git for FakeGit {
    async fn worktree_add(
        &self,
        _repo: &Path,
        path: &Path,
        branch: &str,
        base: &str,
    ) -> Result<(), GitError> {
        self.record(format!("worktree_add {} {branch} {base}", path.display()));
        let mut state = self.state.lock();
        if state.branches.contains(branch) {
            return Err(GitError::CommandFailed {
                command: format!("worktree add -b {branch}"),
                stderr: format!("fatal: a branch named '{branch}' already exists"),
            });
        }
        state.branches.insert(branch.to_string());
        state.worktrees.insert(
            path.to_owned(),
            WorktreeInfo {
                path: path.to_owned(),
                branch: Some(branch.to_string()),
                locked_reason: None,
            },
        );
        Ok(())
    }

    async fn worktree_remove(&self, _repo: &Path, path: &Path, force: bool) -> Result<(), GitError> {
        self.record(format!("worktree_remove {} force={force}", path.display()));
        let mut state = self.state.lock();
        if state.worktrees.remove(path).is_none() {
            return Err(GitError::CommandFailed {
                command: "worktree remove".to_string(),
                stderr: format!("fatal: '{}' is not a working tree", path.display()),
            });
        }
        Ok(())
    }

    async fn worktree_lock(&self, _repo: &Path, path: &Path, reason: &str) -> Result<(), GitError> {
        self.record(format!("worktree_lock {} {reason}", path.display()));
        let mut state = self.state.lock();
        match state.worktrees.get_mut(path) {
            Some(info) => {
                info.locked_reason = Some(reason.to_string());
                Ok(())
            }
            None => Err(GitError::CommandFailed {
                command: "worktree lock".to_string(),
                stderr: "no such worktree".to_string(),
            }),
        }
    }

    async fn worktree_unlock(&self, _repo: &Path, path: &Path) -> Result<(), GitError> {
        self.record(format!("worktree_unlock {}", path.display()));
        let mut state = self.state.lock();
        if let Some(info) = state.worktrees.get_mut(path) {
            info.locked_reason = None;
        }
        Ok(())
    }

    async fn worktree_list(&self, _repo: &Path) -> Result<Vec<WorktreeInfo>, GitError> {
        let state = self.state.lock();
        let mut list: Vec<WorktreeInfo> = state.worktrees.values().cloned().collect();
        list.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(list)
    }

    async fn branch_delete(&self, _repo: &Path, branch: &str) -> Result<(), GitError> {
        self.record(format!("branch_delete {branch}"));
        self.state.lock().branches.remove(branch);
        Ok(())
    }

    async fn merge_precheck(&self, _repo: &Path, branch: &str) -> Result<MergeCheck, GitError> {
        self.record(format!("merge_precheck {branch}"));
        let mut state = self.state.lock();
        if let Some(files) = state.conflicts_once.remove(branch) {
            return Ok(MergeCheck {
                clean: false,
                conflicts: files,
            });
        }
        match state.conflicts.get(branch) {
            Some(files) => Ok(MergeCheck {
                clean: false,
                conflicts: files.clone(),
            }),
            None => Ok(MergeCheck {
                clean: true,
                conflicts: Vec::new(),
            }),
        }
    }

    async fn merge(
        &self,
        _repo: &Path,
        branch: &str,
        strategy: MergeStrategy,
        _message: &str,
    ) -> Result<(), GitError> {
        self.record(format!("merge {branch}"));
        let mut state = self.state.lock();
        if state.conflicts.contains_key(branch) {
            return Err(GitError::CommandFailed {
                command: format!("merge {branch}"),
                stderr: "CONFLICT (content)".to_string(),
            });
        }
        state.merged.push((branch.to_string(), strategy));
        Ok(())
    }

    async fn merge_abort(&self, _repo: &Path) -> Result<(), GitError> {
        self.record("merge_abort".to_string());
        Ok(())
    }

    async fn rebase(&self, _dir: &Path, base: &str) -> Result<Result<(), Vec<PathBuf>>, GitError> {
        self.record(format!("rebase {base}"));
        let state = self.state.lock();
        if state.rebase_conflicts.is_empty() {
            Ok(Ok(()))
        } else {
            Ok(Err(state.rebase_conflicts.clone()))
        }
    }

    async fn conflicted_files(&self, _dir: &Path) -> Result<Vec<PathBuf>, GitError> {
        Ok(self.state.lock().rebase_conflicts.clone())
    }
}
