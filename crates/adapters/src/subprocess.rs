// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded subprocess execution.
//!
//! Every external program Pilot invokes carries a wall-clock budget; a
//! collaborator that hangs must never stall a scan loop. Budgets follow
//! the expected cost of the operation: worktree surgery and merges get
//! the long end, queries and tracker calls stay short.

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Budget for git worktree add/remove.
pub const WORKTREE_TIMEOUT: Duration = Duration::from_secs(30);

/// Budget for git merges and rebases.
pub const MERGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Budget for quick git queries (status, worktree list, lock/unlock).
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Budget for issue tracker commands.
pub const TRACKER_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `cmd` to completion within `budget`.
///
/// The error string names the operation so it can go straight into a
/// scan report or escalation payload. On expiry the in-flight child is
/// torn down by tokio when the future drops; nothing lingers.
pub async fn run_with_timeout(
    operation: &str,
    mut cmd: Command,
    budget: Duration,
) -> Result<Output, String> {
    let Ok(result) = tokio::time::timeout(budget, cmd.output()).await else {
        return Err(format!(
            "{operation}: no result within {}s",
            budget.as_secs()
        ));
    };
    result.map_err(|e| format!("{operation}: {e}"))
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
