// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manual claim management.

use crate::runtime::Runtime;
use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use pilot_core::TaskId;
use pilot_engine::ClaimOutcome;

#[derive(Args)]
pub struct ClaimArgs {
    #[command(subcommand)]
    command: ClaimCommand,
}

#[derive(Subcommand)]
enum ClaimCommand {
    /// Claim a task for this terminal's session
    Take {
        task: String,
        /// Lease duration in minutes
        #[arg(long, default_value_t = 30)]
        lease_min: u64,
    },
    /// Extend the current lease
    Extend {
        task: String,
        #[arg(long, default_value_t = 30)]
        extra_min: u64,
    },
    /// Release this session's claim
    Release,
}

pub async fn run(runtime: &Runtime, args: ClaimArgs) -> Result<()> {
    let Some(session_id) = runtime.current_session()? else {
        bail!("no session for this terminal; run the session-start hook first");
    };

    match args.command {
        ClaimCommand::Take { task, lease_min } => {
            let task = TaskId::new(task);
            match runtime
                .claims()
                .claim(&session_id, &task, lease_min * 60_000)?
            {
                ClaimOutcome::Granted => {
                    let worktree = runtime.worktrees().create(&task, &session_id).await?;
                    runtime
                        .claims()
                        .record_worktree(&session_id, worktree.clone())?;
                    if let Some(path) = worktree {
                        println!("claimed {task}; worktree at {}", path.display());
                    } else {
                        println!("claimed {task}");
                    }
                    Ok(())
                }
                ClaimOutcome::Denied { existing } => {
                    bail!(
                        "denied: task held by {} (lease expires {})",
                        existing.session_id,
                        existing
                            .lease_expires_at_ms
                            .map(|ms| ms.to_string())
                            .unwrap_or_else(|| "never".to_string())
                    );
                }
            }
        }
        ClaimCommand::Extend { task, extra_min } => {
            let extended = runtime.claims().extend(
                &session_id,
                &TaskId::new(task),
                extra_min * 60_000,
            )?;
            if !extended {
                bail!("lease not held");
            }
            println!("extended");
            Ok(())
        }
        ClaimCommand::Release => {
            if let Some(task) = runtime.claims().release(&session_id)? {
                runtime.worktrees().remove(&task).await?;
                println!("released {task}");
            } else {
                println!("nothing claimed");
            }
            Ok(())
        }
    }
}
