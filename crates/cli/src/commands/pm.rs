// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PM supervisory loop command.

use crate::runtime::Runtime;
use anyhow::Result;
use clap::{Args, Subcommand};
use pilot_core::Role;
use pilot_engine::{PmLoop, Scheduler};
use std::sync::Arc;

#[derive(Args)]
pub struct PmArgs {
    #[command(subcommand)]
    command: PmCommand,
}

#[derive(Subcommand)]
enum PmCommand {
    /// Run the supervisory loop
    Loop {
        /// Milliseconds between scan rounds
        #[arg(long, default_value_t = 5_000)]
        tick_ms: u64,
    },
    /// Run every due scan once and print the reports
    Scan,
}

pub async fn run(runtime: Runtime, args: PmArgs) -> Result<()> {
    let registered = runtime
        .registry()
        .register(Role::Pm, "pm", std::process::id())?;
    let pm_session = registered.session.id.clone();

    let conversation = Arc::new(runtime.conversation(pm_session.clone()));
    let scheduler = Scheduler::new(
        runtime.policy.scheduler.clone(),
        runtime.policy.budget.per_agent_daily.warn_tokens,
        runtime.policy.budget.per_task.block_tokens,
    );
    let mut pm_loop = PmLoop::new(
        pm_session,
        runtime.registry().clone(),
        runtime.claims().clone(),
        runtime.worktrees().clone(),
        runtime.bus.clone(),
        runtime.budget().clone(),
        runtime.recovery().clone(),
        conversation,
        runtime.board.clone(),
        runtime.tracker().clone(),
        scheduler,
        runtime.repo.clone(),
        None,
        runtime.clock.clone(),
        runtime.policy.pm.clone(),
    );

    match args.command {
        PmCommand::Loop { tick_ms } => {
            pm_loop.run(tick_ms).await?;
            Ok(())
        }
        PmCommand::Scan => {
            for report in pm_loop.run_periodic_scans().await {
                println!(
                    "{} {}: {}",
                    if report.ok { "ok " } else { "ERR" },
                    report.scan,
                    report.detail
                );
            }
            Ok(())
        }
    }
}
