// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status board and budget rendering.

use crate::runtime::Runtime;
use anyhow::Result;
use clap::Args;
use pilot_core::Clock;
use pilot_storage::AgentActivity;

#[derive(Args)]
pub struct StatusArgs {
    /// Emit the raw board as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(runtime: &Runtime, args: StatusArgs) -> Result<()> {
    let sessions = runtime.registry().get_active_sessions(None)?;
    let board: std::collections::HashMap<String, _> = runtime
        .board
        .board()?
        .into_iter()
        .map(|(id, p)| (id.to_string(), p))
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&board)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("No active sessions");
        return Ok(());
    }
    for session in sessions {
        let progress = board.get(session.id.as_str());
        let activity = progress
            .map(|p| match p.status {
                AgentActivity::Idle => "idle",
                AgentActivity::Working => "working",
                AgentActivity::Blocked => "blocked",
            })
            .unwrap_or("unknown");
        let task = session
            .claimed_task
            .as_ref()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string());
        let step = progress
            .map(|p| format!("{}/{}", p.step, p.total_steps))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<10} {:<10} {:<12} {}",
            session.id.as_str(),
            session.role,
            activity,
            task,
            step
        );
    }
    Ok(())
}

pub fn budget(runtime: &Runtime) -> Result<()> {
    let today = runtime.clock.today();
    let ledger = runtime.budget().ledger();
    let daily = ledger.daily_cost(&today)?;
    println!("tokens today ({today}): {}", daily.total_tokens);
    for session in runtime.registry().get_active_sessions(None)? {
        let cost = ledger.agent_cost(&session.id)?;
        println!(
            "{:<24} today {:<10} lifetime {}",
            session.id.as_str(),
            cost.today_tokens_on(&today),
            cost.total_tokens
        );
    }
    Ok(())
}
