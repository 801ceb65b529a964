// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-hook entry shims.
//!
//! These run inside the assistant's hook sandbox: they must be fast,
//! silent on success, and never raise; the verdict (for pre-edit) is a
//! single JSON object on stdout.

use crate::runtime::Runtime;
use anyhow::Result;
use clap::{Args, Subcommand};
use pilot_core::Role;
use std::path::PathBuf;

#[derive(Args)]
pub struct HookArgs {
    #[command(subcommand)]
    command: HookCommand,
}

#[derive(Subcommand)]
enum HookCommand {
    /// SessionStart: register (or resurrect) this terminal's session
    SessionStart {
        #[arg(long, default_value = "backend")]
        role: String,
        #[arg(long, default_value = "agent")]
        agent_name: String,
    },
    /// Periodic heartbeat
    Heartbeat,
    /// SessionEnd: end this terminal's session
    SessionEnd {
        #[arg(long, default_value = "user_exit")]
        reason: String,
    },
    /// PreEdit governance check; prints an allow/deny verdict
    PreEdit {
        #[arg(long)]
        file: PathBuf,
    },
}

pub async fn run(runtime: &Runtime, args: HookArgs) -> Result<()> {
    let hook_pid = std::process::id();
    match args.command {
        HookCommand::SessionStart { role, agent_name } => {
            let role = Role::parse(&role).unwrap_or(Role::Backend);
            let registered = runtime.registry().register(role, &agent_name, hook_pid)?;
            println!(
                "{}",
                serde_json::json!({
                    "session_id": registered.session.id,
                    "resurrected": registered.resurrected,
                })
            );
            Ok(())
        }
        HookCommand::Heartbeat => {
            runtime.registry().heartbeat(hook_pid)?;
            Ok(())
        }
        HookCommand::SessionEnd { reason } => {
            if let Some(session_id) = runtime.current_session()? {
                runtime.claims().release(&session_id)?;
                runtime.registry().end_session(&session_id, &reason)?;
            }
            Ok(())
        }
        HookCommand::PreEdit { file } => {
            let Some(session_id) = runtime.current_session()? else {
                println!(
                    "{}",
                    serde_json::json!({ "verdict": "denied", "reason": "no session" })
                );
                std::process::exit(2);
            };
            let verdict = runtime.claims().check_edit(&session_id, &file)?;
            println!("{}", serde_json::to_string(&verdict)?);
            if !verdict.allowed() {
                std::process::exit(2);
            }
            Ok(())
        }
    }
}
