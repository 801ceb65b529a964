// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! pilot - coordination substrate CLI

mod commands;
mod runtime;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{agent, bus, claim, hook, pm, status};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pilot",
    version,
    about = "Pilot - multi-agent coordination substrate"
)]
struct Cli {
    /// State directory override (defaults to $PILOT_STATE_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    /// Repository root the agents operate on
    #[arg(long, global = true, value_name = "DIR")]
    repo: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hook entrypoints invoked by the assistant runtime
    Hook(hook::HookArgs),
    /// Run the per-agent worker loop
    Agent(agent::AgentArgs),
    /// Run the PM supervisory loop
    Pm(pm::PmArgs),
    /// Show the live status board
    Status(status::StatusArgs),
    /// Operator-level bus access
    Bus(bus::BusArgs),
    /// Claim, extend, and release tasks
    Claim(claim::ClaimArgs),
    /// One-shot stale-session cleanup sweep
    Cleanup,
    /// Ledger summary
    Budget,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = runtime::Runtime::bootstrap(cli.state_dir, cli.repo)?;

    match cli.command {
        Commands::Hook(args) => hook::run(&runtime, args).await,
        Commands::Agent(args) => agent::run(runtime, args).await,
        Commands::Pm(args) => pm::run(runtime, args).await,
        Commands::Status(args) => status::run(&runtime, args),
        Commands::Bus(args) => bus::run(&runtime, args),
        Commands::Claim(args) => claim::run(&runtime, args).await,
        Commands::Cleanup => {
            let report = runtime.registry().cleanup_stale_sessions()?;
            println!(
                "zombies repaired: {}, refreshed: {}, ended: {}, archived: {}",
                report.zombies_repaired.len(),
                report.heartbeats_refreshed.len(),
                report.ended.len(),
                report.archived.len()
            );
            Ok(())
        }
        Commands::Budget => status::budget(&runtime),
    }
}
