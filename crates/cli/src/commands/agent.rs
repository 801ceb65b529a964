// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent worker loop command.

use crate::runtime::Runtime;
use anyhow::Result;
use async_trait::async_trait;
use clap::{Args, Subcommand};
use pilot_adapters::{AssistantRuntime, CliAssistant};
use pilot_core::{Role, Task};
use pilot_engine::{AgentLoop, AgentLoopDeps, NeverResolve, StepOutcome, StepReport, TaskExecutor};
use std::sync::Arc;
use tracing::warn;

#[derive(Args)]
pub struct AgentArgs {
    #[command(subcommand)]
    command: AgentCommand,
}

#[derive(Subcommand)]
enum AgentCommand {
    /// Run the worker state machine for this terminal's session
    Loop {
        #[arg(long, default_value = "backend")]
        role: String,
        #[arg(long, default_value = "agent")]
        name: String,
    },
}

/// Executor that drives the interactive assistant by prompt injection.
///
/// The assistant does the actual planning and editing; this side only
/// injects the step prompts and accounts for the injected bytes. Step
/// completion signals come back through the bus, so each injection is
/// reported as one completed step with low pressure.
struct AssistantExecutor {
    assistant: CliAssistant,
    session: pilot_core::SessionId,
}

#[async_trait]
impl TaskExecutor for AssistantExecutor {
    async fn plan(&self, task: &Task) -> Result<Vec<String>, String> {
        let prompt = format!(
            "Plan the work for task {}: {}\n{}",
            task.id, task.title, task.description
        );
        self.assistant
            .inject(&self.session, &prompt)
            .await
            .map_err(|e| e.to_string())?;
        Ok(vec![format!("Work through task {}", task.id)])
    }

    async fn run_step(&self, task: &Task, step: u32) -> StepReport {
        let prompt = format!("Continue task {} (step {}).", task.id, step + 1);
        match self.assistant.inject(&self.session, &prompt).await {
            Ok(()) => {
                // Results, decisions, and findings flow back through the
                // bus and the hooks; the injection side only accounts for
                // the prompt itself.
                let mut report = StepReport::new(StepOutcome::Completed, &prompt);
                report.result = "prompt injected".to_string();
                report.output_bytes = prompt.len() as u64;
                report
            }
            Err(e) => {
                warn!(error = %e, "prompt injection failed");
                let mut report = StepReport::new(StepOutcome::Error(e.to_string()), prompt);
                report.tool_calls = 0;
                report
            }
        }
    }
}

pub async fn run(runtime: Runtime, args: AgentArgs) -> Result<()> {
    match args.command {
        AgentCommand::Loop { role, name } => {
            let role = Role::parse(&role).unwrap_or(Role::Backend);
            let registered = runtime
                .registry()
                .register(role, &name, std::process::id())?;
            let session_id = registered.session.id.clone();

            let executor = Arc::new(AssistantExecutor {
                assistant: CliAssistant::new(runtime.policy.sessions.assistant_process.clone()),
                session: session_id.clone(),
            });

            let deps = AgentLoopDeps {
                claims: runtime.claims().clone(),
                worktrees: runtime.worktrees().clone(),
                bus: runtime.bus.clone(),
                tracker: runtime.tracker().clone(),
                checkpoints: runtime.checkpoints.clone(),
                budget: runtime.budget().clone(),
                board: runtime.board.clone(),
                recovery: runtime.recovery().clone(),
                events: runtime.events.clone(),
                executor,
                // The semantic resolver is an external collaborator; the
                // shipped default escalates every conflict, so flipping
                // `worktree.auto_resolve` on only matters once a real
                // resolver is plugged in here.
                resolver: Arc::new(NeverResolve),
                clock: runtime.clock.clone(),
                policy: runtime.policy.agent_loop.clone(),
            };

            let mut agent_loop = AgentLoop::new(session_id, role, deps);
            agent_loop.run().await?;
            Ok(())
        }
    }
}
