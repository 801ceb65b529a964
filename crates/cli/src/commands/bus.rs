// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator-level bus access.

use crate::runtime::Runtime;
use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use pilot_core::{Clock, MessageDraft, MessageType, Priority, Role, SessionId};
use pilot_storage::ReadFilter;

#[derive(Args)]
pub struct BusArgs {
    #[command(subcommand)]
    command: BusCommand,
}

#[derive(Subcommand)]
enum BusCommand {
    /// Append a message to the bus
    Send {
        #[arg(long)]
        topic: String,
        /// Direct recipient session id, or '*' to broadcast
        #[arg(long)]
        to: Option<String>,
        /// Recipient role
        #[arg(long)]
        role: Option<String>,
        /// JSON payload
        #[arg(long, default_value = "{}")]
        data: String,
        #[arg(long)]
        blocking: bool,
    },
    /// Read new messages for a session
    Read {
        #[arg(long)]
        session: String,
        #[arg(long)]
        role: Option<String>,
    },
    /// Show dead-letter queue depth and entries
    Dlq,
}

pub fn run(runtime: &Runtime, args: BusArgs) -> Result<()> {
    let now_ms = runtime.clock.now_ms();
    match args.command {
        BusCommand::Send {
            topic,
            to,
            role,
            data,
            blocking,
        } => {
            let from = runtime
                .current_session()?
                .unwrap_or_else(|| SessionId::new("S-operator"));
            let payload: serde_json::Value = serde_json::from_str(&data)?;
            let mut draft = MessageDraft::new(from, MessageType::Notify, &topic, payload);
            if let Some(to) = to {
                if to == "*" {
                    draft.kind = MessageType::Broadcast;
                    draft = draft.broadcast();
                } else {
                    draft = draft.to_session(&SessionId::new(to));
                }
            }
            if let Some(role) = role {
                let Some(role) = Role::parse(&role) else {
                    bail!("unknown role: {role}");
                };
                draft = draft.to_role(role);
            }
            if blocking {
                draft = draft.priority(Priority::Blocking);
            }
            let msg = runtime.bus.send(draft, now_ms)?;
            println!("{} seq={}", msg.id, msg.seq);
            Ok(())
        }
        BusCommand::Read { session, role } => {
            let filter = ReadFilter {
                role: role.as_deref().and_then(Role::parse),
                agent_name: None,
            };
            let batch = runtime
                .bus
                .read_for(&SessionId::new(session), &filter, now_ms)?;
            for msg in batch {
                println!("{}", serde_json::to_string(&msg)?);
            }
            Ok(())
        }
        BusCommand::Dlq => {
            let dlq = runtime.bus.acks().dlq()?;
            println!("dlq depth: {}", dlq.len());
            for record in dlq {
                println!("{} {} at {}", record.message_id, record.reason, record.moved_at_ms);
            }
            Ok(())
        }
    }
}
