// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pilot-storage: filesystem repositories for the Pilot substrate.
//!
//! Every entity (sessions, messages, checkpoints, ledgers, events, the
//! context board) has one repository owning its reads and writes. Whole
//! files are replaced with write-temp-then-rename; JSONL files take one
//! logical record per append call. Readers tolerate a corrupt line by
//! skipping it with a warning rather than failing the sweep.

pub mod acks;
pub mod bus;
pub mod checkpoint;
pub mod context;
pub mod cost;
pub mod event_log;
pub mod fsutil;
pub mod layout;
pub mod memory;
pub mod session_store;

pub use acks::{AckRegistry, DlqRecord, PendingAck, TimeoutOutcome, MAX_ACK_RETRIES};
pub use bus::{BusError, Cursor, MessageBus, ReadFilter};
pub use checkpoint::{
    build_restoration_prompt, Checkpoint, CheckpointStore, CompletedStep, HISTORY_KEEP,
};
pub use context::{AgentActivity, AgentProgress, ContextBoard};
pub use cost::{AgentCost, CostLedger, DailyCost, Efficiency, TaskCost, BYTES_PER_TOKEN};
pub use event_log::EventLog;
pub use fsutil::StoreError;
pub use layout::StateLayout;
pub use memory::{MemoryEntry, RoleMemory};
pub use session_store::{Lockfile, SessionStore};
