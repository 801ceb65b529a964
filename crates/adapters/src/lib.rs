// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pilot-adapters: external collaborators behind narrow traits.
//!
//! Every surface the substrate consumes from the outside world (the
//! process tree, git, the issue tracker, the assistant runtime, the
//! external messaging channel) is a trait with a production
//! implementation and an in-memory fake. Components receive their
//! collaborators at construction; nothing discovers a dependency at call
//! time.

pub mod assistant;
pub mod channel;
pub mod git;
pub mod process;
pub mod subprocess;
pub mod tracker;

pub use assistant::{AssistantError, AssistantRuntime, CliAssistant, SpawnSpec};
pub use channel::{Channel, FileChannel, InboundRecord, OutboundRecord};
pub use git::{CliGit, Git, GitError, MergeCheck, WorktreeInfo};
pub use process::{walk_to_assistant, ProcessProbe, SysProbe, MAX_ANCESTOR_WALK};
pub use subprocess::run_with_timeout;
pub use tracker::{BdTracker, IssueTracker, TrackerError};

#[cfg(any(test, feature = "test-support"))]
pub use assistant::FakeAssistant;
#[cfg(any(test, feature = "test-support"))]
pub use channel::FakeChannel;
#[cfg(any(test, feature = "test-support"))]
pub use git::FakeGit;
#[cfg(any(test, feature = "test-support"))]
pub use process::FakeProbe;
#[cfg(any(test, feature = "test-support"))]
pub use tracker::FakeTracker;
