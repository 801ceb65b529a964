// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine-level error type.

use pilot_adapters::{AssistantError, GitError, TrackerError};
use pilot_storage::{BusError, StoreError};
use thiserror::Error;

/// Errors that can cross component boundaries inside the engine.
///
/// Conflicts (claim held, area locked, budget exceeded) are NOT errors;
/// they are structured results on the operations that produce them. This
/// type covers genuine failures: storage, collaborators, malformed state.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Assistant(#[from] AssistantError),
    #[error("unknown session: {0}")]
    UnknownSession(String),
}
