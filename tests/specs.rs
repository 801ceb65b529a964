//! Behavioral specifications for the Pilot substrate.
//!
//! These tests drive the public component APIs end-to-end against a real
//! temp state directory, with fake process/git/tracker/channel
//! collaborators standing in for the outside world.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/resurrection.rs"]
mod resurrection;

#[path = "specs/claims.rs"]
mod claims;

#[path = "specs/area_locks.rs"]
mod area_locks;

#[path = "specs/bus_priority.rs"]
mod bus_priority;

#[path = "specs/ack_escalation.rs"]
mod ack_escalation;

#[path = "specs/recovery_assess.rs"]
mod recovery_assess;

#[path = "specs/merge_recovery.rs"]
mod merge_recovery;

#[path = "specs/budget_enforcement.rs"]
mod budget_enforcement;
