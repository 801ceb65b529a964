// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-tree probing.
//!
//! Liveness is PID-anchored: a session is alive while its recorded
//! assistant process is. The probe also supports the bounded ancestor walk
//! that resolves which interactive-assistant process a hook invocation
//! belongs to, the lever that keeps multiple terminals from collapsing
//! onto a single session.

mod sys;

pub use sys::SysProbe;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeProbe;

/// Ancestor levels examined when resolving the assistant process.
pub const MAX_ANCESTOR_WALK: usize = 10;

/// Read-only view of the process tree.
pub trait ProcessProbe: Send + Sync {
    /// Whether `pid` is running. Permission errors on the probe count as
    /// alive (the process exists, we just cannot signal it); only a
    /// definitive no-such-process counts as dead.
    fn is_alive(&self, pid: u32) -> bool;

    /// Parent PID of `pid`, when the process exists.
    fn parent_of(&self, pid: u32) -> Option<u32>;

    /// Command name of `pid`, when the process exists.
    fn command_of(&self, pid: u32) -> Option<String>;
}

/// Walk up from `start_pid` looking for the first ancestor whose command
/// contains `assistant_name` (case-insensitive). Bounded to
/// [`MAX_ANCESTOR_WALK`] levels; returns `start_pid` itself when it
/// matches. Falls back to `None` when no ancestor matches.
pub fn walk_to_assistant(
    probe: &dyn ProcessProbe,
    start_pid: u32,
    assistant_name: &str,
) -> Option<u32> {
    let needle = assistant_name.to_ascii_lowercase();
    let mut pid = start_pid;
    for _ in 0..MAX_ANCESTOR_WALK {
        if let Some(command) = probe.command_of(pid) {
            if command.to_ascii_lowercase().contains(&needle) {
                return Some(pid);
            }
        }
        match probe.parent_of(pid) {
            // PID 1 is the end of the line.
            Some(parent) if parent > 1 => pid = parent,
            _ => return None,
        }
    }
    None
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
