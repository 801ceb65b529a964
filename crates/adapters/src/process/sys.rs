// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production process probe.
//!
//! Liveness uses `kill(pid, 0)`: success or `EPERM` means the process
//! exists, `ESRCH` means it does not. Ancestry and command names come from
//! `/proc` on Linux with a `ps` fallback elsewhere.

use super::ProcessProbe;

/// Probe backed by the live process table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysProbe;

impl ProcessProbe for SysProbe {
    fn is_alive(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        #[allow(unsafe_code)]
        let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
        if rc == 0 {
            return true;
        }
        // EPERM: the process exists but belongs to someone else.
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    fn parent_of(&self, pid: u32) -> Option<u32> {
        if let Some((ppid, _)) = read_proc_stat(pid) {
            return Some(ppid);
        }
        ps_field(pid, "ppid=").and_then(|s| s.trim().parse().ok())
    }

    fn command_of(&self, pid: u32) -> Option<String> {
        if let Some((_, comm)) = read_proc_stat(pid) {
            return Some(comm);
        }
        ps_field(pid, "comm=").map(|s| s.trim().to_string())
    }
}

/// Parse `(ppid, comm)` out of `/proc/<pid>/stat`.
///
/// The comm field is parenthesized and may itself contain spaces or
/// parentheses, so fields are split after the *last* closing paren.
fn read_proc_stat(pid: u32) -> Option<(u32, String)> {
    let text = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    let open = text.find('(')?;
    let close = text.rfind(')')?;
    let comm = text.get(open + 1..close)?.to_string();
    let rest = text.get(close + 2..)?;
    // rest: "<state> <ppid> ..."
    let ppid = rest.split_whitespace().nth(1)?.parse().ok()?;
    Some((ppid, comm))
}

/// `ps -o <field> -p <pid>` fallback for non-procfs platforms.
fn ps_field(pid: u32, field: &str) -> Option<String> {
    let output = std::process::Command::new("ps")
        .args(["-o", field, "-p", &pid.to_string()])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
#[path = "sys_tests.rs"]
mod tests;
