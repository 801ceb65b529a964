// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

fn memory(dir: &std::path::Path) -> RoleMemory {
    RoleMemory::new(StateLayout::at(dir))
}

fn entry(pattern: &str, resolution: Option<&str>, at: u64) -> MemoryEntry {
    MemoryEntry {
        pattern: pattern.to_string(),
        task_id: None,
        resolution: resolution.map(String::from),
        recorded_at_ms: at,
    }
}

#[test]
fn record_and_list_per_role() {
    let dir = tempdir().unwrap();
    let memory = memory(dir.path());

    memory
        .record(Role::Testing, &entry("assertion failed: balance", None, 1))
        .unwrap();
    memory
        .record(Role::Backend, &entry("connection refused", None, 2))
        .unwrap();

    assert_eq!(memory.entries(Role::Testing).unwrap().len(), 1);
    assert_eq!(memory.entries(Role::Backend).unwrap().len(), 1);
    assert!(memory.entries(Role::Frontend).unwrap().is_empty());
}

#[test]
fn lookup_prefers_latest_resolved_match() {
    let dir = tempdir().unwrap();
    let memory = memory(dir.path());

    memory
        .record(Role::Testing, &entry("timeout waiting for server", None, 1))
        .unwrap();
    memory
        .record(
            Role::Testing,
            &entry("timeout waiting for server", Some("raise the readiness probe delay"), 2),
        )
        .unwrap();

    let hit = memory
        .lookup_resolution(Role::Testing, "timeout waiting for server on port 8080")
        .unwrap()
        .unwrap();
    assert_eq!(hit.resolution.as_deref(), Some("raise the readiness probe delay"));
}

#[test]
fn lookup_misses_unresolved_or_unrelated() {
    let dir = tempdir().unwrap();
    let memory = memory(dir.path());
    memory
        .record(Role::Testing, &entry("flaky dns", None, 1))
        .unwrap();

    assert!(memory
        .lookup_resolution(Role::Testing, "flaky dns")
        .unwrap()
        .is_none());
    assert!(memory
        .lookup_resolution(Role::Testing, "segfault")
        .unwrap()
        .is_none());
}
