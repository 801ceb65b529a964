// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pilot_core::Role;

#[test]
fn paths_hang_off_the_root() {
    let layout = StateLayout::at("/tmp/pilot-test");
    let sid = SessionId::new("S-1-aaaa");

    assert_eq!(
        layout.session_file(&sid),
        PathBuf::from("/tmp/pilot-test/state/sessions/S-1-aaaa.json")
    );
    assert_eq!(
        layout.lockfile(&sid),
        PathBuf::from("/tmp/pilot-test/state/locks/S-1-aaaa.lock")
    );
    assert_eq!(
        layout.bus_file(),
        PathBuf::from("/tmp/pilot-test/bus/bus.jsonl")
    );
    assert_eq!(
        layout.checkpoint_file(&sid),
        PathBuf::from("/tmp/pilot-test/memory/agents/S-1-aaaa/checkpoint.json")
    );
    assert_eq!(
        layout.task_cost_file(&TaskId::new("T-1")),
        PathBuf::from("/tmp/pilot-test/state/costs/tasks/T-1.json")
    );
    assert_eq!(
        layout.daily_cost_file("2026-08-01"),
        PathBuf::from("/tmp/pilot-test/state/costs/daily/2026-08-01.json")
    );
    assert_eq!(
        layout.role_memory_file(Role::Backend),
        PathBuf::from("/tmp/pilot-test/memory/roles/backend.jsonl")
    );
}

#[test]
#[serial_test::serial]
fn resolve_honors_env_override() {
    std::env::set_var("PILOT_STATE_DIR", "/tmp/pilot-env-test");
    let layout = StateLayout::resolve();
    assert_eq!(layout.root(), Path::new("/tmp/pilot-env-test"));
    std::env::remove_var("PILOT_STATE_DIR");
}
