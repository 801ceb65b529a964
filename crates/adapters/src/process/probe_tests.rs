// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn walk_finds_assistant_ancestor() {
    let probe = FakeProbe::new();
    // init -> terminal -> claude -> zsh -> hook
    probe.add_process(1, 0, "init");
    probe.add_process(100, 1, "alacritty");
    probe.add_process(200, 100, "claude");
    probe.add_process(300, 200, "zsh");
    probe.add_process(400, 300, "pilot-hook");

    assert_eq!(walk_to_assistant(&probe, 400, "claude"), Some(200));
}

#[test]
fn walk_matches_start_pid_itself() {
    let probe = FakeProbe::new();
    probe.add_process(200, 1, "Claude Code");
    assert_eq!(walk_to_assistant(&probe, 200, "claude"), Some(200));
}

#[test]
fn walk_is_case_insensitive() {
    let probe = FakeProbe::new();
    probe.add_process(10, 1, "CLAUDE");
    probe.add_process(20, 10, "sh");
    assert_eq!(walk_to_assistant(&probe, 20, "claude"), Some(10));
}

#[test]
fn walk_gives_up_without_match() {
    let probe = FakeProbe::new();
    probe.add_process(1, 0, "init");
    probe.add_process(10, 1, "sshd");
    probe.add_process(20, 10, "bash");
    assert_eq!(walk_to_assistant(&probe, 20, "claude"), None);
}

#[test]
fn walk_is_bounded() {
    let probe = FakeProbe::new();
    // A chain longer than the walk limit with the assistant at the top.
    let depth = (MAX_ANCESTOR_WALK + 3) as u32;
    probe.add_process(2, 1, "claude");
    for i in 3..=depth + 2 {
        probe.add_process(i, i - 1, "sh");
    }
    assert_eq!(walk_to_assistant(&probe, depth + 2, "claude"), None);
}

#[test]
fn fake_probe_reports_dead_processes() {
    let probe = FakeProbe::new();
    probe.add_process(5, 1, "claude");
    assert!(probe.is_alive(5));
    probe.kill(5);
    assert!(!probe.is_alive(5));
    assert_eq!(probe.parent_of(5), None);
    assert_eq!(probe.command_of(5), None);
}
