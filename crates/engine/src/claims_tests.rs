// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pilot_adapters::FakeProbe;
use pilot_core::{FakeClock, Role, SessionState};
use pilot_storage::StateLayout;
use std::path::PathBuf;
use tempfile::tempdir;

struct Fixture {
    service: ClaimService,
    store: SessionStore,
    clock: FakeClock,
    probe: FakeProbe,
    _dir: tempfile::TempDir,
}

fn fixture_with_policy(policy: Policy) -> Fixture {
    let dir = tempdir().unwrap();
    let layout = StateLayout::at(dir.path());
    let store = SessionStore::new(layout.clone());
    let clock = FakeClock::new(1_000_000);
    let probe = FakeProbe::new();
    let service = ClaimService::new(
        store.clone(),
        EventLog::new(layout),
        Arc::new(clock.clone()),
        Arc::new(probe.clone()),
        AreaMap::default(),
        policy,
    );
    Fixture {
        service,
        store,
        clock,
        probe,
        _dir: dir,
    }
}

fn fixture() -> Fixture {
    fixture_with_policy(Policy::default())
}

/// Seed a session whose heartbeat is fresh at the fixture's epoch; the
/// probe knows nothing about it, so liveness rides on the heartbeat.
fn seed_session(store: &SessionStore, id: &str, role: Role) -> SessionId {
    let session = SessionState::new(
        SessionId::new(id),
        role,
        format!("agent-{id}"),
        10,
        9,
        1_000_000,
    );
    store.save(&session).unwrap();
    session.id
}

const LEASE_30M: u64 = 30 * 60 * 1000;

#[test]
fn claim_is_exclusive_while_leased() {
    let f = fixture();
    let a = seed_session(&f.store, "S-a", Role::Backend);
    let b = seed_session(&f.store, "S-b", Role::Frontend);
    let task = TaskId::new("T-1");

    assert!(f.service.claim(&a, &task, LEASE_30M).unwrap().granted());

    match f.service.claim(&b, &task, LEASE_30M).unwrap() {
        ClaimOutcome::Denied { existing } => {
            assert_eq!(existing.session_id, a);
            assert_eq!(existing.task_id, Some(task.clone()));
        }
        ClaimOutcome::Granted => panic!("claim should be exclusive"),
    }
}

#[test]
fn lease_expiry_frees_the_task() {
    let f = fixture();
    let a = seed_session(&f.store, "S-a", Role::Backend);
    let b = seed_session(&f.store, "S-b", Role::Frontend);
    let task = TaskId::new("T-1");

    assert!(f.service.claim(&a, &task, LEASE_30M).unwrap().granted());
    f.clock.advance(LEASE_30M + 1);
    assert!(f.service.task_holder(&task).unwrap().is_none());
    assert!(f.service.claim(&b, &task, LEASE_30M).unwrap().granted());
}

#[test]
fn release_frees_task_and_locks() {
    let f = fixture();
    let a = seed_session(&f.store, "S-a", Role::Backend);
    let task = TaskId::new("T-1");

    f.service.claim(&a, &task, LEASE_30M).unwrap();
    f.service.lock_area(&a, Area::Backend).unwrap();

    let released = f.service.release(&a).unwrap();
    assert_eq!(released, Some(task.clone()));

    let session = f.store.load(&a).unwrap().unwrap();
    assert_eq!(session.claimed_task, None);
    assert!(session.locked_areas.is_empty());
    assert!(f.service.task_holder(&task).unwrap().is_none());
}

#[test]
fn reclaiming_own_task_refreshes_lease() {
    let f = fixture();
    let a = seed_session(&f.store, "S-a", Role::Backend);
    let task = TaskId::new("T-1");

    f.service.claim(&a, &task, LEASE_30M).unwrap();
    f.clock.advance(1_000);
    assert!(f.service.claim(&a, &task, LEASE_30M).unwrap().granted());

    let session = f.store.load(&a).unwrap().unwrap();
    assert_eq!(
        session.lease_expires_at_ms,
        Some(f.clock.now_ms() + LEASE_30M)
    );
}

#[test]
fn second_claim_by_same_session_is_denied_while_first_is_live() {
    let f = fixture();
    let a = seed_session(&f.store, "S-a", Role::Backend);

    f.service.claim(&a, &TaskId::new("T-1"), LEASE_30M).unwrap();
    let outcome = f.service.claim(&a, &TaskId::new("T-2"), LEASE_30M).unwrap();
    assert!(!outcome.granted());
}

#[test]
fn extend_only_while_holding() {
    let f = fixture();
    let a = seed_session(&f.store, "S-a", Role::Backend);
    let task = TaskId::new("T-1");

    assert!(!f.service.extend(&a, &task, 1_000).unwrap());

    f.service.claim(&a, &task, LEASE_30M).unwrap();
    let before = f.store.load(&a).unwrap().unwrap().lease_expires_at_ms.unwrap();
    assert!(f.service.extend(&a, &task, 5_000).unwrap());
    let after = f.store.load(&a).unwrap().unwrap().lease_expires_at_ms.unwrap();
    assert_eq!(after, before + 5_000);

    // Expired lease cannot be extended.
    f.clock.advance(LEASE_30M * 2);
    assert!(!f.service.extend(&a, &task, 5_000).unwrap());
}

#[test]
fn stale_dead_holder_does_not_block_the_next_claimant() {
    let f = fixture();
    let a = seed_session(&f.store, "S-a", Role::Backend);
    let b = seed_session(&f.store, "S-b", Role::Frontend);
    let task = TaskId::new("T-1");
    f.service.claim(&a, &task, LEASE_30M).unwrap();

    // A's heartbeat goes stale with no process behind it; no cleanup
    // sweep has run, so its record is still nominally active. The lease
    // itself is far from expiry.
    f.clock
        .advance(Policy::default().sessions.stale_after_ms() + 1);

    assert!(f.service.task_holder(&task).unwrap().is_none());
    assert!(f.service.claim(&b, &task, LEASE_30M).unwrap().granted());
}

#[test]
fn stale_holder_with_live_process_still_blocks() {
    let f = fixture();
    let a = seed_session(&f.store, "S-a", Role::Backend);
    let b = seed_session(&f.store, "S-b", Role::Frontend);

    // A's assistant is mid long tool call: quiet heartbeat, live process.
    f.probe.add_process(1500, 1, "claude");
    let mut a_state = f.store.load(&a).unwrap().unwrap();
    a_state.parent_pid = 1500;
    f.store.save(&a_state).unwrap();

    let task = TaskId::new("T-1");
    f.service.claim(&a, &task, LEASE_30M).unwrap();
    f.clock
        .advance(Policy::default().sessions.stale_after_ms() + 1);

    match f.service.claim(&b, &task, LEASE_30M).unwrap() {
        ClaimOutcome::Denied { existing } => assert_eq!(existing.session_id, a),
        ClaimOutcome::Granted => panic!("live-process holder must keep the claim"),
    }
}

#[test]
fn area_lock_is_exclusive_across_sessions() {
    let f = fixture();
    let a = seed_session(&f.store, "S-a", Role::Frontend);
    let b = seed_session(&f.store, "S-b", Role::Frontend);

    assert!(f.service.lock_area(&a, Area::Frontend).unwrap().granted());
    // Idempotent for the holder.
    assert!(f.service.lock_area(&a, Area::Frontend).unwrap().granted());

    match f.service.lock_area(&b, Area::Frontend).unwrap() {
        ClaimOutcome::Denied { existing } => assert_eq!(existing.session_id, a),
        ClaimOutcome::Granted => panic!("area lock should be exclusive"),
    }

    f.service.unlock_area(&a, Area::Frontend).unwrap();
    assert!(f.service.lock_area(&b, Area::Frontend).unwrap().granted());
}

#[test]
fn edit_denied_in_foreign_locked_area() {
    let f = fixture();
    let holder = seed_session(&f.store, "S-f", Role::Frontend);
    let editor = seed_session(&f.store, "S-g", Role::Backend);

    f.service
        .claim(&editor, &TaskId::new("T-2"), LEASE_30M)
        .unwrap();
    f.service.lock_area(&holder, Area::Frontend).unwrap();

    let verdict = f
        .service
        .check_edit(&editor, &PathBuf::from("src/components/Button.tsx"))
        .unwrap();
    match verdict {
        EditVerdict::Denied { reason } => assert!(reason.contains("S-f")),
        EditVerdict::Allowed => panic!("edit into a foreign-locked area must be denied"),
    }

    // The holder itself may edit.
    f.service
        .claim(&holder, &TaskId::new("T-1"), LEASE_30M)
        .unwrap();
    assert!(f
        .service
        .check_edit(&holder, &PathBuf::from("src/components/Button.tsx"))
        .unwrap()
        .allowed());
}

#[test]
fn edit_requires_a_claimed_task() {
    let f = fixture();
    let a = seed_session(&f.store, "S-a", Role::Backend);
    let verdict = f
        .service
        .check_edit(&a, &PathBuf::from("src/api/users.rs"))
        .unwrap();
    assert!(!verdict.allowed());

    f.service.claim(&a, &TaskId::new("T-1"), LEASE_30M).unwrap();
    assert!(f
        .service
        .check_edit(&a, &PathBuf::from("src/api/users.rs"))
        .unwrap()
        .allowed());
}

#[test]
fn never_edit_globs_deny_unconditionally() {
    let mut policy = Policy::default();
    policy.exceptions.never_edit = vec![".env*".to_string(), "secrets/**".to_string()];
    let f = fixture_with_policy(policy);
    let a = seed_session(&f.store, "S-a", Role::Backend);
    f.service.claim(&a, &TaskId::new("T-1"), LEASE_30M).unwrap();

    assert!(!f
        .service
        .check_edit(&a, &PathBuf::from(".env.local"))
        .unwrap()
        .allowed());
    assert!(!f
        .service
        .check_edit(&a, &PathBuf::from("secrets/key.pem"))
        .unwrap()
        .allowed());
}

#[test]
fn no_task_required_globs_exempt_paths() {
    let mut policy = Policy::default();
    policy.exceptions.no_task_required = vec!["docs/**".to_string()];
    let f = fixture_with_policy(policy);
    let a = seed_session(&f.store, "S-a", Role::Backend);

    assert!(f
        .service
        .check_edit(&a, &PathBuf::from("docs/notes.md"))
        .unwrap()
        .allowed());
}

#[test]
fn disabled_area_locking_skips_area_checks() {
    let mut policy = Policy::default();
    policy.areas.locking_enabled = false;
    let f = fixture_with_policy(policy);
    let holder = seed_session(&f.store, "S-f", Role::Frontend);
    let editor = seed_session(&f.store, "S-g", Role::Backend);

    f.service.lock_area(&holder, Area::Frontend).unwrap();
    f.service
        .claim(&editor, &TaskId::new("T-2"), LEASE_30M)
        .unwrap();
    assert!(f
        .service
        .check_edit(&editor, &PathBuf::from("src/components/Button.tsx"))
        .unwrap()
        .allowed());
}
