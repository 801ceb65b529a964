//! Scenario: claim exclusion and lease expiry.

use crate::prelude::World;
use pilot_core::{Role, SessionPolicy, TaskId};
use pilot_engine::ClaimOutcome;

const LEASE_30M: u64 = 30 * 60 * 1000;

#[test]
fn second_claimant_is_denied_with_holder_named() {
    let world = World::new();
    let a = world.seed_session("S-a", Role::Backend, 1000);
    let b = world.seed_session("S-b", Role::Frontend, 2000);
    let task = TaskId::new("T-1");

    assert!(world
        .claims
        .claim(&a.id, &task, LEASE_30M)
        .unwrap()
        .granted());

    match world.claims.claim(&b.id, &task, LEASE_30M).unwrap() {
        ClaimOutcome::Denied { existing } => {
            assert_eq!(existing.session_id, a.id);
            assert_eq!(existing.task_id, Some(task.clone()));
        }
        ClaimOutcome::Granted => panic!("second claim must be denied"),
    }
}

#[test]
fn lease_expiry_frees_the_task_for_the_next_claimant() {
    let world = World::new();
    let a = world.seed_session("S-a", Role::Backend, 1000);
    let b = world.seed_session("S-b", Role::Frontend, 2000);
    let task = TaskId::new("T-1");

    world.claims.claim(&a.id, &task, LEASE_30M).unwrap();
    world.clock.advance(LEASE_30M + 1);
    assert!(world
        .claims
        .claim(&b.id, &task, LEASE_30M)
        .unwrap()
        .granted());
}

#[test]
fn explicit_release_frees_the_task() {
    let world = World::new();
    let a = world.seed_session("S-a", Role::Backend, 1000);
    let b = world.seed_session("S-b", Role::Frontend, 2000);
    let task = TaskId::new("T-1");

    world.claims.claim(&a.id, &task, LEASE_30M).unwrap();
    assert_eq!(world.claims.release(&a.id).unwrap(), Some(task.clone()));
    assert!(world.claims.task_holder(&task).unwrap().is_none());
    assert!(world
        .claims
        .claim(&b.id, &task, LEASE_30M)
        .unwrap()
        .granted());
}

#[test]
fn claims_of_ended_sessions_do_not_block() {
    let world = World::new();
    let a = world.seed_session("S-a", Role::Backend, 1000);
    let b = world.seed_session("S-b", Role::Frontend, 2000);
    let task = TaskId::new("T-1");

    world.claims.claim(&a.id, &task, LEASE_30M).unwrap();
    world.registry.end_session(&a.id, "crash").unwrap();

    assert!(world
        .claims
        .claim(&b.id, &task, LEASE_30M)
        .unwrap()
        .granted());
}

#[test]
fn stale_dead_claimant_not_yet_swept_does_not_block() {
    let world = World::new();
    let a = world.seed_session("S-a", Role::Backend, 1000);
    let b = world.seed_session("S-b", Role::Frontend, 2000);
    let task = TaskId::new("T-1");

    world.claims.claim(&a.id, &task, LEASE_30M).unwrap();

    // A's assistant dies and its heartbeat goes stale, but no cleanup
    // sweep has run: the record is still status=active with a live lease.
    world.probe.kill(1000);
    world
        .clock
        .advance(SessionPolicy::default().stale_after_ms() + 1);
    // B's assistant keeps running, so B stays live despite the quiet
    // heartbeat.
    assert!(world
        .store
        .load(&a.id)
        .unwrap()
        .unwrap()
        .is_nominally_active());

    assert!(world.claims.task_holder(&task).unwrap().is_none());
    assert!(world
        .claims
        .claim(&b.id, &task, LEASE_30M)
        .unwrap()
        .granted());
}

#[test]
fn stale_claimant_with_live_process_keeps_the_claim() {
    let world = World::new();
    let a = world.seed_session("S-a", Role::Backend, 1000);
    let b = world.seed_session("S-b", Role::Frontend, 2000);
    let task = TaskId::new("T-1");

    world.claims.claim(&a.id, &task, LEASE_30M).unwrap();

    // Quiet heartbeat but running process: a long tool call, not a crash.
    world
        .clock
        .advance(SessionPolicy::default().stale_after_ms() + 1);

    match world.claims.claim(&b.id, &task, LEASE_30M).unwrap() {
        ClaimOutcome::Denied { existing } => assert_eq!(existing.session_id, a.id),
        ClaimOutcome::Granted => panic!("live-process claimant must keep the task"),
    }
}
