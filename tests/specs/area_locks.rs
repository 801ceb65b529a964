//! Scenario: area lock exclusion and the pre-edit governance check.

use crate::prelude::World;
use pilot_core::{Area, Role, SessionPolicy, TaskId};
use pilot_engine::{ClaimOutcome, EditVerdict};
use std::path::PathBuf;

#[test]
fn edit_in_foreign_locked_area_is_denied_naming_the_holder() {
    let world = World::new();
    let frontend = world.seed_session("S-f", Role::Frontend, 1000);
    let other = world.seed_session("S-g", Role::Backend, 2000);

    world
        .claims
        .claim(&other.id, &TaskId::new("T-2"), 60_000)
        .unwrap();
    assert!(world
        .claims
        .lock_area(&frontend.id, Area::Frontend)
        .unwrap()
        .granted());

    // `src/components/Button.tsx` maps to the frontend area.
    let verdict = world
        .claims
        .check_edit(&other.id, &PathBuf::from("src/components/Button.tsx"))
        .unwrap();
    match verdict {
        EditVerdict::Denied { reason } => {
            assert!(reason.contains("frontend"));
            assert!(reason.contains("S-f"));
        }
        EditVerdict::Allowed => panic!("edit must be denied"),
    }
}

#[test]
fn area_locks_release_with_the_claim() {
    let world = World::new();
    let a = world.seed_session("S-a", Role::Frontend, 1000);
    let b = world.seed_session("S-b", Role::Frontend, 2000);

    world
        .claims
        .claim(&a.id, &TaskId::new("T-1"), 60_000)
        .unwrap();
    world.claims.lock_area(&a.id, Area::Frontend).unwrap();
    assert!(matches!(
        world.claims.lock_area(&b.id, Area::Frontend).unwrap(),
        ClaimOutcome::Denied { .. }
    ));

    world.claims.release(&a.id).unwrap();
    assert!(world
        .claims
        .lock_area(&b.id, Area::Frontend)
        .unwrap()
        .granted());
}

#[test]
fn area_lock_of_stale_dead_session_does_not_block() {
    let world = World::new();
    let a = world.seed_session("S-a", Role::Frontend, 1000);
    let b = world.seed_session("S-b", Role::Frontend, 2000);

    world.claims.lock_area(&a.id, Area::Frontend).unwrap();

    // A crashes; its record is still on disk, unswept, holding the lock.
    world.probe.kill(1000);
    world
        .clock
        .advance(SessionPolicy::default().stale_after_ms() + 1);

    assert!(world.claims.area_holder(Area::Frontend).unwrap().is_none());
    assert!(world
        .claims
        .lock_area(&b.id, Area::Frontend)
        .unwrap()
        .granted());
}
