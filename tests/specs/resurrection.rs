//! Scenario: register, end, register again from the same terminal.

use crate::prelude::World;
use pilot_core::{Role, SessionStatus};

#[test]
fn same_parent_pid_resurrects_the_session() {
    let world = World::new();

    let first = world.register_terminal(200, Role::Backend, "ada");
    world
        .registry
        .end_session(&first.id, "user_exit")
        .unwrap();
    assert_eq!(
        world.store.load(&first.id).unwrap().unwrap().status,
        SessionStatus::Ended
    );

    // New hook invocation, same assistant process.
    world.probe.add_process(203, 201, "pilot");
    let second = world.registry.register(Role::Backend, "ada", 203).unwrap();

    assert!(second.resurrected);
    assert_eq!(second.session.id, first.id);
    assert_eq!(second.session.status, SessionStatus::Active);
    // Lockfile is back.
    assert!(world.store.read_lockfile(&first.id).unwrap().is_some());
}

#[test]
fn register_twice_without_ending_keeps_one_session_per_terminal() {
    let world = World::new();

    let a = world.register_terminal(200, Role::Backend, "ada");
    let b = world.register_terminal(300, Role::Frontend, "lin");
    assert_ne!(a.id, b.id);

    let active = world.registry.get_active_sessions(None).unwrap();
    assert_eq!(active.len(), 2);
}

#[test]
fn ending_a_session_cleans_cursor_and_board() {
    let world = World::new();
    let session = world.register_terminal(200, Role::Backend, "ada");

    // Give the session a cursor by reading once.
    world
        .bus
        .read_for(&session.id, &pilot_storage::ReadFilter::default(), 0)
        .unwrap();
    assert!(world.layout.cursor_file(&session.id).exists());

    world.registry.end_session(&session.id, "done").unwrap();
    assert!(!world.layout.cursor_file(&session.id).exists());
    assert!(!world.layout.lockfile(&session.id).exists());
}
