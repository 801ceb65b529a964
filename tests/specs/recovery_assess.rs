//! Scenario: recovery strategy assessment.

use crate::prelude::World;
use pilot_core::{Role, TaskId};
use pilot_engine::RecoveryStrategy;
use pilot_storage::Checkpoint;

#[test]
fn checkpoint_with_task_means_resume() {
    let world = World::new();
    let session = world.seed_session("S-dead", Role::Backend, 1000);
    world
        .checkpoints
        .save(
            &session.id,
            Checkpoint {
                task_id: Some(TaskId::new("T-x")),
                plan_step: 4,
                total_steps: 9,
                ..Checkpoint::default()
            },
            0,
        )
        .unwrap();

    let assessment = world.recovery.assess_recovery(&session.id).unwrap();
    assert_eq!(assessment.strategy, RecoveryStrategy::Resume);
    let checkpoint = assessment.checkpoint.unwrap();
    assert_eq!(checkpoint.task_id, Some(TaskId::new("T-x")));
    assert_eq!(checkpoint.plan_step, 4);
}

#[test]
fn claim_without_checkpoint_means_reassign() {
    let world = World::new();
    let mut session = world.seed_session("S-dead", Role::Backend, 1000);
    session.claimed_task = Some(TaskId::new("T-1"));
    world.store.save(&session).unwrap();

    let assessment = world.recovery.assess_recovery(&session.id).unwrap();
    assert_eq!(assessment.strategy, RecoveryStrategy::Reassign);
}

#[test]
fn neither_means_cleanup() {
    let world = World::new();
    let session = world.seed_session("S-dead", Role::Backend, 1000);
    let assessment = world.recovery.assess_recovery(&session.id).unwrap();
    assert_eq!(assessment.strategy, RecoveryStrategy::Cleanup);
}

#[test]
fn claim_transfer_preserves_worktree_and_areas() {
    let world = World::new();
    let mut dead = world.seed_session("S-dead", Role::Backend, 1000);
    dead.claimed_task = Some(TaskId::new("T-1"));
    dead.locked_areas.insert(pilot_core::Area::Backend);
    dead.worktree_path = Some(std::path::PathBuf::from("/wt/t-1"));
    world.store.save(&dead).unwrap();
    let new = world.seed_session("S-new", Role::Backend, 2000);

    assert!(world
        .recovery
        .recover_session(&dead.id, &new.id, 60_000)
        .unwrap());

    let new = world.store.load(&new.id).unwrap().unwrap();
    assert_eq!(new.claimed_task, Some(TaskId::new("T-1")));
    assert!(new.locked_areas.contains(&pilot_core::Area::Backend));
    assert_eq!(
        new.worktree_path,
        Some(std::path::PathBuf::from("/wt/t-1"))
    );
}
