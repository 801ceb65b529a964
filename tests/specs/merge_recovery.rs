//! Scenario: merge-conflict recovery rebases, then escalates.

use crate::prelude::World;
use pilot_core::{Priority, Role, SessionId, TaskId};
use pilot_engine::MergeConflictOutcome;
use pilot_storage::ReadFilter;
use std::path::PathBuf;

#[tokio::test]
async fn clean_rebase_needs_no_escalation() {
    let world = World::new();
    let session = world.seed_session("S-1", Role::Backend, 1000);

    let outcome = world
        .recovery
        .recover_merge_conflict(&session, &PathBuf::from("/wt/t-1"))
        .await
        .unwrap();
    assert_eq!(outcome, MergeConflictOutcome::RebasedClean);
    assert!(world.memory.entries(Role::Backend).unwrap().is_empty());
}

#[tokio::test]
async fn conflicted_rebase_records_memory_and_blocks_on_the_pm() {
    let world = World::new();
    let mut session = world.seed_session("S-1", Role::Backend, 1000);
    session.claimed_task = Some(TaskId::new("T-1"));
    world.store.save(&session).unwrap();
    let session = world.store.load(&session.id).unwrap().unwrap();

    world.git.conflict_on_rebase(&["src/api/users.rs", "src/db/schema.rs"]);

    let outcome = world
        .recovery
        .recover_merge_conflict(&session, &PathBuf::from("/wt/t-1"))
        .await
        .unwrap();
    match outcome {
        MergeConflictOutcome::Escalated { conflicts } => {
            assert_eq!(conflicts.len(), 2);
        }
        other => panic!("expected escalation, got {other:?}"),
    }

    // The failure was remembered for this role.
    let entries = world.memory.entries(Role::Backend).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].pattern.contains("src/api/users.rs"));

    // And the PM got a blocking request with the conflict list.
    let batch = world
        .bus
        .read_for(
            &SessionId::new("S-pm"),
            &ReadFilter {
                role: Some(Role::Pm),
                agent_name: None,
            },
            0,
        )
        .unwrap();
    let escalation = batch
        .iter()
        .find(|m| m.topic == "recovery.merge_conflict")
        .expect("blocking PM request");
    assert_eq!(escalation.priority, Priority::Blocking);
}
