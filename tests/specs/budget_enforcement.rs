//! Scenario: budget tiers over the cost ledgers.

use crate::prelude::World;
use pilot_core::{BudgetLimits, BudgetPolicy, Clock, EnforcementMode, SessionId, TaskId};
use pilot_engine::{BudgetEnforcer, BudgetStatus};
use std::sync::Arc;

fn enforcer(world: &World, enforcement: EnforcementMode) -> BudgetEnforcer {
    BudgetEnforcer::new(
        pilot_storage::CostLedger::new(world.layout.clone()),
        BudgetPolicy {
            per_task: BudgetLimits {
                warn_tokens: 2_000_000,
                block_tokens: 5_000_000,
            },
            enforcement,
            ..BudgetPolicy::default()
        },
        Arc::new(world.clock.clone()),
    )
}

#[test]
fn twenty_megabytes_on_one_task_breaches_the_block_threshold() {
    let world = World::new();
    let session = SessionId::new("S-1");
    let task = TaskId::new("T-1");

    // > 20MB of recorded output = > 5M tokens at 4 bytes/token.
    world
        .ledger
        .record_task_cost(&session, &task, 21_000_000, &world.clock.today())
        .unwrap();

    let soft = enforcer(&world, EnforcementMode::Soft);
    let verdict = soft.check_budget(&session, Some(&task)).unwrap();
    assert_eq!(verdict.status, BudgetStatus::Exceeded);
    assert!(!verdict.fatal);

    let hard = enforcer(&world, EnforcementMode::Hard);
    let verdict = hard.check_budget(&session, Some(&task)).unwrap();
    assert_eq!(verdict.status, BudgetStatus::Exceeded);
    assert!(verdict.fatal);
}

#[test]
fn warning_tier_between_warn_and_block() {
    let world = World::new();
    let session = SessionId::new("S-1");
    let task = TaskId::new("T-1");

    // 3M tokens: past warn (2M), under block (5M).
    world
        .ledger
        .record_task_cost(&session, &task, 12_000_000, &world.clock.today())
        .unwrap();

    let verdict = enforcer(&world, EnforcementMode::Hard)
        .check_budget(&session, Some(&task))
        .unwrap();
    assert_eq!(verdict.status, BudgetStatus::Warning);
    assert!(!verdict.fatal);
}

#[test]
fn today_tokens_never_decrease_within_a_day() {
    let world = World::new();
    let session = SessionId::new("S-1");
    let task = TaskId::new("T-1");
    let today = world.clock.today();

    let mut last = 0;
    for _ in 0..5 {
        world
            .ledger
            .record_task_cost(&session, &task, 4_000, &today)
            .unwrap();
        let tokens = world.ledger.agent_cost(&session).unwrap().today_tokens;
        assert!(tokens >= last);
        last = tokens;
    }
}
