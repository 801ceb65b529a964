//! Scenario: ACK timeout exhaustion escalates to the PM and dead-letters.

use crate::prelude::World;
use pilot_core::{Priority, Role, SessionId};
use pilot_storage::{ReadFilter, TimeoutOutcome, MAX_ACK_RETRIES};

#[test]
fn exhausted_retries_move_to_dlq_with_pm_escalation() {
    let world = World::new();
    let from = SessionId::new("S-1");
    let to = SessionId::new("S-2");

    let request = world
        .bus
        .send_blocking_request(&from, &to, "stuck on review", 1_000, 0)
        .unwrap();

    // Burn retries: each sweep past the deadline bumps the counter.
    let mut now = 2_000;
    for expected_retry in 1..=MAX_ACK_RETRIES {
        let outcomes = world.bus.process_ack_timeouts(now).unwrap();
        assert_eq!(
            outcomes,
            vec![TimeoutOutcome::Retried {
                message_id: request.id.clone(),
                retries: expected_retry
            }]
        );
        now += 1_000_000_000;
    }

    // One more sweep past the deadline with retries exhausted.
    let outcomes = world.bus.process_ack_timeouts(now).unwrap();
    assert_eq!(
        outcomes,
        vec![TimeoutOutcome::DeadLettered {
            message_id: request.id.clone(),
            escalated_to_pm: true
        }]
    );

    // Pending record removed; DLQ has the original.
    assert!(world.bus.acks().pending().unwrap().is_empty());
    let dlq = world.bus.acks().dlq().unwrap();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].message_id, request.id);
    assert_eq!(dlq[0].reason, "max_retries_exceeded");

    // And a blocking escalation reached the PM role.
    let batch = world
        .bus
        .read_for(
            &SessionId::new("S-pm"),
            &ReadFilter {
                role: Some(Role::Pm),
                agent_name: None,
            },
            now,
        )
        .unwrap();
    let escalation = batch
        .iter()
        .find(|m| m.topic == "escalation.blocking_timeout")
        .expect("PM escalation message");
    assert_eq!(escalation.priority, Priority::Blocking);
    assert_eq!(escalation.payload["original_recipient"], "S-2");
}

#[test]
fn ack_before_deadline_clears_the_pending_record() {
    let world = World::new();
    let from = SessionId::new("S-1");
    let to = SessionId::new("S-2");

    let query = world
        .bus
        .query_agent(&from, &to, serde_json::json!({"q": "eta?"}), 60_000, 0)
        .unwrap();
    assert_eq!(world.bus.acks().pending().unwrap().len(), 1);

    world.bus.send_ack(&to, &query.id, &from, 1_000).unwrap();
    assert!(world.bus.acks().pending().unwrap().is_empty());
    // Nothing dead-letters later.
    assert!(world.bus.process_ack_timeouts(10_000_000).unwrap().is_empty());
    assert!(world.bus.acks().dlq().unwrap().is_empty());
}
