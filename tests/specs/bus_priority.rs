//! Scenario: priority ordering within a read batch.

use crate::prelude::World;
use pilot_core::{MessageDraft, MessageType, Priority, SessionId};
use pilot_storage::ReadFilter;
use serde_json::json;

#[test]
fn blocking_message_is_delivered_first_within_a_batch() {
    let world = World::new();
    let sender = SessionId::new("S-send");
    let reader = SessionId::new("S-read");

    world
        .bus
        .send(
            MessageDraft::new(sender.clone(), MessageType::Notify, "fyi-topic", json!({}))
                .priority(Priority::Fyi),
            1,
        )
        .unwrap();
    world
        .bus
        .send(
            MessageDraft::new(sender.clone(), MessageType::Notify, "urgent-topic", json!({}))
                .priority(Priority::Blocking),
            2,
        )
        .unwrap();

    let batch = world
        .bus
        .read_for(&reader, &ReadFilter::default(), 3)
        .unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].topic, "urgent-topic");
    assert_eq!(batch[1].topic, "fyi-topic");
}

#[test]
fn a_second_read_at_the_same_cursor_is_empty() {
    let world = World::new();
    let sender = SessionId::new("S-send");
    let reader = SessionId::new("S-read");

    world
        .bus
        .send(
            MessageDraft::new(sender, MessageType::Notify, "hello", json!({})),
            1,
        )
        .unwrap();

    let first = world.bus.read_for(&reader, &ReadFilter::default(), 2).unwrap();
    assert_eq!(first.len(), 1);
    let second = world.bus.read_for(&reader, &ReadFilter::default(), 3).unwrap();
    assert!(second.is_empty());
}

#[test]
fn sequence_numbers_strictly_increase() {
    let world = World::new();
    let sender = SessionId::new("S-send");
    let mut last = 0;
    for i in 0..5 {
        let msg = world
            .bus
            .send_broadcast(&sender, "tick", json!({ "i": i }), i)
            .unwrap();
        assert!(msg.seq > last);
        last = msg.seq;
    }
}
