// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pilot_core::{AckContract, MessageDraft, MessageType};
use serde_json::json;
use tempfile::tempdir;

fn registry(dir: &std::path::Path) -> AckRegistry {
    AckRegistry::new(StateLayout::at(dir))
}

fn tracked_message(deadline_ms: u64) -> Message {
    MessageDraft::new(SessionId::new("S-1"), MessageType::Query, "query", json!({}))
        .to_session(&SessionId::new("S-2"))
        .ack(AckContract::required(deadline_ms))
        .seal(MessageId::new("m-1"), 1, 100)
}

#[test]
fn for_message_requires_ack_contract() {
    let no_ack = MessageDraft::new(SessionId::new("S-1"), MessageType::Notify, "t", json!({}))
        .seal(MessageId::new("m"), 1, 0);
    assert!(PendingAck::for_message(&no_ack, 0).is_none());

    let msg = tracked_message(5_000);
    let pending = PendingAck::for_message(&msg, 1_000).unwrap();
    assert_eq!(pending.deadline_at_ms, 6_000);
    assert_eq!(pending.deadline_ms, 5_000);
    assert_eq!(pending.retries, 0);
    assert_eq!(pending.recipient_descriptor(), "S-2");
}

#[test]
fn track_resolve_roundtrip() {
    let dir = tempdir().unwrap();
    let registry = registry(dir.path());
    let pending = PendingAck::for_message(&tracked_message(1_000), 0).unwrap();

    registry.track(pending).unwrap();
    assert_eq!(registry.pending().unwrap().len(), 1);

    assert!(registry.resolve(&MessageId::new("m-1")).unwrap());
    assert!(registry.pending().unwrap().is_empty());
    // Resolving again reports no record.
    assert!(!registry.resolve(&MessageId::new("m-1")).unwrap());
}

#[test]
fn take_removes_and_returns() {
    let dir = tempdir().unwrap();
    let registry = registry(dir.path());
    let pending = PendingAck::for_message(&tracked_message(1_000), 0).unwrap();
    registry.track(pending).unwrap();

    let taken = registry.take(&MessageId::new("m-1")).unwrap().unwrap();
    assert_eq!(taken.message_id, "m-1");
    assert!(registry.take(&MessageId::new("m-1")).unwrap().is_none());
}

#[test]
fn next_level_walks_the_chain() {
    let msg = MessageDraft::new(SessionId::new("S-1"), MessageType::Request, "t", json!({}))
        .to_session(&SessionId::new("S-2"))
        .ack(AckContract::with_default_chain(1_000))
        .seal(MessageId::new("m"), 1, 0);
    let mut pending = PendingAck::for_message(&msg, 0).unwrap();

    assert_eq!(pending.next_level(), Some(EscalationLevel::Pm));
    pending.current_level = 1;
    assert_eq!(pending.next_level(), Some(EscalationLevel::Human));
    pending.current_level = 2;
    assert_eq!(pending.next_level(), None);
}

#[test]
fn dlq_and_human_queue_append() {
    let dir = tempdir().unwrap();
    let registry = registry(dir.path());
    let pending = PendingAck::for_message(&tracked_message(1_000), 0).unwrap();

    registry
        .dead_letter(DlqRecord {
            message_id: pending.message_id.clone(),
            reason: "max_retries_exceeded".to_string(),
            original: pending.original.clone(),
            moved_at_ms: 9,
        })
        .unwrap();
    let dlq = registry.dlq().unwrap();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].reason, "max_retries_exceeded");

    registry.queue_for_human(&pending, 10).unwrap();
    let queue = registry.human_queue().unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0]["recipient"], "S-2");
}
