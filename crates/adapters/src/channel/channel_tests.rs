// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pilot_storage::fsutil::append_jsonl;
use pilot_storage::StateLayout;
use tempfile::tempdir;
use yare::parameterized;

fn inbound(action: &str, chat_id: i64) -> InboundRecord {
    InboundRecord {
        action: action.to_string(),
        chat_id,
        text: None,
        task_id: None,
        approval_id: None,
        agent: None,
        scope: None,
        ts_ms: 0,
    }
}

#[test]
fn drain_advances_cursor() {
    let dir = tempdir().unwrap();
    let layout = StateLayout::at(dir.path());
    let channel = FileChannel::new(layout.clone(), 4_000);

    append_jsonl(&layout.channel_inbox_file(), &inbound("status", 7)).unwrap();
    append_jsonl(&layout.channel_inbox_file(), &inbound("ps", 7)).unwrap();

    let drained = channel.drain_inbound().unwrap();
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[0].action, "status");

    // Nothing new: empty drain.
    assert!(channel.drain_inbound().unwrap().is_empty());

    append_jsonl(&layout.channel_inbox_file(), &inbound("budget", 7)).unwrap();
    let drained = channel.drain_inbound().unwrap();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].action, "budget");
}

#[test]
fn send_text_escapes_and_writes_outbox() {
    let dir = tempdir().unwrap();
    let channel = FileChannel::new(StateLayout::at(dir.path()), 4_000);

    channel.send_text(7, "tasks_done: 3 (of 5)", 99).unwrap();
    let outbox = channel.outbox().unwrap();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].chat_id, 7);
    assert_eq!(outbox[0].text, "tasks\\_done: 3 \\(of 5\\)");
    assert_eq!(outbox[0].ts_ms, 99);
}

#[test]
fn long_messages_are_split() {
    let dir = tempdir().unwrap();
    let channel = FileChannel::new(StateLayout::at(dir.path()), 40);

    let text = "alpha line one\nbeta line two\ngamma line three\n";
    channel.send_text(7, text, 0).unwrap();
    let outbox = channel.outbox().unwrap();
    assert!(outbox.len() > 1);
    for record in &outbox {
        assert!(record.text.len() <= 40);
    }
}

#[parameterized(
    short = { "hello", 10, 1 },
    exact = { "0123456789", 10, 1 },
    split_on_lines = { "aaaa\nbbbb\ncccc\n", 10, 2 },
    hard_split = { "aaaaaaaaaaaaaaaaaaaaaa", 10, 3 },
)]
fn split_message_bounds(text: &str, max: usize, expected_chunks: usize) {
    let chunks = split_message(text, max);
    assert_eq!(chunks.len(), expected_chunks);
    for chunk in &chunks {
        assert!(chunk.len() <= max);
    }
    assert_eq!(chunks.concat(), text);
}

#[test]
fn escape_markdown_covers_specials() {
    assert_eq!(escape_markdown("a_b*c[d"), "a\\_b\\*c\\[d");
    assert_eq!(escape_markdown("plain text"), "plain text");
}

#[test]
fn audit_appends_records() {
    let dir = tempdir().unwrap();
    let layout = StateLayout::at(dir.path());
    let channel = FileChannel::new(layout.clone(), 4_000);
    channel
        .audit(&serde_json::json!({"chat_id": 7, "action": "status"}))
        .unwrap();
    assert!(layout.channel_audit_file().exists());
}
