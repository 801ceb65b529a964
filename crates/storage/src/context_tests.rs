// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

fn board(dir: &std::path::Path) -> ContextBoard {
    ContextBoard::new(StateLayout::at(dir))
}

fn working(task: &str, files: &[&str]) -> AgentProgress {
    AgentProgress {
        task_id: Some(TaskId::new(task)),
        task_title: format!("work on {task}"),
        step: 1,
        total_steps: 3,
        status: AgentActivity::Working,
        files_modified: files.iter().map(PathBuf::from).collect(),
        updated_at_ms: 0,
    }
}

#[test]
fn publish_and_remove() {
    let dir = tempdir().unwrap();
    let board = board(dir.path());
    let sid = SessionId::new("S-1");

    board.publish(&sid, working("T-1", &[])).unwrap();
    assert!(board.agent(&sid).unwrap().is_some());
    assert_eq!(board.board().unwrap().len(), 1);

    board.remove(&sid).unwrap();
    assert!(board.agent(&sid).unwrap().is_none());
    // Removing an absent agent is a no-op.
    board.remove(&sid).unwrap();
}

#[test]
fn related_progress_matches_task() {
    let dir = tempdir().unwrap();
    let board = board(dir.path());
    board
        .publish(&SessionId::new("S-1"), working("T-1", &[]))
        .unwrap();
    board
        .publish(&SessionId::new("S-2"), working("T-2", &[]))
        .unwrap();

    let related = board.related_progress(&TaskId::new("T-1")).unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].0, SessionId::new("S-1"));
}

#[test]
fn agents_on_files_overlap_and_exclude() {
    let dir = tempdir().unwrap();
    let board = board(dir.path());
    board
        .publish(&SessionId::new("S-1"), working("T-1", &["src/a.rs", "src/b.rs"]))
        .unwrap();
    board
        .publish(&SessionId::new("S-2"), working("T-2", &["src/c.rs"]))
        .unwrap();

    let a = PathBuf::from("src/a.rs");
    let hits = board.agents_on_files(&[a.as_path()], None).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, SessionId::new("S-1"));

    let excluded = board
        .agents_on_files(&[a.as_path()], Some(&SessionId::new("S-1")))
        .unwrap();
    assert!(excluded.is_empty());
}

#[test]
fn inject_context_annotates_overlapping_peers() {
    let dir = tempdir().unwrap();
    let board = board(dir.path());
    let me = SessionId::new("S-1");
    board.publish(&me, working("T-1", &["src/a.rs"])).unwrap();
    board
        .publish(&SessionId::new("S-2"), working("T-1", &["src/z.rs"]))
        .unwrap();
    board
        .publish(&SessionId::new("S-3"), working("T-9", &["src/other.rs"]))
        .unwrap();

    let mut messages = vec![serde_json::json!({"topic": "hello"})];
    board.inject_context(&me, &mut messages).unwrap();

    let peers = messages[0]["_context"]["peers"].as_array().unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0]["session_id"], "S-2");
}

#[test]
fn inject_context_leaves_unrelated_messages_bare() {
    let dir = tempdir().unwrap();
    let board = board(dir.path());
    let me = SessionId::new("S-1");
    board.publish(&me, working("T-1", &["src/a.rs"])).unwrap();

    let mut messages = vec![serde_json::json!({"topic": "hello"})];
    board.inject_context(&me, &mut messages).unwrap();
    assert!(messages[0].get("_context").is_none());
}
