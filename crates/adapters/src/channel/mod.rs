// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External messaging channel queues.
//!
//! The relay process (out of scope) appends inbound records to
//! `channel/inbox.jsonl` with the `action` already extracted by its intent
//! parser, and drains `channel/outbox.jsonl` toward the human. This
//! adapter owns the inbox cursor, outbound splitting, and Markdown
//! escaping. No raw command strings are ever executed.

mod file;

pub use file::FileChannel;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeChannel;

use pilot_storage::StoreError;
use serde::{Deserialize, Serialize};

/// One parsed inbound message from the human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundRecord {
    /// Structured action extracted by the relay's intent parser.
    pub action: String,
    pub chat_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default)]
    pub ts_ms: u64,
}

/// One outbound chunk for the relay to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundRecord {
    pub chat_id: i64,
    pub text: String,
    pub ts_ms: u64,
}

/// File-backed queue pair the conversation handler talks through.
pub trait Channel: Send + Sync {
    /// New inbound records since the last drain; advances the cursor.
    fn drain_inbound(&self) -> Result<Vec<InboundRecord>, StoreError>;

    /// Queue text for delivery, splitting and escaping as needed.
    fn send_text(&self, chat_id: i64, text: &str, now_ms: u64) -> Result<(), StoreError>;

    /// Append one interaction to the audit log.
    fn audit(&self, record: &serde_json::Value) -> Result<(), StoreError>;
}

/// Escape Telegram-style Markdown metacharacters.
pub fn escape_markdown(text: &str) -> String {
    const SPECIAL: &[char] = &[
        '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
    ];
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Split `text` into chunks of at most `max_len` characters, preferring
/// line boundaries.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 || text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.split_inclusive('\n') {
        if current.len() + line.len() > max_len && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if line.len() > max_len {
            // A single oversized line is split hard.
            let mut rest = line;
            while rest.len() > max_len {
                let mut cut = max_len;
                while !rest.is_char_boundary(cut) {
                    cut -= 1;
                }
                chunks.push(rest[..cut].to_string());
                rest = &rest[cut..];
            }
            current.push_str(rest);
        } else {
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
