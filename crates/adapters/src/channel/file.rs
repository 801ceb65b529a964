// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL-backed channel queues.

use super::{escape_markdown, split_message, Channel, InboundRecord, OutboundRecord};
use pilot_storage::fsutil::{append_jsonl, read_json, read_jsonl_from, write_json_atomic};
use pilot_storage::{StateLayout, StoreError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct InboxCursor {
    byte_offset: u64,
}

/// Production channel over the layout's `channel/` files.
#[derive(Debug, Clone)]
pub struct FileChannel {
    layout: StateLayout,
    max_message_len: usize,
}

impl FileChannel {
    pub fn new(layout: StateLayout, max_message_len: usize) -> Self {
        Self {
            layout,
            max_message_len,
        }
    }

    /// Outbound queue contents (diagnostic surface).
    pub fn outbox(&self) -> Result<Vec<OutboundRecord>, StoreError> {
        let (records, _) = read_jsonl_from(&self.layout.channel_outbox_file(), 0)?;
        Ok(records)
    }
}

impl Channel for FileChannel {
    fn drain_inbound(&self) -> Result<Vec<InboundRecord>, StoreError> {
        let cursor_path = self.layout.channel_inbox_cursor();
        let cursor = read_json::<InboxCursor>(&cursor_path)?.unwrap_or_default();

        let (records, new_offset) =
            read_jsonl_from::<InboundRecord>(&self.layout.channel_inbox_file(), cursor.byte_offset)?;

        if new_offset != cursor.byte_offset {
            write_json_atomic(
                &cursor_path,
                &InboxCursor {
                    byte_offset: new_offset,
                },
            )?;
        }
        Ok(records)
    }

    fn send_text(&self, chat_id: i64, text: &str, now_ms: u64) -> Result<(), StoreError> {
        let escaped = escape_markdown(text);
        for chunk in split_message(&escaped, self.max_message_len) {
            append_jsonl(
                &self.layout.channel_outbox_file(),
                &OutboundRecord {
                    chat_id,
                    text: chunk,
                    ts_ms: now_ms,
                },
            )?;
        }
        Ok(())
    }

    fn audit(&self, record: &serde_json::Value) -> Result<(), StoreError> {
        append_jsonl(&self.layout.channel_audit_file(), record)
    }
}
