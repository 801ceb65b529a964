// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory channel for tests.

use super::{Channel, InboundRecord, OutboundRecord};
use parking_lot::Mutex;
use pilot_storage::StoreError;
use std::sync::Arc;

/// Scriptable channel holding queues in memory.
#[derive(Debug, Clone, Default)]
pub struct FakeChannel {
    inbound: Arc<Mutex<Vec<InboundRecord>>>,
    outbound: Arc<Mutex<Vec<OutboundRecord>>>,
    audits: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl FakeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an inbound record for the next drain.
    pub fn push_inbound(&self, record: InboundRecord) {
        self.inbound.lock().push(record);
    }

    pub fn sent(&self) -> Vec<OutboundRecord> {
        self.outbound.lock().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.outbound.lock().iter().map(|r| r.text.clone()).collect()
    }

    pub fn audits(&self) -> Vec<serde_json::Value> {
        self.audits.lock().clone()
    }
}

impl Channel for FakeChannel {
    fn drain_inbound(&self) -> Result<Vec<InboundRecord>, StoreError> {
        Ok(std::mem::take(&mut *self.inbound.lock()))
    }

    fn send_text(&self, chat_id: i64, text: &str, now_ms: u64) -> Result<(), StoreError> {
        self.outbound.lock().push(OutboundRecord {
            chat_id,
            text: text.to_string(),
            ts_ms: now_ms,
        });
        Ok(())
    }

    fn audit(&self, record: &serde_json::Value) -> Result<(), StoreError> {
        self.audits.lock().push(record.clone());
        Ok(())
    }
}
