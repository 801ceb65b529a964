// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pending-ACK records, retry accounting, and the dead-letter queue.
//!
//! Every message sent with `ack.required` gets a pending record. The
//! timeout sweep (driven through [`crate::bus::MessageBus`]) retries past
//! deadline up to [`MAX_ACK_RETRIES`], then dead-letters the record,
//! escalating to the PM or advancing the escalation chain when the message
//! asked for it.

use crate::fsutil::{append_jsonl, read_jsonl, rewrite_jsonl, StoreError};
use crate::layout::StateLayout;
use pilot_core::{EscalationLevel, Message, MessageId, Role, SessionId};
use serde::{Deserialize, Serialize};

/// Retries granted past the first deadline miss.
pub const MAX_ACK_RETRIES: u32 = 3;

/// A tracked in-flight delivery awaiting acknowledgment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAck {
    pub message_id: MessageId,
    pub from: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_agent: Option<String>,
    pub topic: String,
    pub deadline_at_ms: u64,
    /// Original contract deadline, used for the retry bump.
    pub deadline_ms: u64,
    pub retries: u32,
    #[serde(default)]
    pub escalate_to_pm: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_chain: Option<Vec<EscalationLevel>>,
    #[serde(default)]
    pub current_level: u32,
    /// Full original message for the DLQ record.
    pub original: serde_json::Value,
}

impl PendingAck {
    /// Build a pending record for a sealed message with an ack contract.
    ///
    /// Returns `None` when the message does not require acknowledgment.
    pub fn for_message(msg: &Message, now_ms: u64) -> Option<Self> {
        let ack = msg.ack.as_ref().filter(|a| a.required)?;
        Some(Self {
            message_id: msg.id.clone(),
            from: msg.from.clone(),
            to: msg.to.clone(),
            to_role: msg.to_role,
            to_agent: msg.to_agent.clone(),
            topic: msg.topic.clone(),
            deadline_at_ms: now_ms + ack.deadline_ms,
            deadline_ms: ack.deadline_ms,
            retries: 0,
            escalate_to_pm: msg.escalate_to_pm,
            escalation_chain: ack.escalation_chain.clone(),
            current_level: ack.current_level.unwrap_or(0),
            original: serde_json::to_value(msg).unwrap_or_default(),
        })
    }

    /// The next level in the chain, if one remains.
    pub fn next_level(&self) -> Option<EscalationLevel> {
        let chain = self.escalation_chain.as_ref()?;
        chain.get(self.current_level as usize + 1).copied()
    }

    /// Human-readable recipient descriptor for escalation context.
    pub fn recipient_descriptor(&self) -> String {
        if let Some(to) = &self.to {
            return to.clone();
        }
        if let Some(role) = self.to_role {
            return format!("role:{role}");
        }
        if let Some(agent) = &self.to_agent {
            return format!("agent:{agent}");
        }
        "*".to_string()
    }
}

/// A dead-lettered message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqRecord {
    pub message_id: MessageId,
    pub reason: String,
    pub original: serde_json::Value,
    pub moved_at_ms: u64,
}

/// What the timeout sweep did with one pending record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutOutcome {
    /// Deadline pushed forward; still waiting.
    Retried { message_id: MessageId, retries: u32 },
    /// Moved to the DLQ (retries exhausted or nacked).
    DeadLettered {
        message_id: MessageId,
        escalated_to_pm: bool,
    },
    /// A fresh request was issued at the next chain level.
    ChainAdvanced {
        message_id: MessageId,
        level: EscalationLevel,
    },
    /// Chain exhausted at `human`; queued for out-of-band review.
    HumanQueued { message_id: MessageId },
}

/// Repository for pending-ACK records, the DLQ, and the human queue.
#[derive(Debug, Clone)]
pub struct AckRegistry {
    layout: StateLayout,
}

impl AckRegistry {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    pub fn pending(&self) -> Result<Vec<PendingAck>, StoreError> {
        read_jsonl(&self.layout.pending_acks_file())
    }

    pub fn save_pending(&self, records: &[PendingAck]) -> Result<(), StoreError> {
        rewrite_jsonl(&self.layout.pending_acks_file(), records)
    }

    /// Record a delivery awaiting acknowledgment.
    pub fn track(&self, record: PendingAck) -> Result<(), StoreError> {
        append_jsonl(&self.layout.pending_acks_file(), &record)
    }

    /// Drop the record for an acknowledged message. Returns whether a
    /// record existed.
    pub fn resolve(&self, message_id: &MessageId) -> Result<bool, StoreError> {
        let mut records = self.pending()?;
        let before = records.len();
        records.retain(|r| &r.message_id != message_id);
        if records.len() == before {
            return Ok(false);
        }
        self.save_pending(&records)?;
        Ok(true)
    }

    /// Take (remove and return) the record for a message, if present.
    pub fn take(&self, message_id: &MessageId) -> Result<Option<PendingAck>, StoreError> {
        let mut records = self.pending()?;
        let position = records.iter().position(|r| &r.message_id == message_id);
        let Some(position) = position else {
            return Ok(None);
        };
        let record = records.remove(position);
        self.save_pending(&records)?;
        Ok(Some(record))
    }

    pub fn dead_letter(&self, record: DlqRecord) -> Result<(), StoreError> {
        append_jsonl(&self.layout.dlq_file(), &record)
    }

    pub fn dlq(&self) -> Result<Vec<DlqRecord>, StoreError> {
        read_jsonl(&self.layout.dlq_file())
    }

    /// Append a terminal escalation to the persisted human queue.
    pub fn queue_for_human(&self, record: &PendingAck, now_ms: u64) -> Result<(), StoreError> {
        #[derive(Serialize)]
        struct HumanQueueRecord<'a> {
            message_id: &'a MessageId,
            from: &'a SessionId,
            recipient: String,
            topic: &'a str,
            queued_at_ms: u64,
            original: &'a serde_json::Value,
        }
        append_jsonl(
            &self.layout.human_queue_file(),
            &HumanQueueRecord {
                message_id: &record.message_id,
                from: &record.from,
                recipient: record.recipient_descriptor(),
                topic: &record.topic,
                queued_at_ms: now_ms,
                original: &record.original,
            },
        )
    }

    pub fn human_queue(&self) -> Result<Vec<serde_json::Value>, StoreError> {
        read_jsonl(&self.layout.human_queue_file())
    }
}

#[cfg(test)]
#[path = "acks_tests.rs"]
mod tests;
