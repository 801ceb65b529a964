// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only message bus with per-reader cursors.
//!
//! One `bus.jsonl` holds every message; each reader owns a cursor file
//! recording its byte offset, last seen sequence number, and a bounded
//! replay guard of processed ids. Appends are serialized per process and
//! assemble one full line per write call; cross-process interleaving is
//! left to POSIX append semantics.

use crate::acks::{AckRegistry, DlqRecord, PendingAck, TimeoutOutcome, MAX_ACK_RETRIES};
use crate::fsutil::{append_jsonl, read_json, read_jsonl, read_jsonl_from, write_json_atomic, StoreError};
use crate::layout::StateLayout;
use parking_lot::Mutex;
use pilot_core::{
    AckContract, EscalationLevel, Message, MessageDraft, MessageId, MessageType, Priority, Role,
    SessionId, TaskId, ValidationFailure,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Replay-guard size: ids remembered per cursor.
const PROCESSED_IDS_KEEP: usize = 512;

/// Errors from bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("message rejected: {}", format_failures(.0))]
    Invalid(Vec<ValidationFailure>),
    #[error("no role provides capability '{0}'")]
    UnknownCapability(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn format_failures(failures: &[ValidationFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Per-reader cursor state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cursor {
    pub session_id: SessionId,
    pub last_seq: u64,
    pub byte_offset: u64,
    #[serde(default)]
    pub processed_ids: Vec<MessageId>,
    pub updated_at_ms: u64,
}

impl Cursor {
    fn fresh(session_id: SessionId) -> Self {
        Self {
            session_id,
            last_seq: 0,
            byte_offset: 0,
            processed_ids: Vec::new(),
            updated_at_ms: 0,
        }
    }
}

/// Reader identity and routing filters.
#[derive(Debug, Clone, Default)]
pub struct ReadFilter {
    pub role: Option<Role>,
    pub agent_name: Option<String>,
}

/// The append-only bus.
pub struct MessageBus {
    layout: StateLayout,
    acks: AckRegistry,
    /// Last assigned sequence number, seeded from the file tail at open.
    last_seq: Arc<Mutex<u64>>,
}

impl MessageBus {
    /// Open the bus, scanning the log to seed the sequence counter.
    pub fn open(layout: StateLayout) -> Result<Self, StoreError> {
        let max_seq = read_jsonl::<Message>(&layout.bus_file())?
            .iter()
            .map(|m| m.seq)
            .max()
            .unwrap_or(0);
        Ok(Self {
            acks: AckRegistry::new(layout.clone()),
            layout,
            last_seq: Arc::new(Mutex::new(max_seq)),
        })
    }

    pub fn acks(&self) -> &AckRegistry {
        &self.acks
    }

    /// Validate, stamp, and append a draft. The returned message carries
    /// the assigned id, sequence number, and timestamp.
    pub fn send(&self, draft: MessageDraft, now_ms: u64) -> Result<Message, BusError> {
        let failures = draft.validate();
        if !failures.is_empty() {
            return Err(BusError::Invalid(failures));
        }

        let mut last_seq = self.last_seq.lock();
        let seq = *last_seq + 1;
        let msg = draft.seal(MessageId::generate(), seq, now_ms);
        append_jsonl(&self.layout.bus_file(), &msg)?;
        *last_seq = seq;
        drop(last_seq);

        if let Some(pending) = PendingAck::for_message(&msg, now_ms) {
            self.acks.track(pending)?;
        }
        Ok(msg)
    }

    // -- addressed send variants --

    pub fn send_to_role(
        &self,
        from: &SessionId,
        role: Role,
        topic: &str,
        data: serde_json::Value,
        now_ms: u64,
    ) -> Result<Message, BusError> {
        self.send(
            MessageDraft::new(from.clone(), MessageType::Notify, topic, data).to_role(role),
            now_ms,
        )
    }

    pub fn send_to_agent(
        &self,
        from: &SessionId,
        agent: &str,
        topic: &str,
        data: serde_json::Value,
        now_ms: u64,
    ) -> Result<Message, BusError> {
        self.send(
            MessageDraft::new(from.clone(), MessageType::Notify, topic, data).to_agent(agent),
            now_ms,
        )
    }

    /// Resolve a capability to a role, then address that role.
    pub fn send_to_capability(
        &self,
        from: &SessionId,
        capability: &str,
        topic: &str,
        data: serde_json::Value,
        now_ms: u64,
    ) -> Result<Message, BusError> {
        let role = Role::for_capability(capability)
            .ok_or_else(|| BusError::UnknownCapability(capability.to_string()))?;
        self.send_to_role(from, role, topic, data, now_ms)
    }

    pub fn send_broadcast(
        &self,
        from: &SessionId,
        topic: &str,
        data: serde_json::Value,
        now_ms: u64,
    ) -> Result<Message, BusError> {
        self.send(
            MessageDraft::new(from.clone(), MessageType::Broadcast, topic, data).broadcast(),
            now_ms,
        )
    }

    /// Ask another session a question, requiring an acknowledgment.
    pub fn query_agent(
        &self,
        from: &SessionId,
        to: &SessionId,
        question: serde_json::Value,
        deadline_ms: u64,
        now_ms: u64,
    ) -> Result<Message, BusError> {
        self.send(
            MessageDraft::new(from.clone(), MessageType::Query, "query", question)
                .to_session(to)
                .ack(AckContract::required(deadline_ms)),
            now_ms,
        )
    }

    /// Answer a query, correlating back to its id.
    pub fn respond_to_query(
        &self,
        from: &SessionId,
        query: &Message,
        data: serde_json::Value,
        now_ms: u64,
    ) -> Result<Message, BusError> {
        self.send(
            MessageDraft::new(from.clone(), MessageType::Response, &query.topic, data)
                .to_session(&query.from)
                .correlate(query.id.clone()),
            now_ms,
        )
    }

    /// Blocking request that escalates to the PM when unanswered.
    pub fn send_blocking_request(
        &self,
        from: &SessionId,
        to: &SessionId,
        reason: &str,
        deadline_ms: u64,
        now_ms: u64,
    ) -> Result<Message, BusError> {
        self.send(
            MessageDraft::new(
                from.clone(),
                MessageType::Request,
                "blocking.request",
                json!({ "reason": reason }),
            )
            .to_session(to)
            .priority(Priority::Blocking)
            .ack(AckContract::required(deadline_ms))
            .escalate_to_pm(),
            now_ms,
        )
    }

    /// Blocking request carrying the default peer→pm→human chain.
    pub fn send_with_escalation(
        &self,
        from: &SessionId,
        to: &SessionId,
        topic: &str,
        data: serde_json::Value,
        deadline_ms: u64,
        now_ms: u64,
    ) -> Result<Message, BusError> {
        self.send(
            MessageDraft::new(from.clone(), MessageType::Request, topic, data)
                .to_session(to)
                .priority(Priority::Blocking)
                .ack(AckContract::with_default_chain(deadline_ms)),
            now_ms,
        )
    }

    /// Broadcast that the sender is blocked waiting on a task.
    pub fn send_block_on_task(
        &self,
        from: &SessionId,
        task: &TaskId,
        reason: &str,
        now_ms: u64,
    ) -> Result<Message, BusError> {
        self.send(
            MessageDraft::new(
                from.clone(),
                MessageType::BlockOnTask,
                "task.block_on",
                json!({ "task_id": task, "reason": reason }),
            )
            .broadcast()
            .priority(Priority::Blocking),
            now_ms,
        )
    }

    pub fn notify_task_complete(
        &self,
        from: &SessionId,
        task: &TaskId,
        meta: serde_json::Value,
        now_ms: u64,
    ) -> Result<Message, BusError> {
        self.send(
            MessageDraft::new(
                from.clone(),
                MessageType::Broadcast,
                "task.completed",
                json!({ "task_id": task, "meta": meta }),
            )
            .broadcast(),
            now_ms,
        )
    }

    // -- reading --

    /// Read new messages for a session, advancing its cursor.
    ///
    /// The returned batch is priority-ordered (blocking first, sequence as
    /// tiebreaker). Ordering applies within this batch only; it never
    /// reaches back across a previous cursor advance.
    pub fn read_for(
        &self,
        reader: &SessionId,
        filter: &ReadFilter,
        now_ms: u64,
    ) -> Result<Vec<Message>, BusError> {
        let cursor_path = self.layout.cursor_file(reader);
        let mut cursor =
            read_json::<Cursor>(&cursor_path)?.unwrap_or_else(|| Cursor::fresh(reader.clone()));

        let (records, new_offset) =
            read_jsonl_from::<Message>(&self.layout.bus_file(), cursor.byte_offset)?;

        let mut batch: Vec<Message> = Vec::new();
        for msg in records {
            cursor.last_seq = cursor.last_seq.max(msg.seq);
            if !msg.visible_to(reader, filter.role, filter.agent_name.as_deref()) {
                continue;
            }
            if cursor.processed_ids.contains(&msg.id) {
                continue;
            }
            cursor.processed_ids.push(msg.id.clone());
            batch.push(msg);
        }

        if cursor.processed_ids.len() > PROCESSED_IDS_KEEP {
            let drop = cursor.processed_ids.len() - PROCESSED_IDS_KEEP;
            cursor.processed_ids.drain(..drop);
        }
        cursor.byte_offset = new_offset;
        cursor.updated_at_ms = now_ms;
        write_json_atomic(&cursor_path, &cursor)?;

        batch.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.seq.cmp(&b.seq)));
        Ok(batch)
    }

    /// Delete a reader's cursor (called on session end).
    pub fn remove_cursor(&self, reader: &SessionId) -> Result<(), StoreError> {
        let path = self.layout.cursor_file(reader);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Every message on the bus (operator/diagnostic surface).
    pub fn all_messages(&self) -> Result<Vec<Message>, StoreError> {
        read_jsonl(&self.layout.bus_file())
    }

    // -- acknowledgment --

    /// Acknowledge a message: append the ack and drop the pending record.
    pub fn send_ack(
        &self,
        reader: &SessionId,
        message_id: &MessageId,
        original_sender: &SessionId,
        now_ms: u64,
    ) -> Result<Message, BusError> {
        let ack = self.send(
            MessageDraft::new(reader.clone(), MessageType::Ack, "ack", json!({}))
                .to_session(original_sender)
                .correlate(message_id.clone()),
            now_ms,
        )?;
        self.acks.resolve(message_id)?;
        Ok(ack)
    }

    /// Negatively acknowledge: the pending record is escalated (when
    /// flagged) and dead-lettered immediately.
    pub fn send_nack(
        &self,
        reader: &SessionId,
        message_id: &MessageId,
        original_sender: &SessionId,
        reason: &str,
        now_ms: u64,
    ) -> Result<Message, BusError> {
        let nack = self.send(
            MessageDraft::new(
                reader.clone(),
                MessageType::Nack,
                "nack",
                json!({ "reason": reason }),
            )
            .to_session(original_sender)
            .correlate(message_id.clone()),
            now_ms,
        )?;

        if let Some(pending) = self.acks.take(message_id)? {
            if pending.escalate_to_pm {
                self.append_pm_escalation(&pending, &format!("nack: {reason}"), now_ms)?;
            }
            self.acks.dead_letter(DlqRecord {
                message_id: pending.message_id.clone(),
                reason: format!("nack: {reason}"),
                original: pending.original,
                moved_at_ms: now_ms,
            })?;
        }
        Ok(nack)
    }

    /// Sweep pending acknowledgments past deadline.
    ///
    /// Within-deadline records are untouched. Past deadline: retries are
    /// bumped with a doubling deadline until [`MAX_ACK_RETRIES`]; after
    /// that the record either advances its escalation chain (fresh request
    /// at the next level, `human` landing in the persisted queue) or moves
    /// to the DLQ, escalating to the PM when flagged.
    pub fn process_ack_timeouts(&self, now_ms: u64) -> Result<Vec<TimeoutOutcome>, BusError> {
        let pending = self.acks.pending()?;
        let mut kept: Vec<PendingAck> = Vec::new();
        let mut outcomes = Vec::new();

        for mut record in pending {
            if record.deadline_at_ms > now_ms {
                kept.push(record);
                continue;
            }

            if record.retries < MAX_ACK_RETRIES {
                record.retries += 1;
                // Exponential-ish bump: base deadline doubled per retry.
                record.deadline_at_ms =
                    now_ms + record.deadline_ms.saturating_mul(1 << record.retries);
                outcomes.push(TimeoutOutcome::Retried {
                    message_id: record.message_id.clone(),
                    retries: record.retries,
                });
                kept.push(record);
                continue;
            }

            if let Some(level) = record.next_level() {
                match level {
                    EscalationLevel::Human => {
                        self.acks.queue_for_human(&record, now_ms)?;
                        outcomes.push(TimeoutOutcome::HumanQueued {
                            message_id: record.message_id.clone(),
                        });
                    }
                    next => {
                        let escalated = self.send_chain_level(&record, next, now_ms)?;
                        kept.push(escalated);
                        outcomes.push(TimeoutOutcome::ChainAdvanced {
                            message_id: record.message_id.clone(),
                            level: next,
                        });
                    }
                }
                continue;
            }

            if record.escalate_to_pm {
                self.append_pm_escalation(&record, "max_retries_exceeded", now_ms)?;
            }
            self.acks.dead_letter(DlqRecord {
                message_id: record.message_id.clone(),
                reason: "max_retries_exceeded".to_string(),
                original: record.original.clone(),
                moved_at_ms: now_ms,
            })?;
            outcomes.push(TimeoutOutcome::DeadLettered {
                message_id: record.message_id,
                escalated_to_pm: record.escalate_to_pm,
            });
        }

        self.acks.save_pending(&kept)?;
        Ok(outcomes)
    }

    /// Issue a fresh request at the next chain level, returning its
    /// pending record.
    fn send_chain_level(
        &self,
        record: &PendingAck,
        level: EscalationLevel,
        now_ms: u64,
    ) -> Result<PendingAck, BusError> {
        let data = json!({
            "escalated_from": record.message_id,
            "original_recipient": record.recipient_descriptor(),
            "topic": record.topic,
        });
        let mut draft = MessageDraft::new(
            record.from.clone(),
            MessageType::Request,
            &record.topic,
            data,
        )
        .priority(Priority::Blocking)
        .ack(AckContract {
            required: true,
            deadline_ms: record.deadline_ms,
            escalation_chain: record.escalation_chain.clone(),
            current_level: Some(record.current_level + 1),
        });
        draft = match level {
            EscalationLevel::Pm => draft.to_role(Role::Pm),
            // Peer level re-targets the original recipient descriptor.
            EscalationLevel::Peer | EscalationLevel::Human => {
                if let Some(to) = &record.to {
                    draft.to = Some(to.clone());
                    draft
                } else if let Some(role) = record.to_role {
                    draft.to_role(role)
                } else {
                    draft
                }
            }
        };

        let msg = self.send(draft, now_ms)?;
        // send() tracked a fresh pending record; pull it back out so the
        // sweep's rewrite below owns it.
        let pending = self
            .acks
            .take(&msg.id)?
            .unwrap_or_else(|| PendingAck {
                current_level: record.current_level + 1,
                ..record.clone()
            });
        Ok(pending)
    }

    /// Synthetic blocking escalation message to the PM role.
    fn append_pm_escalation(
        &self,
        record: &PendingAck,
        reason: &str,
        now_ms: u64,
    ) -> Result<(), BusError> {
        self.send(
            MessageDraft::new(
                record.from.clone(),
                MessageType::Notify,
                "escalation.blocking_timeout",
                json!({
                    "message_id": record.message_id,
                    "original_recipient": record.recipient_descriptor(),
                    "topic": record.topic,
                    "reason": reason,
                }),
            )
            .to_role(Role::Pm)
            .priority(Priority::Blocking),
            now_ms,
        )?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
