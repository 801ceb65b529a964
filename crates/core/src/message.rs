// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus message wire records.
//!
//! One message is one JSON line on the bus. The bus assigns `id`, `seq`,
//! and `ts` at append time; everything else is authored by the sender via
//! [`MessageDraft`].

use crate::id::{MessageId, SessionId};
use crate::role::Role;
use serde::{Deserialize, Serialize};

/// Message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Request,
    Response,
    Notify,
    Broadcast,
    Ack,
    Nack,
    Query,
    BlockOnTask,
}

/// Delivery priority. Order is delivery order: blocking sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Blocking,
    Normal,
    Fyi,
}

/// One level of an escalation chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationLevel {
    Peer,
    Pm,
    Human,
}

/// Default chain traversed on sustained non-ack of a blocking message.
pub const DEFAULT_ESCALATION_CHAIN: [EscalationLevel; 3] =
    [EscalationLevel::Peer, EscalationLevel::Pm, EscalationLevel::Human];

/// Acknowledgment contract attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckContract {
    pub required: bool,
    pub deadline_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_chain: Option<Vec<EscalationLevel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_level: Option<u32>,
}

impl AckContract {
    pub fn required(deadline_ms: u64) -> Self {
        Self {
            required: true,
            deadline_ms,
            escalation_chain: None,
            current_level: None,
        }
    }

    pub fn with_default_chain(deadline_ms: u64) -> Self {
        Self {
            required: true,
            deadline_ms,
            escalation_chain: Some(DEFAULT_ESCALATION_CHAIN.to_vec()),
            current_level: Some(0),
        }
    }
}

/// A structural problem found while validating a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    EmptyTopic,
    MissingRecipient,
    MissingCorrelation,
    BroadcastWithDirectRecipient,
    ZeroAckDeadline,
    FyiWithAckRequired,
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            ValidationFailure::EmptyTopic => "topic must be non-empty",
            ValidationFailure::MissingRecipient => {
                "request/query messages need a recipient (to, to_role, or to_agent)"
            }
            ValidationFailure::MissingCorrelation => {
                "response/ack/nack messages need a correlation_id"
            }
            ValidationFailure::BroadcastWithDirectRecipient => {
                "broadcast messages may only address '*'"
            }
            ValidationFailure::ZeroAckDeadline => "ack contract needs a nonzero deadline",
            ValidationFailure::FyiWithAckRequired => "fyi messages cannot require an ack",
        };
        f.write_str(msg)
    }
}

/// A stored bus message (one JSONL line).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub seq: u64,
    /// Append timestamp, epoch millis.
    pub ts: u64,
    pub from: SessionId,
    /// Direct recipient session id, or `*` for broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_agent: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub topic: String,
    pub priority: Priority,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<AckContract>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub escalate_to_pm: bool,
}

impl Message {
    /// Whether `self` is visible to a reader with the given identity.
    ///
    /// Own-sent messages are never visible. A direct `to` must match the
    /// reader's session id; `*` and untargeted messages go to everyone;
    /// role/agent targeting matches the reader's filters.
    pub fn visible_to(
        &self,
        reader: &SessionId,
        role: Option<Role>,
        agent_name: Option<&str>,
    ) -> bool {
        if &self.from == reader {
            return false;
        }
        if let Some(to) = &self.to {
            return to == "*" || to == reader.as_str();
        }
        if let Some(to_role) = self.to_role {
            return role == Some(to_role);
        }
        if let Some(to_agent) = &self.to_agent {
            return agent_name == Some(to_agent.as_str());
        }
        // No recipient at all: untargeted broadcast.
        true
    }
}

/// Sender-authored portion of a message, validated by the bus at append.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub from: SessionId,
    pub to: Option<String>,
    pub to_role: Option<Role>,
    pub to_agent: Option<String>,
    pub kind: MessageType,
    pub topic: String,
    pub priority: Priority,
    pub payload: serde_json::Value,
    pub correlation_id: Option<MessageId>,
    pub ack: Option<AckContract>,
    pub escalate_to_pm: bool,
}

impl MessageDraft {
    pub fn new(
        from: SessionId,
        kind: MessageType,
        topic: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            from,
            to: None,
            to_role: None,
            to_agent: None,
            kind,
            topic: topic.into(),
            priority: Priority::Normal,
            payload,
            correlation_id: None,
            ack: None,
            escalate_to_pm: false,
        }
    }

    pub fn to_session(mut self, session: &SessionId) -> Self {
        self.to = Some(session.as_str().to_string());
        self
    }

    pub fn to_role(mut self, role: Role) -> Self {
        self.to_role = Some(role);
        self
    }

    pub fn to_agent(mut self, agent: impl Into<String>) -> Self {
        self.to_agent = Some(agent.into());
        self
    }

    pub fn broadcast(mut self) -> Self {
        self.to = Some("*".to_string());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn correlate(mut self, id: MessageId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn ack(mut self, contract: AckContract) -> Self {
        self.ack = Some(contract);
        self
    }

    pub fn escalate_to_pm(mut self) -> Self {
        self.escalate_to_pm = true;
        self
    }

    /// Structural validation per the bus contract. Empty vec means valid.
    pub fn validate(&self) -> Vec<ValidationFailure> {
        let mut failures = Vec::new();

        if self.topic.trim().is_empty() {
            failures.push(ValidationFailure::EmptyTopic);
        }

        let has_recipient =
            self.to.is_some() || self.to_role.is_some() || self.to_agent.is_some();
        if matches!(self.kind, MessageType::Request | MessageType::Query) && !has_recipient {
            failures.push(ValidationFailure::MissingRecipient);
        }

        if matches!(
            self.kind,
            MessageType::Response | MessageType::Ack | MessageType::Nack
        ) && self.correlation_id.is_none()
        {
            failures.push(ValidationFailure::MissingCorrelation);
        }

        if self.kind == MessageType::Broadcast {
            if let Some(to) = &self.to {
                if to != "*" {
                    failures.push(ValidationFailure::BroadcastWithDirectRecipient);
                }
            }
        }

        if let Some(ack) = &self.ack {
            if ack.required && ack.deadline_ms == 0 {
                failures.push(ValidationFailure::ZeroAckDeadline);
            }
            if ack.required && self.priority == Priority::Fyi {
                failures.push(ValidationFailure::FyiWithAckRequired);
            }
        }

        failures
    }

    /// Seal the draft into a stored message with bus-assigned identity.
    pub fn seal(self, id: MessageId, seq: u64, ts: u64) -> Message {
        Message {
            id,
            seq,
            ts,
            from: self.from,
            to: self.to,
            to_role: self.to_role,
            to_agent: self.to_agent,
            kind: self.kind,
            topic: self.topic,
            priority: self.priority,
            payload: self.payload,
            correlation_id: self.correlation_id,
            ack: self.ack,
            escalate_to_pm: self.escalate_to_pm,
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
