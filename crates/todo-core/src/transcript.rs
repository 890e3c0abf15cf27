use serde::{Deserialize, Serialize};

use crate::Envelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    ToolObservation,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::ToolObservation => "tool_observation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(prompt: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: prompt.into(),
        }
    }

    /// Wraps an envelope in the role that emits it.
    pub fn from_envelope(envelope: &Envelope) -> Self {
        let role = match envelope {
            Envelope::User { .. } => Role::User,
            Envelope::Plan { .. } | Envelope::Output { .. } | Envelope::Action { .. } => {
                Role::Assistant
            }
            Envelope::Observation { .. } => Role::ToolObservation,
        };
        Self {
            role,
            content: envelope.to_string(),
        }
    }

    /// A model reply that could not be parsed, kept verbatim.
    pub fn raw_assistant(reply: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: reply.into(),
        }
    }
}

/// Append-only conversation history sent in full on every model call.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(prompt)],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_envelope(&mut self, envelope: &Envelope) {
        self.push(Message::from_envelope(envelope));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
