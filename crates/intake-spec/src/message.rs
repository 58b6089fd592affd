use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Outbound message payload, serialized as `{"type": "text", "text": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Text { text: String },
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text { text: text.into() }
    }

    pub fn as_text(&self) -> &str {
        match self {
            Message::Text { text } => text,
        }
    }
}

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("invalid message request: {0}")]
    InvalidRequest(String),
    #[error("messaging platform rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("messaging transport failed: {0}")]
    Transport(String),
}

/// Capability to push an ordered list of messages to one recipient.
pub trait Messenger {
    fn push(&self, recipient: &str, messages: &[Message]) -> Result<(), MessagingError>;
}

/// Messenger that only logs; used when no channel credentials are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMessenger;

impl Messenger for LogMessenger {
    fn push(&self, recipient: &str, messages: &[Message]) -> Result<(), MessagingError> {
        for message in messages {
            info!(
                recipient = %redact_id(recipient),
                text = message.as_text(),
                "message not sent (no messaging channel configured)"
            );
        }
        Ok(())
    }
}

/// Fire-and-forget delivery: failures are logged and reported as `false`.
pub fn dispatch_best_effort(messenger: &dyn Messenger, recipient: &str, messages: &[Message]) -> bool {
    match messenger.push(recipient, messages) {
        Ok(()) => {
            info!(
                recipient = %redact_id(recipient),
                count = messages.len(),
                "messages dispatched"
            );
            true
        }
        Err(err) => {
            warn!(
                recipient = %redact_id(recipient),
                error = %err,
                "message dispatch failed"
            );
            false
        }
    }
}

/// First ten characters of an identifier followed by `...`.
pub fn redact_id(id: &str) -> String {
    if id.chars().count() <= 10 {
        return id.to_string();
    }
    let prefix: String = id.chars().take(10).collect();
    format!("{}...", prefix)
}
