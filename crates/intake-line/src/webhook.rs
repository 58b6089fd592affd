use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};

use intake_spec::message::redact_id;

use crate::LineError;

type HmacSha256 = Hmac<Sha256>;

/// Base64 HMAC-SHA256 of `body` keyed by the channel secret.
pub fn sign(channel_secret: &str, body: &[u8]) -> String {
    let mut mac = mac_for(channel_secret);
    mac.update(body);
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Compares the `x-line-signature` header against the raw request body.
pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let mut mac = mac_for(channel_secret);
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn mac_for(channel_secret: &str) -> HmacSha256 {
    match HmacSha256::new_from_slice(channel_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("hmac key length is unrestricted"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventMessage {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebhookEvent {
    Message {
        #[serde(default)]
        source: EventSource,
        message: EventMessage,
    },
    Follow {
        #[serde(default)]
        source: EventSource,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSummary {
    pub text_messages: usize,
    pub follows: usize,
    pub ignored: usize,
}

pub fn parse_webhook(body: &[u8]) -> Result<WebhookPayload, LineError> {
    serde_json::from_slice(body).map_err(LineError::InvalidWebhook)
}

/// Logs each event with a redacted user id and tallies them.
pub fn dispatch(events: &[WebhookEvent]) -> WebhookSummary {
    let mut summary = WebhookSummary::default();
    for event in events {
        match event {
            WebhookEvent::Message {
                source,
                message: EventMessage::Text { text },
            } => {
                info!(user = %user_label(source), text = %text, "text message received");
                summary.text_messages += 1;
            }
            WebhookEvent::Follow { source } => {
                info!(user = %user_label(source), "new follower");
                summary.follows += 1;
            }
            _ => summary.ignored += 1,
        }
    }
    summary
}

/// Signature check, parse and dispatch for one webhook delivery.
pub fn handle_webhook(
    channel_secret: &str,
    body: &[u8],
    signature: &str,
) -> Result<WebhookSummary, LineError> {
    if !verify_signature(channel_secret, body, signature) {
        warn!("rejecting webhook with invalid signature");
        return Err(LineError::BadSignature);
    }
    let payload = parse_webhook(body)?;
    Ok(dispatch(&payload.events))
}

fn user_label(source: &EventSource) -> String {
    source
        .user_id
        .as_deref()
        .map(redact_id)
        .unwrap_or_else(|| "unknown".to_string())
}
