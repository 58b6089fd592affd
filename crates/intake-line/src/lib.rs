#![allow(missing_docs)]

pub mod client;
pub mod config;
pub mod webhook;

use thiserror::Error;

pub use client::{LineClient, PushRequest, messenger_from_config, push_request};
pub use config::{DEFAULT_API_BASE, LineConfig};
pub use webhook::{
    EventMessage, EventSource, WebhookEvent, WebhookPayload, WebhookSummary, dispatch,
    handle_webhook, parse_webhook, sign, verify_signature,
};

#[derive(Debug, Error)]
pub enum LineError {
    #[error("{0} is not configured")]
    MissingSetting(&'static str),
    #[error("http client setup failed: {0}")]
    Client(#[source] reqwest::Error),
    #[error("webhook signature does not match")]
    BadSignature,
    #[error("webhook body is not valid: {0}")]
    InvalidWebhook(#[source] serde_json::Error),
}
