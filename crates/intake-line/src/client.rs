use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use intake_spec::message::redact_id;
use intake_spec::{LogMessenger, Message, Messenger, MessagingError};

use crate::LineError;
use crate::config::LineConfig;

const TIMEOUT_SECS: u64 = 10;

/// Body of `POST /v2/bot/message/push`.
#[derive(Debug, Serialize)]
pub struct PushRequest<'a> {
    pub to: &'a str,
    pub messages: &'a [Message],
}

/// Checks a push before any network I/O.
pub fn push_request<'a>(
    recipient: &'a str,
    messages: &'a [Message],
) -> Result<PushRequest<'a>, MessagingError> {
    if recipient.trim().is_empty() {
        return Err(MessagingError::InvalidRequest("recipient is empty".into()));
    }
    if messages.is_empty() {
        return Err(MessagingError::InvalidRequest("no messages to send".into()));
    }
    Ok(PushRequest {
        to: recipient,
        messages,
    })
}

/// Push client for the LINE Messaging API.
pub struct LineClient {
    api_base: String,
    access_token: String,
    client: reqwest::blocking::Client,
}

impl LineClient {
    pub fn new(config: &LineConfig) -> Result<Self, LineError> {
        let access_token = config.access_token()?.to_string();
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .map_err(LineError::Client)?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            access_token,
            client,
        })
    }

    pub fn push_url(&self) -> String {
        format!("{}/v2/bot/message/push", self.api_base)
    }
}

impl Messenger for LineClient {
    fn push(&self, recipient: &str, messages: &[Message]) -> Result<(), MessagingError> {
        let body = push_request(recipient, messages)?;
        debug!(
            recipient = %redact_id(recipient),
            count = messages.len(),
            "pushing messages"
        );

        let response = self
            .client
            .post(self.push_url())
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .map_err(|err| MessagingError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(MessagingError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// LINE push client when a token is configured, otherwise a logging stand-in.
pub fn messenger_from_config(config: &LineConfig) -> Result<Box<dyn Messenger>, LineError> {
    if config.channel_access_token.is_none() {
        info!("no channel access token configured; messages will only be logged");
        return Ok(Box::new(LogMessenger));
    }
    Ok(Box::new(LineClient::new(config)?))
}
