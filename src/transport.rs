//! Telegram message transport.
//!
//! Outbound delivery goes through the `MessagingTransport` trait so the
//! pipeline can be exercised with a fake. The production implementation
//! uses the Bot API: `sendMessage` for deliveries and `getUpdates`
//! long-polling to feed the command layer.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Telegram rejects messages longer than this
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// Timeout for sendMessage requests
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SendError {
    #[error("telegram request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("telegram rejected the request: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait MessagingTransport: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), SendError>;
}

/// Truncate a message to the Telegram limit.
/// Cuts at a char boundary, preferring a word boundary, with an "..." suffix.
pub fn truncate_message(message: &str) -> String {
    if message.len() <= MAX_MESSAGE_LENGTH {
        return message.to_string();
    }

    let target_len = MAX_MESSAGE_LENGTH - 3;
    let mut truncate_at = target_len;
    while truncate_at > 0 && !message.is_char_boundary(truncate_at) {
        truncate_at -= 1;
    }
    if truncate_at == 0 {
        return "...".to_string();
    }

    let truncated = &message[..truncate_at];
    let truncated = truncated
        .rfind(' ')
        .filter(|&pos| pos > truncate_at / 2)
        .map(|pos| &truncated[..pos])
        .unwrap_or(truncated);

    format!("{}...", truncated)
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<T>,
}

/// An incoming update from getUpdates
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<Sender>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub first_name: Option<String>,
}

pub struct TelegramTransport {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramTransport {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("{}/bot{}", TELEGRAM_API_URL, config.telegram_token),
        }
    }

    /// Long-poll for updates after `offset`. `timeout_secs` is the server-side
    /// hold; the request timeout is padded past it.
    pub async fn poll_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, SendError> {
        let response = self
            .client
            .get(format!("{}/getUpdates", self.base_url))
            .query(&[("offset", offset), ("timeout", timeout_secs as i64)])
            .timeout(Duration::from_secs(timeout_secs + 10))
            .send()
            .await?;

        let body: ApiResponse<Vec<Update>> = response.json().await?;
        if !body.ok {
            let reason = body.description.unwrap_or_else(|| "unknown error".to_string());
            return Err(SendError::Rejected(reason));
        }
        Ok(body.result.unwrap_or_default())
    }
}

#[async_trait]
impl MessagingTransport for TelegramTransport {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
        let text = truncate_message(text);
        debug!("Sending {} chars to chat {}", text.len(), chat_id);

        let response = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .timeout(SEND_TIMEOUT)
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
            }))
            .send()
            .await?;

        let body: ApiResponse<serde_json::Value> = response.json().await?;
        if !body.ok {
            let reason = body.description.unwrap_or_else(|| "unknown error".to_string());
            return Err(SendError::Rejected(reason));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_message() {
        let short = "Weather in Warsaw: cloudy, 20.0°C";
        assert_eq!(truncate_message(short), short);
    }

    #[test]
    fn test_truncate_exact_length() {
        let exact = "a".repeat(MAX_MESSAGE_LENGTH);
        assert_eq!(truncate_message(&exact), exact);
    }

    #[test]
    fn test_truncate_long_message() {
        let long = "a".repeat(MAX_MESSAGE_LENGTH + 100);
        let result = truncate_message(&long);
        assert!(result.len() <= MAX_MESSAGE_LENGTH);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn test_truncate_prefers_word_boundary() {
        let long = "word ".repeat(MAX_MESSAGE_LENGTH / 5 + 10);
        let result = truncate_message(&long);
        assert!(result.len() <= MAX_MESSAGE_LENGTH);
        let before_dots = result.trim_end_matches("...");
        assert!(long.starts_with(before_dots));
    }

    #[test]
    fn test_truncate_multibyte_boundary() {
        let long = "°".repeat(MAX_MESSAGE_LENGTH); // 2 bytes each
        let result = truncate_message(&long);
        assert!(result.len() <= MAX_MESSAGE_LENGTH);
        // Must still be valid UTF-8 all the way through
        assert!(result.chars().all(|c| c == '°' || c == '.'));
    }

    #[test]
    fn test_api_response_ok() {
        let json = r#"{"ok": true, "result": []}"#;
        let response: ApiResponse<Vec<Update>> = serde_json::from_str(json).unwrap();
        assert!(response.ok);
        assert_eq!(response.result.unwrap().len(), 0);
    }

    #[test]
    fn test_api_response_error() {
        let json = r#"{"ok": false, "description": "Unauthorized"}"#;
        let response: ApiResponse<Vec<Update>> = serde_json::from_str(json).unwrap();
        assert!(!response.ok);
        assert_eq!(response.description.as_deref(), Some("Unauthorized"));
    }

    #[test]
    fn test_update_parses_text_message() {
        let json = r#"{
            "update_id": 101,
            "message": {
                "chat": {"id": 123456789},
                "from": {"first_name": "Vitya"},
                "text": "/start"
            }
        }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.chat.id, 123456789);
        assert_eq!(message.from.unwrap().first_name.as_deref(), Some("Vitya"));
        assert_eq!(message.text.as_deref(), Some("/start"));
    }

    #[test]
    fn test_update_without_message() {
        // Non-message updates (edits, callbacks) still parse
        let json = r#"{"update_id": 102}"#;
        let update: Update = serde_json::from_str(json).unwrap();
        assert!(update.message.is_none());
    }
}
