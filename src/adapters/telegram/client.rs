//! Telegram Bot API Client
//!
//! `sendMessage` for delivery and `getMe` for the startup credential check.
//! Every Bot API reply is an envelope `{ok, result | error_code, description}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::ports::notifier::{Notifier, NotifyError, OutgoingMessage};

/// Telegram client configuration
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_base_url: String,
    pub bot_token: String,
    pub chat_id: String,
    pub timeout: Duration,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.telegram.org".to_string(),
            bot_token: String::new(),
            chat_id: String::new(),
            timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram notifier
#[derive(Debug, Clone)]
pub struct TelegramClient {
    config: TelegramConfig,
    http: Client,
}

impl TelegramClient {
    pub fn new(config: TelegramConfig) -> Result<Self, NotifyError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NotifyError::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    pub fn chat_id(&self) -> &str {
        &self.config.chat_id
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base_url, self.config.bot_token, method
        )
    }

    fn map_request_error(e: reqwest::Error) -> NotifyError {
        if e.is_timeout() {
            NotifyError::Timeout
        } else {
            // reqwest includes the URL, and with it the token
            NotifyError::HttpError(e.without_url().to_string())
        }
    }

    async fn handle_response(response: Response) -> Result<Option<Value>, NotifyError> {
        let status = response.status();
        let body = response.text().await.map_err(Self::map_request_error)?;

        let envelope: ApiEnvelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(NotifyError::Malformed(e.to_string()));
            }
            Err(_) => {
                return Err(NotifyError::Rejected {
                    code: status.as_u16(),
                    description: body.chars().take(200).collect(),
                });
            }
        };

        if envelope.ok {
            return Ok(envelope.result);
        }

        let code = envelope.error_code.unwrap_or(status.as_u16());
        let description = envelope
            .description
            .unwrap_or_else(|| "no description".to_string());

        if code == StatusCode::UNAUTHORIZED.as_u16() || code == StatusCode::NOT_FOUND.as_u16() {
            Err(NotifyError::Unauthorized(description))
        } else {
            Err(NotifyError::Rejected { code, description })
        }
    }
}

/// Build the `sendMessage` request body
pub fn build_send_payload(chat_id: &str, message: &OutgoingMessage) -> Value {
    let mut payload = json!({
        "chat_id": chat_id,
        "text": message.text,
        "parse_mode": message.parse_mode.as_str(),
        "disable_web_page_preview": true,
    });

    if let Some(button) = &message.button {
        payload["reply_markup"] = json!({
            "inline_keyboard": [[{ "text": button.label, "url": button.url }]]
        });
    }

    payload
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn verify(&self) -> Result<String, NotifyError> {
        let response = self
            .http
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(Self::map_request_error)?;

        let result = Self::handle_response(response)
            .await?
            .ok_or_else(|| NotifyError::Malformed("getMe returned no result".to_string()))?;

        result
            .get("username")
            .and_then(Value::as_str)
            .map(|name| format!("@{}", name))
            .ok_or_else(|| NotifyError::Malformed("getMe result has no username".to_string()))
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<(), NotifyError> {
        let payload = build_send_payload(&self.config.chat_id, message);

        let response = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&payload)
            .send()
            .await
            .map_err(Self::map_request_error)?;

        Self::handle_response(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TelegramClient {
        TelegramClient::new(TelegramConfig {
            bot_token: "123:abc".to_string(),
            chat_id: "-100".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = TelegramConfig::default();
        assert_eq!(config.api_base_url, "https://api.telegram.org");
        assert_eq!(config.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_method_url() {
        assert_eq!(
            client().method_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_payload_with_button() {
        let message = OutgoingMessage::markdown("💎 BTC/EUR | \u{2212}8.5% | 91.50€")
            .with_button("🚀 COMPRAR", "https://bit2me.com/es/precio/btc");

        let payload = build_send_payload("-100", &message);

        assert_eq!(payload["chat_id"], "-100");
        assert_eq!(payload["parse_mode"], "Markdown");
        assert_eq!(payload["disable_web_page_preview"], true);
        let button = &payload["reply_markup"]["inline_keyboard"][0][0];
        assert_eq!(button["text"], "🚀 COMPRAR");
        assert_eq!(button["url"], "https://bit2me.com/es/precio/btc");
    }

    #[test]
    fn test_payload_html_without_button() {
        let payload = build_send_payload("42", &OutgoingMessage::html("<b>Bot started</b>"));
        assert_eq!(payload["parse_mode"], "HTML");
        assert!(payload.get("reply_markup").is_none());
    }

    #[test]
    fn test_envelope_parsing() {
        let ok: ApiEnvelope =
            serde_json::from_str(r#"{"ok":true,"result":{"username":"dip_bot"}}"#).unwrap();
        assert!(ok.ok);
        assert_eq!(ok.result.unwrap()["username"], "dip_bot");

        let err: ApiEnvelope = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        )
        .unwrap();
        assert!(!err.ok);
        assert_eq!(err.error_code, Some(400));
    }
}
