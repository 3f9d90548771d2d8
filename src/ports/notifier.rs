use async_trait::async_trait;
use thiserror::Error;

/// Notification delivery error type
#[derive(Error, Debug, Clone)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Chat API rejected the request ({code}): {description}")]
    Rejected { code: u16, description: String },

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Markup flavor of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Markdown,
    Html,
}

impl ParseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMode::Markdown => "Markdown",
            ParseMode::Html => "HTML",
        }
    }
}

/// Inline call-to-action button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionButton {
    pub label: String,
    pub url: String,
}

/// A message ready for the chat channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub parse_mode: ParseMode,
    pub button: Option<ActionButton>,
}

impl OutgoingMessage {
    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: ParseMode::Markdown,
            button: None,
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: ParseMode::Html,
            button: None,
        }
    }

    pub fn with_button(mut self, label: impl Into<String>, url: impl Into<String>) -> Self {
        self.button = Some(ActionButton {
            label: label.into(),
            url: url.into(),
        });
        self
    }
}

/// Chat channel port
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Check credentials; returns the bot's display name
    async fn verify(&self) -> Result<String, NotifyError>;

    /// Deliver one message
    async fn send(&self, message: &OutgoingMessage) -> Result<(), NotifyError>;
}
