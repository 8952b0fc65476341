use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const SLACK_POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("slack rejected message: {0}")]
    Rejected(String),
}

/// Delivers alert text to a chat channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, text: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub token: String,
    pub channel: String,
}

pub struct SlackNotifier {
    http: reqwest::Client,
    config: SlackConfig,
}

#[derive(Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl SlackNotifier {
    pub fn new(config: SlackConfig) -> Result<Self, NotifyError> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            config,
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send_message(&self, text: &str) -> Result<(), NotifyError> {
        debug!(channel = %self.config.channel, "Posting alert to slack");
        let response: SlackResponse = self
            .http
            .post(SLACK_POST_MESSAGE_URL)
            .bearer_auth(&self.config.token)
            .json(&json!({ "channel": self.config.channel, "text": text }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.ok {
            Ok(())
        } else {
            Err(NotifyError::Rejected(
                response.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

/// Notifier double that records every message.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: parking_lot::Mutex<Vec<String>>,
    pub fail: bool,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_message(&self, text: &str) -> Result<(), NotifyError> {
        self.messages.lock().push(text.to_string());
        if self.fail {
            Err(NotifyError::Rejected("channel_not_found".to_string()))
        } else {
            Ok(())
        }
    }
}
