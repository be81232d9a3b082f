//! Chat-space notifications via an incoming webhook.

use super::DeliveryError;
use crate::configuration::ChatSettings;

// The webhook path has no provider-mandated timeout; bound it so a stuck
// chat service cannot block a caller indefinitely.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

pub struct ChatClient {
    http_client: reqwest::Client,
    webhook_url: String,
}

impl ChatClient {
    /// Build a client from settings, or `None` when no webhook is
    /// configured. The HTTP client is built here once and reused.
    pub fn from_settings(settings: &ChatSettings) -> Option<Self> {
        let webhook_url = settings.webhook_url.clone()?;
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            // Build only fails when the TLS backend cannot be initialised;
            // `reqwest::Client::new` panics in the same situation.
            .expect("Failed to build the chat HTTP client");
        Some(Self {
            http_client,
            webhook_url,
        })
    }

    pub async fn send(&self, text: &str) -> Result<(), DeliveryError> {
        let response = self
            .http_client
            .post(&self.webhook_url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to reach chat webhook: {}", e);
                DeliveryError::Transport(e)
            })?;

        if !response.status().is_success() {
            tracing::error!(
                "Chat webhook rejected the message with status {}.",
                response.status()
            );
            return Err(DeliveryError::Rejected(response.status()));
        }
        Ok(())
    }
}

/// Post `text` to the configured chat webhook.
///
/// Returns `Ok(false)` when no webhook is configured (a logged no-op) and
/// `Ok(true)` when the webhook accepted the message. A non-success status
/// or a network failure is a `DeliveryError` for the caller to handle.
pub async fn send_chat_message(
    settings: &ChatSettings,
    text: &str,
) -> Result<bool, DeliveryError> {
    let Some(client) = ChatClient::from_settings(settings) else {
        tracing::info!("Chat notification skipped: webhook URL not configured.");
        return Ok(false);
    };
    client.send(text).await?;
    Ok(true)
}
