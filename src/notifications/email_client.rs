//! Transactional email over the SES-style HTTP API.

use secrecy::{ExposeSecret, Secret};
use uuid::Uuid;

use super::DeliveryError;
use crate::configuration::EmailSettings;

// Provider timeouts are fixed: a slow provider gets cut off, it never gets
// to stall the caller indefinitely.
const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
const READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

pub struct EmailClient {
    http_client: reqwest::Client,
    base_url: String,
    from_email: String,
    access_key: String,
    secret_key: Secret<String>,
}

impl EmailClient {
    /// Build a client from settings, or `None` when any provider credential
    /// is missing. The underlying HTTP client (TLS setup, connection pool,
    /// timeouts) is built here once and reused across sends.
    ///
    /// Request signing is handled by the deployment's IAM-authenticating
    /// egress proxy; the credential pair travels as basic auth, like the
    /// provider's SMTP interface.
    pub fn from_settings(settings: &EmailSettings) -> Option<Self> {
        if !settings.is_configured() {
            return None;
        }
        let region = settings.ses_region.clone()?;
        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| format!("https://email.{}.amazonaws.com", region));
        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(READ_TIMEOUT)
            .build()
            // Build only fails when the TLS backend cannot be initialised;
            // `reqwest::Client::new` panics in the same situation.
            .expect("Failed to build the email HTTP client");
        Some(Self {
            http_client,
            base_url,
            from_email: settings.ses_from_email.clone()?,
            access_key: settings.ses_access_key.clone()?,
            secret_key: settings.ses_secret_key.clone()?,
        })
    }

    pub async fn send(
        &self,
        recipient: &str,
        subject: &str,
        html_content: &str,
        text_content: &str,
    ) -> Result<String, DeliveryError> {
        let url = format!("{}/v2/email/outbound-emails", self.base_url);
        let request_body = SendEmailRequest {
            from_email_address: &self.from_email,
            destination: Destination {
                to_addresses: vec![recipient],
            },
            content: Content {
                simple: Message {
                    subject: Body {
                        data: subject,
                    },
                    body: MessageBody {
                        html: Body { data: html_content },
                        text: Body { data: text_content },
                    },
                },
            },
        };

        // One attempt per call; reliability layers (retry, queueing) belong
        // to the caller.
        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.access_key, Some(self.secret_key.expose_secret()))
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DeliveryError::Rejected(response.status()));
        }
        let response: SendEmailResponse = response.json().await?;
        Ok(response.message_id)
    }
}

/// Send a transactional email, rendering `body_markdown` to HTML.
///
/// Returns `Ok(None)` when the channel is not configured (an expected state,
/// not an error), `Ok(Some(message_id))` on success. In mock mode a unique
/// synthetic id is returned and no network traffic happens at all.
pub async fn send_email(
    settings: &EmailSettings,
    recipient: &str,
    subject: &str,
    body_markdown: &str,
) -> Result<Option<String>, DeliveryError> {
    let Some(client) = EmailClient::from_settings(settings) else {
        tracing::info!(
            "Email to {} skipped: provider not fully configured.",
            recipient
        );
        return Ok(None);
    };

    if settings.mock_send {
        tracing::info!(
            "Mock send: email to {} would have been sent.",
            recipient
        );
        return Ok(Some(format!("mock-msg-{}", Uuid::new_v4())));
    }

    let body_html = render_markdown(body_markdown);
    match client
        .send(recipient, subject, &body_html, body_markdown)
        .await
    {
        Ok(message_id) => Ok(Some(message_id)),
        Err(e) => {
            tracing::error!("Failed to send email to {}: {:?}", recipient, e);
            Err(e)
        }
    }
}

fn render_markdown(markdown: &str) -> String {
    let parser = pulldown_cmark::Parser::new(markdown);
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, parser);
    html
}

#[derive(serde::Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendEmailRequest<'a> {
    from_email_address: &'a str,
    destination: Destination<'a>,
    content: Content<'a>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "PascalCase")]
struct Destination<'a> {
    to_addresses: Vec<&'a str>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "PascalCase")]
struct Content<'a> {
    simple: Message<'a>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "PascalCase")]
struct Message<'a> {
    subject: Body<'a>,
    body: MessageBody<'a>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "PascalCase")]
struct MessageBody<'a> {
    html: Body<'a>,
    text: Body<'a>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "PascalCase")]
struct Body<'a> {
    data: &'a str,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendEmailResponse {
    message_id: String,
}
