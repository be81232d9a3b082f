//! src/notifications.rs
//!
//! Outbound notification dispatch: transactional email and chat webhook.
//! Both channels are optional features of a deployment; missing credentials
//! turn a send into a logged no-op rather than an error. Once a delivery is
//! actually attempted, failures are surfaced, never swallowed. One attempt
//! per call, retries are the caller's business.

mod chat_client;
mod email_client;

pub use chat_client::{send_chat_message, ChatClient};
pub use email_client::{send_email, EmailClient};

use crate::error::error_chain_fmt;

/// A delivery that was attempted and failed.
#[derive(thiserror::Error)]
pub enum DeliveryError {
    #[error("Failed to reach the provider.")]
    Transport(#[from] reqwest::Error),
    #[error("The provider rejected the request with status {0}.")]
    Rejected(reqwest::StatusCode),
}

impl std::fmt::Debug for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
