//! Dispatch tests against a stubbed provider.
//!
//! A `MockServer` stands in for the email provider / chat webhook; mocks
//! with `.expect(0)` double as proof that no network call was made.

use backend_core::configuration::{ChatSettings, EmailSettings};
use backend_core::notifications::{
    send_chat_message, send_email, ChatClient, DeliveryError, EmailClient,
};
use backend_core::telemetry::{get_line_subscriber, get_subscriber, init_subscriber};
use claim::{assert_none, assert_some};
use once_cell::sync::Lazy;
use secrecy::Secret;
use serde_json::{json, Value};
use wiremock::matchers::{any, body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// Ensure that the `tracing` stack is only initialised once
static TRACING: Lazy<()> = Lazy::new(|| match std::env::var("TEST_LOG") {
    Ok(v) if v == "json" => init_subscriber(get_subscriber(
        "test".into(),
        "debug".into(),
        std::io::stdout,
    )),
    Ok(_) => init_subscriber(get_line_subscriber(
        "debug".into(),
        std::io::stdout,
    )),
    Err(_) => init_subscriber(get_subscriber(
        "test".into(),
        "debug".into(),
        std::io::sink,
    )),
});

fn email_settings(base_url: &str) -> EmailSettings {
    Lazy::force(&TRACING);
    EmailSettings {
        ses_region: Some("eu-west-1".into()),
        ses_access_key: Some("AKIATESTKEY".into()),
        ses_secret_key: Some(Secret::new("test-secret".into())),
        ses_from_email: Some("noreply@corp.com".into()),
        base_url: Some(base_url.into()),
        mock_send: false,
    }
}

fn chat_settings(webhook_url: Option<String>) -> ChatSettings {
    Lazy::force(&TRACING);
    ChatSettings { webhook_url }
}

#[tokio::test]
async fn email_is_skipped_when_the_provider_is_not_configured() {
    // Arrange
    let provider = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&provider)
        .await;
    let mut settings = email_settings(&provider.uri());
    settings.ses_access_key = None;

    // Act
    let outcome = send_email(&settings, "a@corp.com", "Hi", "body")
        .await
        .unwrap();

    // Assert
    assert_none!(outcome);
}

#[tokio::test]
async fn mock_mode_returns_unique_synthetic_ids_without_network_calls() {
    // Arrange
    let provider = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&provider)
        .await;
    let mut settings = email_settings(&provider.uri());
    settings.mock_send = true;

    // Act
    let first = send_email(&settings, "a@corp.com", "Hi", "body")
        .await
        .unwrap();
    let second = send_email(&settings, "a@corp.com", "Hi", "body")
        .await
        .unwrap();

    // Assert
    let first = assert_some!(first);
    let second = assert_some!(second);
    assert!(first.starts_with("mock-msg-"));
    assert_ne!(first, second);
}

#[tokio::test]
async fn email_send_posts_html_and_text_bodies_and_returns_the_message_id() {
    // Arrange
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/email/outbound-emails"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "MessageId": "provider-id-42" })),
        )
        .expect(1)
        .mount(&provider)
        .await;
    let settings = email_settings(&provider.uri());

    // Act
    let outcome = send_email(
        &settings,
        "a@corp.com",
        "Welcome",
        "# Hello\n\nGlad to have you.",
    )
    .await
    .unwrap();

    // Assert
    assert_eq!(outcome, Some("provider-id-42".to_string()));
    let request = &provider.received_requests().await.unwrap()[0];
    let body: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["FromEmailAddress"], "noreply@corp.com");
    assert_eq!(body["Destination"]["ToAddresses"][0], "a@corp.com");
    assert_eq!(body["Content"]["Simple"]["Subject"]["Data"], "Welcome");
    let html = body["Content"]["Simple"]["Body"]["Html"]["Data"]
        .as_str()
        .unwrap();
    assert!(html.contains("<h1>Hello</h1>"));
    // The plain-text part carries the unrendered markdown.
    let text = body["Content"]["Simple"]["Body"]["Text"]["Data"]
        .as_str()
        .unwrap();
    assert!(text.starts_with("# Hello"));
}

#[tokio::test]
async fn an_email_client_is_reused_across_sends() {
    // Arrange
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/email/outbound-emails"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "MessageId": "provider-id-7" })),
        )
        .expect(2)
        .mount(&provider)
        .await;
    let settings = email_settings(&provider.uri());
    let client = EmailClient::from_settings(&settings).unwrap();

    // Act & Assert: the same client (and its connection pool) serves
    // consecutive sends.
    for _ in 0..2 {
        let message_id = client
            .send("a@corp.com", "Hi", "<p>body</p>", "body")
            .await
            .unwrap();
        assert_eq!(message_id, "provider-id-7");
    }
}

#[tokio::test]
async fn an_unreachable_email_provider_is_a_transport_error() {
    // Arrange: nothing listens on the discard port.
    let settings = email_settings("http://127.0.0.1:9");

    // Act
    let result = send_email(&settings, "a@corp.com", "Hi", "body").await;

    // Assert
    assert!(matches!(result, Err(DeliveryError::Transport(_))));
}

#[tokio::test]
async fn a_provider_rejection_surfaces_as_a_delivery_error() {
    // Arrange
    let provider = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&provider)
        .await;
    let settings = email_settings(&provider.uri());

    // Act
    let result = send_email(&settings, "a@corp.com", "Hi", "body").await;

    // Assert
    assert!(matches!(result, Err(DeliveryError::Rejected(status)) if status.as_u16() == 500));
}

#[tokio::test]
async fn chat_message_is_skipped_without_a_webhook() {
    // Arrange
    let settings = chat_settings(None);

    // Act
    let delivered = send_chat_message(&settings, "deploy finished")
        .await
        .unwrap();

    // Assert
    assert!(!delivered);
}

#[tokio::test]
async fn chat_message_posts_the_text_payload() {
    // Arrange
    let webhook = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_json(json!({ "text": "deploy finished" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&webhook)
        .await;
    let settings = chat_settings(Some(webhook.uri()));

    // Act
    let delivered = send_chat_message(&settings, "deploy finished")
        .await
        .unwrap();

    // Assert
    assert!(delivered);
}

#[tokio::test]
async fn a_chat_client_is_reused_across_sends() {
    // Arrange
    let webhook = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&webhook)
        .await;
    let settings = chat_settings(Some(webhook.uri()));
    let client = ChatClient::from_settings(&settings).unwrap();

    // Act & Assert
    claim::assert_ok!(client.send("first").await);
    claim::assert_ok!(client.send("second").await);
}

#[tokio::test]
async fn an_unreachable_chat_webhook_is_a_transport_error() {
    // Arrange: nothing listens on the discard port.
    let settings = chat_settings(Some("http://127.0.0.1:9".into()));

    // Act
    let result = send_chat_message(&settings, "deploy finished").await;

    // Assert
    assert!(matches!(result, Err(DeliveryError::Transport(_))));
}

#[tokio::test]
async fn a_chat_webhook_failure_is_a_delivery_error() {
    // Arrange
    let webhook = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&webhook)
        .await;
    let settings = chat_settings(Some(webhook.uri()));

    // Act
    let result = send_chat_message(&settings, "deploy finished").await;

    // Assert
    assert!(matches!(result, Err(DeliveryError::Rejected(_))));
}
