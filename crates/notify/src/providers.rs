//! Outbound notification providers
//!
//! Thin HTTP clients over the Telegram Bot API and an HTTP email-sending
//! API. Both report the raw provider verdict (`ok` + status + body) and
//! leave retry policy to the delivery worker; a request timeout surfaces as
//! a provider error, which the worker treats as transient.
//!
//! Credentials and endpoints arrive in an explicit [`ProviderConfig`] built
//! by the process entry point; nothing here reads the environment.

use std::time::Duration;

use crate::error::{NotifyError, NotifyResult};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Provider credentials and limits, injected at construction
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Telegram bot token; unset disables the Telegram channel.
    pub telegram_bot_token: Option<String>,
    /// Base URL of the Telegram Bot API (overridable for tests).
    pub telegram_api_base: String,
    /// HTTP email API endpoint; unset switches the email channel to a no-op
    /// mock that logs and reports success.
    pub email_endpoint: Option<String>,
    /// Bearer token for the email API.
    pub email_api_key: Option<String>,
    /// From address passed to the email API.
    pub email_from: Option<String>,
    /// Upper bound on a single outbound send.
    pub send_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            telegram_api_base: TELEGRAM_API_BASE.to_string(),
            email_endpoint: None,
            email_api_key: None,
            email_from: None,
            send_timeout: Duration::from_secs(10),
        }
    }
}

/// Raw verdict of one provider call
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub ok: bool,
    pub status: u16,
    pub body: String,
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        // Building with a static configuration cannot fail at runtime; fall
        // back to the default client rather than panicking.
        .unwrap_or_default()
}

/// Telegram Bot API client (`sendMessage`)
#[derive(Clone)]
pub struct TelegramClient {
    token: Option<String>,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            token: config.telegram_bot_token.clone(),
            api_base: config.telegram_api_base.clone(),
            client: build_client(config.send_timeout),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> NotifyResult<ProviderResponse> {
        let token = self
            .token
            .as_deref()
            .ok_or(NotifyError::ProviderNotConfigured("telegram"))?;
        let url = format!("{}/bot{}/sendMessage", self.api_base, token);
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Provider(e.to_string()))?;

        let status = response.status().as_u16();
        let ok = response.status().is_success();
        let body = response.text().await.unwrap_or_default();
        Ok(ProviderResponse { ok, status, body })
    }
}

/// HTTP email API client
///
/// When no endpoint is configured the client runs in documented no-op mode:
/// every send is logged and reported as successful without any network call.
#[derive(Clone)]
pub struct EmailClient {
    endpoint: Option<String>,
    api_key: Option<String>,
    from: Option<String>,
    client: reqwest::Client,
}

impl EmailClient {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            endpoint: config.email_endpoint.clone(),
            api_key: config.email_api_key.clone(),
            from: config.email_from.clone(),
            client: build_client(config.send_timeout),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    pub async fn send(&self, to: &str, subject: &str, body: &str) -> NotifyResult<ProviderResponse> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            tracing::warn!(to = %to, "Email endpoint not configured; message dropped (no-op mode)");
            return Ok(ProviderResponse {
                ok: true,
                status: 0,
                body: "noop".to_string(),
            });
        };

        let payload = serde_json::json!({
            "from": self.from,
            "to": to,
            "subject": subject,
            "text": body,
        });

        let mut request = self.client.post(endpoint).json(&payload);
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Provider(e.to_string()))?;

        let status = response.status().as_u16();
        let ok = response.status().is_success();
        let body = response.text().await.unwrap_or_default();
        Ok(ProviderResponse { ok, status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(server: &mockito::ServerGuard) -> ProviderConfig {
        ProviderConfig {
            telegram_bot_token: Some("test-token".to_string()),
            telegram_api_base: server.url(),
            email_endpoint: Some(format!("{}/emails", server.url())),
            email_api_key: Some("email-key".to_string()),
            email_from: Some("reminders@subwatch.dev".to_string()),
            send_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn telegram_send_hits_bot_api() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bottest-token/sendMessage")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_body(r#"{"ok":true,"result":{"message_id":1}}"#)
            .create_async()
            .await;

        let client = TelegramClient::new(&config_for(&server));
        let response = client.send_message("42", "hello").await.unwrap();

        mock.assert_async().await;
        assert!(response.ok);
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn telegram_non_2xx_is_reported_not_raised() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bottest-token/sendMessage")
            .with_status(429)
            .with_body(r#"{"ok":false,"description":"Too Many Requests"}"#)
            .create_async()
            .await;

        let client = TelegramClient::new(&config_for(&server));
        let response = client.send_message("42", "hello").await.unwrap();

        assert!(!response.ok);
        assert_eq!(response.status, 429);
        assert!(response.body.contains("Too Many Requests"));
    }

    #[tokio::test]
    async fn telegram_without_token_is_not_configured() {
        let client = TelegramClient::new(&ProviderConfig::default());
        assert!(!client.is_configured());
        let err = client.send_message("42", "hello").await.unwrap_err();
        assert!(matches!(err, NotifyError::ProviderNotConfigured("telegram")));
    }

    #[tokio::test]
    async fn email_send_posts_to_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/emails")
            .match_header("authorization", "Bearer email-key")
            .with_status(200)
            .with_body(r#"{"id":"msg_1"}"#)
            .create_async()
            .await;

        let client = EmailClient::new(&config_for(&server));
        let response = client
            .send("user@example.com", "Renewal", "Streamflix renews tomorrow")
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(response.ok);
    }

    #[tokio::test]
    async fn email_unconfigured_is_a_successful_noop() {
        let client = EmailClient::new(&ProviderConfig::default());
        assert!(!client.is_enabled());
        let response = client
            .send("user@example.com", "Renewal", "body")
            .await
            .unwrap();
        assert!(response.ok);
        assert_eq!(response.body, "noop");
    }
}
