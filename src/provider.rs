//! Provider Launch Client
//!
//! Outbound side of the integration: after a session is created the
//! casino tells the provider to spin up its own session. The request
//! body is serialized once, signed with `x-casino-signature` over those
//! exact bytes, and sent verbatim so the provider can verify what it
//! received.
//!
//! A launch notification failure never invalidates the casino session;
//! the provider session id is simply never attached.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signature::{self, CASINO_SIGNATURE_HEADER};

/// Provider call errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("provider rejected launch with status {0}")]
    Rejected(u16),

    #[error("provider ack did not carry a session id")]
    MissingSessionId,
}

/// Body of the Casino -> Provider launch call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderLaunchRequest {
    pub user_id: i64,
    pub username: String,
    /// The provider's own identifier for the game
    pub game_id: String,
    pub session_token: String,
    pub currency: String,
    pub balance: i64,
}

/// The provider's launch acknowledgement
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderLaunchAck {
    pub success: bool,
    pub provider_session_id: Option<String>,
}

/// Outbound launch notification seam. The HTTP impl is used in
/// production; tests and the demo swap in a no-op.
#[async_trait]
pub trait ProviderNotifier: Send + Sync {
    /// Tell the provider about a new session; returns the provider's
    /// own session id.
    async fn notify_launch(
        &self,
        api_url: &str,
        request: &ProviderLaunchRequest,
    ) -> Result<String, ProviderError>;
}

/// HTTP provider client with a bounded request timeout
pub struct HttpProviderNotifier {
    client: Client,
    casino_secret: String,
}

impl HttpProviderNotifier {
    pub fn new(casino_secret: String, timeout_secs: u64) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            casino_secret,
        })
    }
}

#[async_trait]
impl ProviderNotifier for HttpProviderNotifier {
    async fn notify_launch(
        &self,
        api_url: &str,
        request: &ProviderLaunchRequest,
    ) -> Result<String, ProviderError> {
        let body = serde_json::to_vec(request)?;
        let sig = signature::sign(&self.casino_secret, &body);
        let url = format!("{}/provider/launchSession", api_url.trim_end_matches('/'));

        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header(CASINO_SIGNATURE_HEADER, sig)
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ProviderError::Rejected(resp.status().as_u16()));
        }

        let ack: ProviderLaunchAck = resp.json().await?;
        if !ack.success {
            return Err(ProviderError::Rejected(200));
        }
        ack.provider_session_id
            .ok_or(ProviderError::MissingSessionId)
    }
}

/// No-op notifier for the demo and for tests: acks every launch with a
/// synthetic provider session id.
#[derive(Debug, Default)]
pub struct NoopProviderNotifier;

#[async_trait]
impl ProviderNotifier for NoopProviderNotifier {
    async fn notify_launch(
        &self,
        _api_url: &str,
        request: &ProviderLaunchRequest,
    ) -> Result<String, ProviderError> {
        Ok(format!("noop-{}", &request.session_token[..8.min(request.session_token.len())]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_notifier_acks() {
        let notifier = NoopProviderNotifier;
        let request = ProviderLaunchRequest {
            user_id: 1,
            username: "alice".to_string(),
            game_id: "boc-1".to_string(),
            session_token: "feedfacefeedface".to_string(),
            currency: "USD".to_string(),
            balance: 10_000,
        };

        let id = notifier.notify_launch("http://unused", &request).await.unwrap();
        assert_eq!(id, "noop-feedface");
    }

    #[test]
    fn test_outbound_body_signature_verifies() {
        let request = ProviderLaunchRequest {
            user_id: 1,
            username: "alice".to_string(),
            game_id: "boc-1".to_string(),
            session_token: "tok".to_string(),
            currency: "USD".to_string(),
            balance: 0,
        };

        // The provider verifies the exact bytes we sign and send
        let body = serde_json::to_vec(&request).unwrap();
        let sig = signature::sign("casino-secret", &body);
        assert!(signature::verify("casino-secret", &body, &sig).is_ok());
    }
}
