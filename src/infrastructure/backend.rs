use crate::config::BackendConfig;
use crate::domain::payment_link::PaymentRequest;
use crate::domain::ports::VerificationClient;
use crate::domain::settlement::{SettlementRecord, VerificationRequest};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Bearer credential for the merchant backend, supplied by the host.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

/// Pulls the human-readable reason out of a backend error body.
pub fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let field = parsed.as_ref().and_then(|value| {
        value
            .get("message")
            .or_else(|| value.get("error"))
            .and_then(|m| m.as_str())
    });
    match field {
        Some(message) => message.to_string(),
        None if body.trim().is_empty() => "Verification with merchant failed.".to_string(),
        None => body.trim().chars().take(200).collect(),
    }
}

/// REST client for the merchant backend.
pub struct HttpVerificationClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<SessionToken>,
}

impl HttpVerificationClient {
    pub fn new(config: &BackendConfig, token: Option<SessionToken>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PaymentError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(SessionToken(token)) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::Transport(format!("Failed to read backend response: {}", e)))?;
        if !status.is_success() {
            return Err(PaymentError::Transport(format!(
                "backend returned {}: {}",
                status.as_u16(),
                error_message(&body)
            )));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl VerificationClient for HttpVerificationClient {
    async fn fetch_link(&self, link_id: &str) -> Result<PaymentRequest> {
        let url = self.url(&format!("payments/links/{}", link_id));
        debug!(%url, "fetching payment link");
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| PaymentError::Transport(format!("Could not load payment details: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(PaymentError::LinkNotFound(link_id.to_string()));
        }
        Self::read_json(response).await
    }

    async fn verify(&self, request: &VerificationRequest) -> Result<SettlementRecord> {
        let url = self.url("payments/verify");
        debug!(%url, signature = %request.transaction_signature, "verifying settlement");
        let response = self
            .authorize(self.client.post(&url).json(request))
            .send()
            .await
            .map_err(|e| PaymentError::Transport(format!("Verification request failed: {}", e)))?;
        Self::read_json(response).await
    }
}
