// crates/server/src/telegram.rs
//! Bot-API transport: delivers one photo with a caption per call.
//!
//! Response contract:
//! - `200 {"ok":true,...}` → sent
//! - `429 {"ok":false,"parameters":{"retry_after":N}}` → rate limited for N seconds
//! - anything else → failed with the endpoint's `description` (or the HTTP status)

use std::time::Duration;

use async_trait::async_trait;
use bulksend_jobs::{DeliveryOutcome, Transport};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// Fallback wait when a 429 carries no `retry_after`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Per-request bound unless overridden with [`TelegramTransport::with_timeout`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct SendPhoto<'a> {
    chat_id: &'a str,
    photo: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    caption: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    ok: bool,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TelegramTransport {
    client: Client,
    api_base: String,
    token: Option<String>,
    timeout: Duration,
}

impl TelegramTransport {
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn method_url(&self, method: &str) -> Option<String> {
        self.token
            .as_deref()
            .map(|token| format!("{}/bot{}/{}", self.api_base, token, method))
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn check_config(&self) -> Result<(), String> {
        match &self.token {
            Some(_) => Ok(()),
            None => Err("BULKSEND_BOT_TOKEN is not set".to_string()),
        }
    }

    async fn prepare(&self) -> Result<(), String> {
        let url = self.method_url("getMe").ok_or("bot token is not set")?;
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| format!("could not reach messaging endpoint: {e}"))?;
        let status = response.status();
        let body: Option<ApiResponse> = response.json().await.ok();
        match body {
            Some(body) if body.ok => Ok(()),
            Some(body) => Err(format!(
                "credentials rejected: {}",
                body.description.unwrap_or_else(|| status.to_string())
            )),
            None => Err(format!("credentials rejected: HTTP {status}")),
        }
    }

    async fn send(&self, destination: &str, media: &str, caption: &str) -> DeliveryOutcome {
        let Some(url) = self.method_url("sendPhoto") else {
            return DeliveryOutcome::Failed("bot token is not set".to_string());
        };
        let request = SendPhoto {
            chat_id: destination,
            photo: media,
            caption,
        };

        let sent = self
            .client
            .post(url)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await;
        let response = match sent {
            Ok(r) => r,
            Err(e) => return DeliveryOutcome::Failed(format!("request failed: {e}")),
        };
        let status = response.status();
        let body: Option<ApiResponse> = response.json().await.ok();
        classify(status, body)
    }
}

fn classify(status: StatusCode, body: Option<ApiResponse>) -> DeliveryOutcome {
    let retry_after = body
        .as_ref()
        .and_then(|b| b.parameters.as_ref())
        .and_then(|p| p.retry_after);

    if status == StatusCode::TOO_MANY_REQUESTS || retry_after.is_some() {
        return DeliveryOutcome::RateLimited {
            retry_after: retry_after
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_AFTER),
        };
    }

    match body {
        Some(body) if status.is_success() && body.ok => DeliveryOutcome::Sent,
        Some(ApiResponse {
            description: Some(description),
            ..
        }) => DeliveryOutcome::Failed(description),
        _ => DeliveryOutcome::Failed(format!("HTTP {status}")),
    }
}
