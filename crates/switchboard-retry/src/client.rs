//! HTTP transport to the WhatsApp messaging gateway.
//!
//! Posts each message as JSON to `{base_url}/message/send/{instance_id}` and
//! maps failures onto [`SendError`] so the retry policy can classify them.

use std::time::Duration;

use reqwest::{header::HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use switchboard_core::OutboundMessage;
use tracing::{info_span, Instrument};

use crate::{
    error::{Result, SendError},
    transport::MessageTransport,
};

/// Header carrying the gateway API key.
pub const API_KEY_HEADER: &str = "apikey";

/// Delay assumed when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER: u64 = 60;

/// Longest response body kept in error values.
const MAX_ERROR_BODY: usize = 1024;

/// Configuration for the gateway client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Gateway base URL, without trailing slash.
    pub base_url: String,
    /// API key sent with every request, if the gateway requires one.
    pub api_key: Option<String>,
    /// Timeout for one send.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            user_agent: "Switchboard/0.1".to_string(),
        }
    }
}

/// [`MessageTransport`] backed by the gateway's HTTP API.
#[derive(Debug, Clone)]
pub struct GatewayTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl GatewayTransport {
    /// Creates a transport with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `SendError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| SendError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Endpoint a message from `instance_id` is posted to.
    pub fn send_url(&self, instance_id: &str) -> String {
        format!("{}/message/send/{instance_id}", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl MessageTransport for GatewayTransport {
    async fn send_message(&self, message: &OutboundMessage) -> Result<()> {
        let url = self.send_url(message.instance_id.as_str());
        let span = info_span!(
            "gateway_send",
            message_id = %message.id,
            instance_id = %message.instance_id,
            url = %url,
        );

        async move {
            let start_time = std::time::Instant::now();
            let mut request = self.client.post(&url).json(message);
            if let Some(api_key) = &self.config.api_key {
                request = request.header(API_KEY_HEADER, api_key);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(duration_ms = start_time.elapsed().as_millis(), "send failed: {e}");

                    if e.is_timeout() {
                        return Err(SendError::timeout(self.config.timeout.as_secs()));
                    }
                    if e.is_connect() {
                        return Err(SendError::network(format!("connection failed: {e}")));
                    }
                    return Err(SendError::network(e.to_string()));
                },
            };

            let status = response.status();
            tracing::debug!(
                status = status.as_u16(),
                duration_ms = start_time.elapsed().as_millis(),
                "gateway responded"
            );

            if status.is_success() {
                return Ok(());
            }

            let retry_after = extract_retry_after_seconds(response.headers());
            let body = read_error_body(response).await;
            Err(classify_status(status, retry_after, body, message.instance_id.as_str()))
        }
        .instrument(span)
        .await
    }
}

/// Maps a non-success status onto a [`SendError`].
fn classify_status(
    status: StatusCode,
    retry_after: Option<u64>,
    body: String,
    instance_id: &str,
) -> SendError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            SendError::rate_limited(retry_after.unwrap_or(DEFAULT_RETRY_AFTER))
        },
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
            SendError::instance_disconnected(instance_id)
        },
        s if s.is_client_error() => SendError::rejected(s.as_u16(), body),
        s => SendError::gateway_error(s.as_u16(), body),
    }
}

async fn read_error_body(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(mut text) => {
            if text.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
                text.push_str("... (truncated)");
            }
            text
        },
        Err(e) => format!("[failed to read response body: {e}]"),
    }
}

/// Seconds requested by a `Retry-After` header.
///
/// Accepts delta-seconds and HTTP dates; an unparseable value falls back to
/// 60 seconds.
pub fn extract_retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?;
    let Ok(value) = value.to_str() else {
        return Some(DEFAULT_RETRY_AFTER);
    };

    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(seconds);
    }

    if let Ok(date_time) = chrono::DateTime::parse_from_rfc2822(value) {
        let remaining = date_time.with_timezone(&chrono::Utc) - chrono::Utc::now();
        return Some(remaining.to_std().map(|d| d.as_secs()).unwrap_or(0));
    }

    Some(DEFAULT_RETRY_AFTER)
}
