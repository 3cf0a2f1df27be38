use crate::domain::{ModerationRequest, ModerationVerdict};
use async_trait::async_trait;
use reqwest::{header, Client};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Error, Debug)]
pub enum ModerationError {
    #[error("Moderation request failed: {0}")]
    RequestFailed(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// The external classifier. Opaque: this crate defines only the call
/// contract and the gating behavior around the verdict.
#[async_trait]
pub trait ContentModerator: Send + Sync {
    #[must_use]
    async fn review(&self, request: &ModerationRequest)
        -> Result<ModerationVerdict, ModerationError>;
}

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 500 | 502 | 503)
}

pub struct HttpModerationClient {
    client: Client,
    base_url: String,
}

impl HttpModerationClient {
    pub fn new(base_url: String, token: &str) -> Result<Self, ModerationError> {
        let mut headers = header::HeaderMap::new();
        let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| ModerationError::InvalidConfig(format!("Invalid token format: {}", e)))?;
        headers.insert(header::AUTHORIZATION, auth_value);
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                ModerationError::InvalidConfig(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl ContentModerator for HttpModerationClient {
    async fn review(
        &self,
        request: &ModerationRequest,
    ) -> Result<ModerationVerdict, ModerationError> {
        let mut last_error: Option<String> = None;

        for attempt in 0..MAX_RETRIES {
            let response = self
                .client
                .post(format!("{}/moderate-listing", self.base_url))
                .json(request)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();

                    if status == 429 {
                        return Err(ModerationError::RateLimited);
                    }

                    if is_retryable_status(status) && attempt < MAX_RETRIES - 1 {
                        let backoff = INITIAL_BACKOFF_MS * 2_u64.pow(attempt);
                        sleep(Duration::from_millis(backoff)).await;
                        continue;
                    }

                    if !resp.status().is_success() {
                        let error_text = resp
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        return Err(ModerationError::RequestFailed(error_text));
                    }

                    return resp
                        .json::<ModerationVerdict>()
                        .await
                        .map_err(|e| ModerationError::InvalidResponse(e.to_string()));
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                    if attempt < MAX_RETRIES - 1 {
                        let backoff = INITIAL_BACKOFF_MS * 2_u64.pow(attempt);
                        sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }
        }

        Err(ModerationError::RequestFailed(
            last_error.unwrap_or_else(|| "Max retries exceeded".to_string()),
        ))
    }
}
