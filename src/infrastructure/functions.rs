use crate::domain::{Listing, SocialPostDraft};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FunctionsError {
    #[error("Function call failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Serverless function that drafts social-media posts for a listing.
#[async_trait]
pub trait SocialPostGenerator: Send + Sync {
    #[must_use]
    async fn generate(&self, listing: &Listing) -> Result<Vec<SocialPostDraft>, FunctionsError>;
}

/// Serverless function that sends transactional email.
#[async_trait]
pub trait EmailSender: Send + Sync {
    #[must_use]
    async fn send_listing_published(
        &self,
        to: &str,
        listing_title: &str,
        listing_url: &str,
    ) -> Result<(), FunctionsError>;
}

/// One HTTP client for both collaborator functions; they live behind the
/// same gateway and share the bearer token.
pub struct HttpFunctionsClient {
    client: Client,
    base_url: String,
}

impl HttpFunctionsClient {
    pub fn new(base_url: String, token: &str) -> Result<Self, FunctionsError> {
        let mut headers = header::HeaderMap::new();
        let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| FunctionsError::InvalidConfig(format!("Invalid token format: {}", e)))?;
        headers.insert(header::AUTHORIZATION, auth_value);
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                FunctionsError::InvalidConfig(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client, base_url })
    }
}

#[derive(Deserialize)]
struct GeneratePostsResponse {
    posts: Vec<SocialPostDraft>,
}

#[async_trait]
impl SocialPostGenerator for HttpFunctionsClient {
    async fn generate(&self, listing: &Listing) -> Result<Vec<SocialPostDraft>, FunctionsError> {
        let resp = self
            .client
            .post(format!("{}/generate-social-posts", self.base_url))
            .json(&serde_json::json!({ "listing": listing }))
            .send()
            .await
            .map_err(|e| FunctionsError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let error_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(FunctionsError::RequestFailed(error_text));
        }

        let body: GeneratePostsResponse = resp
            .json()
            .await
            .map_err(|e| FunctionsError::InvalidResponse(e.to_string()))?;

        Ok(body.posts)
    }
}

#[async_trait]
impl EmailSender for HttpFunctionsClient {
    async fn send_listing_published(
        &self,
        to: &str,
        listing_title: &str,
        listing_url: &str,
    ) -> Result<(), FunctionsError> {
        let body = serde_json::json!({
            "to": to,
            "template": "listing_published",
            "data": {
                "listingTitle": listing_title,
                "listingUrl": listing_url,
            },
        });

        let resp = self
            .client
            .post(format!("{}/send-email", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| FunctionsError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let error_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(FunctionsError::RequestFailed(error_text));
        }

        Ok(())
    }
}
