//! Blocking HTTP client for the MiniLabel item API.
//!
//! Calls are made from gateway worker threads, never from the UI thread.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::Config;
use crate::model::{Item, ItemId};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Transport failure (connect, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SeedResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub database: Option<String>,
}

/// Remote operations the gateway needs. Implemented over HTTP by
/// [`ApiClient`]; tests substitute an in-memory fake.
pub trait Backend: Send + Sync {
    fn list_items(&self) -> Result<Vec<Item>, ApiError>;
    fn get_item(&self, id: ItemId) -> Result<Item, ApiError>;
    fn update_annotation(&self, id: ItemId, annotation: &Value) -> Result<(), ApiError>;
    fn seed(&self) -> Result<SeedResponse, ApiError>;
    fn health(&self) -> Result<Health, ApiError>;
    /// Raw bytes behind an item's content URI (images).
    fn fetch_bytes(&self, uri: &str) -> Result<Vec<u8>, ApiError>;
}

pub struct ApiClient {
    client: reqwest::blocking::Client,
    api_url: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self::with_client(client, config.api_url.clone()))
    }

    pub fn with_client(client: reqwest::blocking::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// Absolute URIs pass through; anything else is relative to the API.
    fn resolve(&self, uri: &str) -> String {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            uri.to_string()
        } else {
            format!("{}/{}", self.api_url, uri.trim_start_matches('/'))
        }
    }

    fn ensure_success(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    fn parse_response<T: DeserializeOwned>(
        response: reqwest::blocking::Response,
    ) -> Result<T, ApiError> {
        let text = Self::ensure_success(response)?.text()?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl Backend for ApiClient {
    fn list_items(&self) -> Result<Vec<Item>, ApiError> {
        let response = self.client.get(self.url("/items")).send()?;
        Self::parse_response(response)
    }

    fn get_item(&self, id: ItemId) -> Result<Item, ApiError> {
        let response = self.client.get(self.url(&format!("/items/{id}"))).send()?;
        Self::parse_response(response)
    }

    fn update_annotation(&self, id: ItemId, annotation: &Value) -> Result<(), ApiError> {
        let body = serde_json::json!({ "annotation": annotation });
        let response = self
            .client
            .put(self.url(&format!("/items/{id}/annotation")))
            .json(&body)
            .send()?;
        Self::ensure_success(response)?;
        Ok(())
    }

    fn seed(&self) -> Result<SeedResponse, ApiError> {
        let response = self.client.post(self.url("/seed")).send()?;
        Self::parse_response(response)
    }

    fn health(&self) -> Result<Health, ApiError> {
        let response = self.client.get(self.url("/health")).send()?;
        Self::parse_response(response)
    }

    fn fetch_bytes(&self, uri: &str) -> Result<Vec<u8>, ApiError> {
        let response = self.client.get(self.resolve(uri)).send()?;
        let bytes = Self::ensure_success(response)?.bytes()?;
        Ok(bytes.to_vec())
    }
}
