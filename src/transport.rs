use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::error::{IntegrationError, Result};

/// A JSON POST to a provider endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub bearer_token: Option<String>,
    pub body: Value,
}

impl HttpRequest {
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            bearer_token: None,
            body,
        }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_bearer(mut self, token: &str) -> Self {
        self.bearer_token = Some(token.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

/// Sends a request and reports whatever came back. Status codes are not interpreted here.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: &HttpRequest) -> Result<HttpResponse>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            IntegrationError::Config(format!("Failed to build HTTP client: {e}"))
        })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, req: &HttpRequest) -> Result<HttpResponse> {
        // Query strings carry API keys, so only the bare URL is logged.
        tracing::trace!(url = %req.url, body = %req.body, "Request Options");

        let mut builder = self
            .client
            .post(&req.url)
            .header("Content-Type", "application/json")
            .query(&req.query)
            .json(&req.body);
        if let Some(token) = &req.bearer_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| IntegrationError::Network {
            message: format!("POST {} failed: {e}", req.url),
            source: Some(e),
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| IntegrationError::Network {
            message: format!("Failed to read response body from {}: {e}", req.url),
            source: Some(e),
        })?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        tracing::trace!(status, body = %body, "HTTP Response");
        Ok(HttpResponse { status, body })
    }
}
