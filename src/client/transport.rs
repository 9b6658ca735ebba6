//! Transport seam
//!
//! [`Transport`] moves one request to the backend and hands back the raw
//! status and body. It fails only when no HTTP response was obtained; status
//! codes are interpreted one level up in [`BackendClient`](super::BackendClient).

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{Result, SqlizerError};

/// HTTP verb used against the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// Status and body of a backend response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// One request/response exchange with the backend
///
/// Implementations return `TransportFailure` only when the backend could not
/// be reached; any HTTP response, whatever its status, is `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<RawResponse>;
}

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SqlizerError::config_error(format!("Could not build HTTP client: {e}")))?;
        Ok(Self { client, base_url: config.api_base_url.trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<RawResponse> {
        let url = self.url(path);
        let request = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        let request = match body {
            Some(body) => request.json(body),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| SqlizerError::transport_failure(format!("{} {path}: {e}", method.as_str())))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| SqlizerError::transport_failure(format!("{} {path}: {e}", method.as_str())))?;

        Ok(RawResponse { status, body })
    }
}
