//! The HTTP transport contract the synchronization core dispatches through.
//!
//! The core never owns sockets; it builds [`HttpRequest`] values and hands
//! them to whatever [`HttpTransport`] implementation was composed in.

mod error;

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::Value;

pub use error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    /// Non-standard verb used for query/count round-trips
    Search,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Search => "SEARCH",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fully-described request, ready for a transport to send.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// "Send request, get JSON back" primitive. Implementations own retries-never
/// semantics: a failure here surfaces as a collection `Error` status upstream.
#[async_trait(?Send)]
pub trait HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<Value, TransportError>;
}

/// Builds the REST URL shapes for collection routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlBuilder {
    endpoint: String,
    api_path: Option<String>,
}

impl UrlBuilder {
    pub fn new(endpoint: &str, api_path: Option<&str>) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_path: api_path.map(|p| p.trim_matches('/').to_string()),
        }
    }

    fn base(&self) -> String {
        match &self.api_path {
            Some(api_path) => format!("{}/{}/api/v1", self.endpoint, api_path),
            None => format!("{}/api/v1", self.endpoint),
        }
    }

    /// Root (whole-collection) operations: `{endpoint}[/{api_path}]/api/v1/{route}`
    pub fn vector(&self, route: &str) -> String {
        format!("{}/{}", self.base(), route)
    }

    /// Single-entity operations: `{...}/{route}/{entity_id}`
    pub fn scalar(&self, route: &str, entity_id: &str) -> String {
        format!("{}/{}/{}", self.base(), route, entity_id)
    }

    /// The application schema document. Served from the endpoint root,
    /// outside any app path.
    pub fn app_schema(&self) -> String {
        format!("{}/api/v1/app/schema", self.endpoint)
    }
}

/// Per-request authentication and URL context shared by every queue.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub urls: UrlBuilder,
    pub token: String,
}

impl RequestContext {
    pub fn new(urls: UrlBuilder, token: &str) -> Self {
        Self {
            urls,
            token: token.to_string(),
        }
    }

    /// Query parameters attached to every request: a nonce plus the token.
    pub fn params(&self) -> Vec<(String, String)> {
        vec![
            ("urq".to_string(), request_nonce().to_string()),
            ("token".to_string(), self.token.clone()),
        ]
    }
}

/// Millisecond timestamp used as a cache-busting nonce.
pub fn request_nonce() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
