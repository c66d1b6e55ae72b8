//! Outbound HTTP for forward expectations.
//!
//! The dispatcher only needs something that executes a request and returns a
//! response or an error; [`HttpTransport`] is that seam. [`ReqwestTransport`]
//! is the implementation the server uses.

use crate::config::Headers;
use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, HOST};
use reqwest::redirect::Policy;
use reqwest::Method;
use tracing::debug;

/// Request headers that are never copied to an outbound request.
const SKIPPED_REQUEST_HEADERS: &[&str] = &[
    "connection",
    "content-length",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// A request about to be sent upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    /// Host identity to present, when it differs from the URL's host
    pub host: Option<String>,
    pub headers: Headers,
    /// Sent unchanged
    pub body: Bytes,
}

/// What came back from upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    /// Comma-joined values per header name
    pub headers: Headers,
    pub body: Bytes,
}

/// Executes forwarded requests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError>;
}

/// Transport backed by a shared reqwest client.
///
/// Redirects are returned to the caller rather than followed, and bodies are
/// passed through without decompression.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let headers = outbound_header_map(&request)?;

        debug!(
            method = %method,
            url = %request.url,
            host = ?request.host,
            headers = ?headers,
            body_len = request.body.len(),
            "Forwarding request"
        );

        let mut builder = self.client.request(method, &request.url).headers(headers);
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = join_header_values(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        debug!(status, headers = ?headers, body_len = body.len(), "Upstream response");

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

fn outbound_header_map(request: &OutboundRequest) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();

    for (name, value) in &request.headers {
        if name.eq_ignore_ascii_case(HOST.as_str())
            || SKIPPED_REQUEST_HEADERS
                .iter()
                .any(|skipped| name.eq_ignore_ascii_case(skipped))
        {
            continue;
        }
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
        map.insert(header_name, header_value);
    }

    // An explicit Host header wins over the one derived from the URL
    if let Some(host) = &request.host {
        let value = HeaderValue::from_str(host)
            .map_err(|e| TransportError::InvalidRequest(format!("host {host}: {e}")))?;
        map.insert(HOST, value);
    }

    Ok(map)
}

/// Collapse a header map to one comma-joined value per name.
pub fn join_header_values(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for name in map.keys() {
        let joined = map
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(",");
        headers.insert(name.as_str().to_string(), joined);
    }
    headers
}
