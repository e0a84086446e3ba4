//! HTTP transport seam.
//!
//! [`Transport`] performs exactly one round-trip. Rate limiting, the circuit
//! breaker, timeouts and retries are layered on top by
//! [`HttpClient`](super::HttpClient).

use crate::errors::{EtlError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Returns the method name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Returns true for methods that need an `Idempotency-Key`.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully built request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL including the query string.
    pub url: String,
    /// Request headers.
    pub headers: BTreeMap<String, String>,
    /// Optional JSON body.
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Creates a request with no headers or body.
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A raw response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers with lower-cased names.
    pub headers: BTreeMap<String, String>,
    /// Body text.
    pub body: String,
}

impl HttpResponse {
    /// Creates a response with a JSON body.
    #[must_use]
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.to_string(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Returns true for 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parses `Retry-After` given in whole or fractional seconds.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get("retry-after")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
    }
}

/// Performs one HTTP round-trip.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request and returns the raw response.
    ///
    /// Implementations return `Ok` for every response the server produced,
    /// whatever its status, and `Err` only for transport failures.
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Default user agent.
    pub const USER_AGENT: &'static str = concat!("bioetl/", env!("CARGO_PKG_VERSION"));

    /// Creates a transport with the default user agent.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the client cannot be built.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(Self::USER_AGENT)
            .build()
            .map_err(|e| EtlError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn map_reqwest_error(url: &str, error: &reqwest::Error) -> EtlError {
    if error.is_timeout() {
        EtlError::Timeout(format!("request to {url} timed out"))
    } else {
        EtlError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, &request.url)
            .header(reqwest::header::ACCEPT, "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(&request.url, &e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(&request.url, &e))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_retry_after_parsing() {
        let response = HttpResponse::json(429, &json!({})).with_header("Retry-After", "2");
        assert_eq!(response.retry_after(), Some(Duration::from_secs(2)));

        let response = HttpResponse::json(429, &json!({})).with_header("Retry-After", "soon");
        assert_eq!(response.retry_after(), None);
    }

    #[test]
    fn test_mutating_methods() {
        assert!(!HttpMethod::Get.is_mutating());
        assert!(HttpMethod::Post.is_mutating());
        assert!(HttpMethod::Delete.is_mutating());
    }

    #[tokio::test]
    async fn test_reqwest_transport_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chembl/api/data/assay.json"))
            .and(query_param("limit", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"assays": [], "page_meta": {"next": null}}))
                    .insert_header("X-Test", "yes"),
            )
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let url = format!("{}/chembl/api/data/assay.json?limit=2", server.uri());
        let response = transport.send(&HttpRequest::get(url)).await.unwrap();

        assert!(response.is_success());
        assert_eq!(response.headers.get("x-test").map(String::as_str), Some("yes"));
        let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["assays"], json!([]));
    }

    #[tokio::test]
    async fn test_reqwest_transport_passes_headers_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(header("idempotency-key", "abc"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let request = HttpRequest::new(HttpMethod::Post, format!("{}/submit", server.uri()))
            .with_header("Idempotency-Key", "abc")
            .with_body(json!({"x": 1}));
        let response = transport.send(&request).await.unwrap();

        assert_eq!(response.status, 503);
    }

    #[tokio::test]
    async fn test_reqwest_transport_connection_refused_is_network_error() {
        let transport = ReqwestTransport::new().unwrap();
        let err = transport
            .send(&HttpRequest::get("http://127.0.0.1:9/unreachable"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
