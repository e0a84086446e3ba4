//! Resilient JSON client.
//!
//! Every attempt acquires a rate-limit token, asks the circuit breaker for
//! admission and performs the round-trip under a deadline. Failed attempts
//! go through the retry policy.

use super::transport::{HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::errors::{EtlError, Result};
use crate::observability::PipelineMetrics;
use crate::resilience::{CircuitBreaker, RateLimiter, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Header carrying the idempotency key on mutating requests.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

const ERROR_BODY_EXCERPT: usize = 200;

/// JSON client composing limiter, breaker, timeout and retry around a [`Transport`].
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    timeout: Duration,
    headers: Vec<(String, String)>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("breaker", &self.breaker.name())
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Creates a client.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            limiter,
            breaker,
            retry,
            timeout,
            headers: Vec::new(),
            metrics: None,
        }
    }

    /// Adds a header sent on every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attaches a metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The retry policy in use.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The shared circuit breaker.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// GETs `url` and parses the JSON body.
    ///
    /// `endpoint` only labels logs and metrics.
    ///
    /// # Errors
    ///
    /// Returns the last attempt's error once retries are exhausted, or the
    /// first non-transient error.
    pub async fn get_json(&self, endpoint: &str, url: &str) -> Result<serde_json::Value> {
        self.request_json(HttpMethod::Get, endpoint, url, None).await
    }

    /// Sends a request and parses the JSON body.
    ///
    /// Mutating methods carry an `Idempotency-Key` that stays the same for
    /// every retry of this call.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::get_json`].
    pub async fn request_json(
        &self,
        method: HttpMethod,
        endpoint: &str,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let mut request = HttpRequest::new(method, url);
        for (name, value) in &self.headers {
            request.headers.insert(name.clone(), value.clone());
        }
        if method.is_mutating() {
            request
                .headers
                .insert(IDEMPOTENCY_HEADER.to_string(), uuid::Uuid::new_v4().to_string());
        }
        request.body = body;

        let label = format!("{method} {endpoint}");
        self.retry
            .execute(&label, |attempt| {
                let request = &request;
                async move {
                    tracing::debug!(endpoint = %endpoint, attempt, url = %request.url, "HTTP request");
                    self.attempt(endpoint, request).await
                }
            })
            .await
    }

    async fn attempt(&self, endpoint: &str, request: &HttpRequest) -> Result<serde_json::Value> {
        let deadline = Instant::now() + self.timeout;
        self.limiter.acquire_until(deadline).await?;
        let permit = self.breaker.permit()?;

        let started = Instant::now();
        let outcome = match tokio::time::timeout_at(deadline, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(EtlError::Timeout(format!(
                "{} {} exceeded {:.1}s",
                request.method,
                request.url,
                self.timeout.as_secs_f64()
            ))),
        };
        let latency = started.elapsed();

        let status = outcome.as_ref().map_or(0, |r| r.status);
        if let Some(metrics) = &self.metrics {
            metrics.record_http(endpoint, request.method.as_str(), status, latency);
        }

        let result = outcome.and_then(|response| interpret(&request.url, response));
        match &result {
            Err(error) if error.is_transient() => permit.failure(),
            _ => permit.success(),
        }
        result
    }
}

fn interpret(url: &str, response: HttpResponse) -> Result<serde_json::Value> {
    if response.status == 429 {
        return Err(EtlError::RateLimited {
            url: url.to_string(),
            retry_after: response.retry_after(),
        });
    }
    if !response.is_success() {
        let message: String = response.body.chars().take(ERROR_BODY_EXCERPT).collect();
        return Err(EtlError::Response {
            status: response.status,
            url: url.to_string(),
            message,
        });
    }
    serde_json::from_str(&response.body)
        .map_err(|e| EtlError::parse(format!("invalid JSON from {url}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::MockTransport;
    use crate::resilience::CircuitState;
    use parking_lot::Mutex;
    use serde_json::json;

    fn network_error() -> EtlError {
        EtlError::Network {
            url: "http://x".into(),
            message: "connection reset".into(),
        }
    }

    fn client(transport: MockTransport, retry: RetryPolicy) -> HttpClient {
        HttpClient::new(
            Arc::new(transport),
            Arc::new(RateLimiter::new(100.0, 100.0).unwrap()),
            Arc::new(CircuitBreaker::new("test", 5, Duration::from_secs(30))),
            retry,
            Duration::from_secs(5),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures_then_succeeds() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();
        let mut transport = MockTransport::new();
        transport.expect_send().times(3).returning(move |_| {
            let mut n = counter.lock();
            *n += 1;
            if *n < 3 {
                Err(network_error())
            } else {
                Ok(HttpResponse::json(200, &json!({"ok": true})))
            }
        });

        let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(10), 2.0);
        let client = client(transport, policy);
        let start = Instant::now();
        let body = client.get_json("status", "http://x/status.json").await.unwrap();

        assert_eq!(body, json!({"ok": true}));
        assert_eq!(*calls.lock(), 3);
        // base * (1 + factor)
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Ok(HttpResponse::json(404, &json!({"error": "missing"}))));

        let client = client(transport, RetryPolicy::default());
        let err = client.get_json("assay", "http://x/assay.json").await.unwrap_err();

        assert!(matches!(err, EtlError::Response { status: 404, .. }));
        assert_eq!(client.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_raises_backoff() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();
        let mut transport = MockTransport::new();
        transport.expect_send().times(2).returning(move |_| {
            let mut n = counter.lock();
            *n += 1;
            if *n == 1 {
                Ok(HttpResponse::json(429, &json!({})).with_header("Retry-After", "7"))
            } else {
                Ok(HttpResponse::json(200, &json!({})))
            }
        });

        let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1), 2.0);
        let client = client(transport, policy);
        let start = Instant::now();
        client.get_json("activity", "http://x/activity.json").await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idempotency_key_stable_across_retries() {
        let keys = Arc::new(Mutex::new(Vec::new()));
        let seen = keys.clone();
        let mut transport = MockTransport::new();
        transport.expect_send().times(2).returning(move |request: &HttpRequest| {
            let mut seen = seen.lock();
            seen.push(request.headers.get(IDEMPOTENCY_HEADER).cloned());
            if seen.len() == 1 {
                Ok(HttpResponse::json(503, &json!({})))
            } else {
                Ok(HttpResponse::json(201, &json!({"id": 1})))
            }
        });

        let client = client(transport, RetryPolicy::new(2, Duration::ZERO, Duration::ZERO, 2.0));
        client
            .request_json(HttpMethod::Post, "jobs", "http://x/jobs", Some(json!({"a": 1})))
            .await
            .unwrap();

        let keys = keys.lock();
        assert!(keys[0].is_some());
        assert_eq!(keys[0], keys[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_has_no_idempotency_key() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|request: &HttpRequest| !request.headers.contains_key(IDEMPOTENCY_HEADER))
            .times(1)
            .returning(|_| Ok(HttpResponse::json(200, &json!({}))));

        client(transport, RetryPolicy::no_retry())
            .get_json("status", "http://x/status.json")
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_refuses_without_calling_transport() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(2)
            .returning(|_| Ok(HttpResponse::json(500, &json!({}))));

        let client = HttpClient::new(
            Arc::new(transport),
            Arc::new(RateLimiter::new(100.0, 100.0).unwrap()),
            Arc::new(CircuitBreaker::new("test", 2, Duration::from_secs(30))),
            RetryPolicy::new(5, Duration::ZERO, Duration::ZERO, 2.0),
            Duration::from_secs(5),
        );

        let err = client.get_json("target", "http://x/target.json").await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::CircuitOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_json_is_parse_error() {
        let mut transport = MockTransport::new();
        transport.expect_send().times(1).returning(|_| {
            Ok(HttpResponse {
                status: 200,
                headers: std::collections::BTreeMap::new(),
                body: "<html>".into(),
            })
        });

        let err = client(transport, RetryPolicy::default())
            .get_json("status", "http://x/status.json")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::ParseError);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_record_every_attempt() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Ok(HttpResponse::json(200, &json!({}))));
        let metrics = Arc::new(PipelineMetrics::new("assay_chembl", "chembl", "assay"));

        client(transport, RetryPolicy::default())
            .with_metrics(metrics.clone())
            .get_json("assay", "http://x/assay.json")
            .await
            .unwrap();

        let labels = [("endpoint", "assay"), ("method", "GET"), ("status_class", "2xx")];
        assert_eq!(
            metrics.counter(crate::observability::metrics::HTTP_REQUESTS_TOTAL, &labels),
            1
        );
    }
}
