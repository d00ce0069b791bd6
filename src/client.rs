//! HTTP access to the Datadog API.
//!
//! [`HttpTransport`] performs exactly one request. [`DatadogClient`] wraps a
//! transport with the retry rules every resource shares:
//!
//! - `429` is retried for every method, honoring `Retry-After` (or
//!   `X-RateLimit-Reset`) when the server sends one.
//! - `502` and `504` are retried for `GET` only.
//! - Transport failures are retried for idempotent methods only.
//! - Backoff is exponential and capped. No attempt starts, and no sleep
//!   extends, past the operation deadline.
//!
//! Any other non-success status is translated by
//! [`ProviderError::from_response`] and returned without retrying.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Method, Url};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::error::{ErrorKind, ProviderError};

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// A JSON document built by the typed codec.
    Json(Value),
    /// A user-supplied document forwarded verbatim.
    Text {
        /// `Content-Type` header value.
        content_type: &'static str,
        /// Document text.
        text: String,
    },
}

impl RequestBody {
    /// A raw JSON document.
    pub fn raw_json(text: impl Into<String>) -> Self {
        Self::Text {
            content_type: "application/json",
            text: text.into(),
        }
    }

    /// A raw YAML document.
    pub fn raw_yaml(text: impl Into<String>) -> Self {
        Self::Text {
            content_type: "application/x-yaml",
            text: text.into(),
        }
    }
}

/// A single API request, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    segments: Vec<String>,
    query: Vec<(String, String)>,
    body: Option<RequestBody>,
}

impl ApiRequest {
    /// Create a request for a slash-separated path such as `api/v1/monitor`.
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            segments: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            query: Vec::new(),
            body: None,
        }
    }

    /// `GET` request.
    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST` request.
    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    /// `PUT` request.
    pub fn put(path: &str) -> Self {
        Self::new(Method::PUT, path)
    }

    /// `PATCH` request.
    pub fn patch(path: &str) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// `DELETE` request.
    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append one path segment. The segment is percent-encoded, so IDs
    /// containing `/` or `#` stay a single segment.
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach a body.
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach a JSON body.
    pub fn json(self, value: Value) -> Self {
        self.body(RequestBody::Json(value))
    }

    /// The HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The unencoded path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The query parameters.
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// The payload, if any.
    pub fn payload(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    /// The path for logging, e.g. `/api/v1/monitor/123`.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    fn is_idempotent(&self) -> bool {
        matches!(
            self.method,
            Method::GET | Method::HEAD | Method::PUT | Method::DELETE
        )
    }
}

/// A response as seen by the retry loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body bytes.
    pub body: Vec<u8>,
    /// Server-requested delay before the next attempt.
    pub retry_after: Option<Duration>,
}

impl ApiResponse {
    /// Create a response from raw parts.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    /// Create a response with a JSON body.
    pub fn from_json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    /// Set the server-requested retry delay.
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON. An empty body parses as `null`.
    pub fn body_json(&self) -> Result<Value, ProviderError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Performs one HTTP request.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Execute `request`, giving up after `timeout`.
    async fn execute(
        &self,
        request: &ApiRequest,
        timeout: Duration,
    ) -> Result<ApiResponse, ProviderError>;
}

/// [`HttpTransport`] backed by `reqwest`, authenticating with Datadog API and
/// application keys.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: Url,
}

impl ReqwestTransport {
    /// Build a transport for `base_url` (e.g. `https://api.datadoghq.com/`).
    pub fn new(base_url: &str, api_key: &str, app_key: &str) -> Result<Self, ProviderError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ProviderError::Configuration(format!("invalid api_url {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::Configuration(format!(
                "invalid api_url {base_url}: expected an http(s) URL"
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert("DD-API-KEY", sensitive_header("api_key", api_key)?);
        headers.insert("DD-APPLICATION-KEY", sensitive_header("app_key", app_key)?);
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json"),
        );

        let http = reqwest::Client::builder()
            .user_agent(concat!(
                "hemmer-provider-datadog/",
                env!("CARGO_PKG_VERSION")
            ))
            .default_headers(headers)
            .build()?;

        Ok(Self { http, base_url })
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                ProviderError::Configuration(format!("api_url {} cannot be a base", self.base_url))
            })?;
            segments.pop_if_empty();
            segments.extend(request.segments());
        }
        if !request.query_pairs().is_empty() {
            url.query_pairs_mut().extend_pairs(request.query_pairs());
        }
        Ok(url)
    }
}

fn sensitive_header(name: &str, value: &str) -> Result<HeaderValue, ProviderError> {
    let mut header = HeaderValue::from_str(value).map_err(|_| {
        ProviderError::Configuration(format!("{name} contains characters not allowed in a header"))
    })?;
    header.set_sensitive(true);
    Ok(header)
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        timeout: Duration,
    ) -> Result<ApiResponse, ProviderError> {
        let url = self.url_for(request)?;
        let mut builder = self
            .http
            .request(request.method().clone(), url)
            .timeout(timeout);
        builder = match request.payload() {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Text { content_type, text }) => builder
                .header(CONTENT_TYPE, *content_type)
                .body(text.clone()),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let retry_after = retry_after(response.headers());
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse {
            status,
            body,
            retry_after,
        })
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    [RETRY_AFTER.as_str(), "x-ratelimit-reset"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Retry behavior shared by every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Whether any retrying happens at all.
    pub enabled: bool,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound on a single delay.
    pub max_backoff: Duration,
    /// Upper bound on the time spent retrying one request, independent of
    /// the operation deadline.
    pub max_window: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_window: None,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay before attempt number `attempt + 1` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Retrying Datadog API client.
#[derive(Clone)]
pub struct DatadogClient {
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl fmt::Debug for DatadogClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatadogClient")
            .field("retry", &self.retry)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl DatadogClient {
    /// Wrap a transport with the default retry policy and a 60 s
    /// per-request timeout.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The retry policy in effect.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Send `request`, retrying per the policy until it succeeds, fails
    /// permanently, or `deadline` would be crossed.
    ///
    /// `context` prefixes error messages, e.g. `"error creating monitor"`.
    #[instrument(
        skip(self, request, deadline),
        name = "datadog_request",
        fields(method = %request.method(), path = %request.path())
    )]
    pub async fn send(
        &self,
        request: &ApiRequest,
        deadline: Instant,
        context: &str,
    ) -> Result<ApiResponse, ProviderError> {
        let started = Instant::now();
        let deadline = match self.retry.max_window {
            Some(window) => deadline.min(started + window),
            None => deadline,
        };

        let mut attempt: u32 = 0;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(self.deadline_error(request, context, attempt, None));
            }
            let timeout = (deadline - now).min(self.request_timeout);

            let outcome =
                match tokio::time::timeout(timeout, self.transport.execute(request, timeout)).await {
                    Ok(outcome) => outcome,
                    Err(_elapsed) => Err(ProviderError::Transport(format!(
                        "request timed out after {}ms",
                        timeout.as_millis()
                    ))),
                };
            attempt += 1;

            let (err, requested_delay) = match outcome {
                Ok(response) if response.is_success() => {
                    debug!(status = response.status, attempt, "request succeeded");
                    return Ok(response);
                },
                Ok(response) => {
                    let err = ProviderError::from_response(response.status, &response.body, context);
                    if !self.should_retry_status(request, response.status) {
                        return Err(err);
                    }
                    (err, response.retry_after)
                },
                Err(err) => {
                    if !(self.retry.enabled
                        && err.kind() == ErrorKind::Transport
                        && request.is_idempotent())
                    {
                        return Err(err);
                    }
                    (err, None)
                },
            };

            let delay = requested_delay.unwrap_or_else(|| self.retry.backoff(attempt - 1));
            if Instant::now() + delay >= deadline {
                return Err(self.deadline_error(request, context, attempt, Some(&err)));
            }

            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying request"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn should_retry_status(&self, request: &ApiRequest, status: u16) -> bool {
        if !self.retry.enabled {
            return false;
        }
        match status {
            429 => true,
            502 | 504 => request.method() == Method::GET,
            _ => false,
        }
    }

    fn deadline_error(
        &self,
        request: &ApiRequest,
        context: &str,
        attempts: u32,
        last: Option<&ProviderError>,
    ) -> ProviderError {
        let mut message = format!(
            "{context}: {} {} did not complete before the deadline after {attempts} attempt(s)",
            request.method(),
            request.path()
        );
        if let Some(last) = last {
            message.push_str(&format!(" (last error: {last})"));
        }
        message.push_str("; retry the operation");
        ProviderError::DeadlineExceeded(message)
    }
}
