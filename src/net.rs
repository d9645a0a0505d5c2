//! Network interception.
//!
//! [`Transport`] is the seam: it stands for "the real request-issuing
//! primitive". [`InterceptedTransport`] decorates any transport so that every
//! call is observed — method, URL, bounded bodies, settlement status, trace
//! header — without altering the caller-visible result or error. Bookkeeping
//! runs inside its own failure-tolerant boundary; a fault in the observer can
//! never leak into the wrapped call path.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use crate::records::{
    format_timestamp, truncate_chars, FailureKind, NetworkRecord, MAX_BODY_CHARS,
};

// ─── Trace headers ────────────────────────────────────────────────────────────

/// Known correlation-id response headers, in precedence order. First match wins.
pub const TRACE_HEADERS: &[&str] = &[
    "x-trace-id",
    "x-request-id",
    "x-correlation-id",
    "traceparent",
    "x-amzn-trace-id",
    "x-b3-traceid",
    "request-id",
    "x-cloud-trace-context",
];

/// Scan response headers for a correlation id.
///
/// Returns `(header_name, value)` for the first [`TRACE_HEADERS`] entry
/// present (case-insensitive). Absence is a valid state, not an error.
pub fn extract_correlation_id(headers: &BTreeMap<String, String>) -> Option<(String, String)> {
    for name in TRACE_HEADERS {
        if let Some((_, value)) = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            return Some((name.to_string(), value.clone()));
        }
    }
    None
}

// ─── Call contract ────────────────────────────────────────────────────────────

/// One outbound request as the page issued it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }
}

/// A settled response.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// How a call failed below the HTTP layer. Maps to status 0 on the record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request aborted")]
    Aborted,
    #[error("request timed out")]
    TimedOut,
}

/// The request-issuing primitive being wrapped.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Receives every settled call's record. Implemented by the capture engine.
pub trait NetworkObserver: Send + Sync {
    fn network_settled(&self, record: NetworkRecord);
}

// ─── Record construction ──────────────────────────────────────────────────────

/// Build the [`NetworkRecord`] for one settled call.
///
/// Bodies are truncated to [`MAX_BODY_CHARS`]. For error responses the body is
/// additionally parsed as JSON on a best-effort basis into `error_details`.
pub fn build_network_record(
    request: &HttpRequest,
    outcome: Result<&HttpResponse, &TransportError>,
    duration: Duration,
) -> NetworkRecord {
    let (status, status_text, response_headers, response_body, failure_kind) = match outcome {
        Ok(resp) => (
            resp.status,
            resp.status_text.clone(),
            resp.headers.clone(),
            resp.body.as_deref().map(|b| truncate_chars(b, MAX_BODY_CHARS)),
            None,
        ),
        Err(err) => (
            0,
            err.to_string(),
            BTreeMap::new(),
            None,
            Some(match err {
                TransportError::Network(_) => FailureKind::NetworkError,
                TransportError::Aborted => FailureKind::Aborted,
                TransportError::TimedOut => FailureKind::TimedOut,
            }),
        ),
    };

    let is_error = status == 0 || status >= 400;
    let error_details = if is_error {
        response_body
            .as_deref()
            .and_then(|b| serde_json::from_str::<serde_json::Value>(b).ok())
            .filter(serde_json::Value::is_object)
    } else {
        None
    };
    let correlation = extract_correlation_id(&response_headers);

    NetworkRecord {
        method: request.method.clone(),
        url: request.url.clone(),
        status,
        status_text,
        duration_ms: duration.as_millis() as u64,
        request_headers: request.headers.clone(),
        request_body: request
            .body
            .as_deref()
            .map(|b| truncate_chars(b, MAX_BODY_CHARS)),
        response_headers,
        response_body,
        error_details,
        correlation_id: correlation.as_ref().map(|(_, v)| v.clone()),
        correlation_header: correlation.map(|(h, _)| h),
        failure_kind,
        is_error,
        timestamp: format_timestamp(Utc::now()),
    }
}

// ─── Interceptor ──────────────────────────────────────────────────────────────

/// A second install attempt. Hands the transport back untouched.
pub struct AlreadyIntercepted<T>(pub T);

impl<T> fmt::Debug for AlreadyIntercepted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AlreadyIntercepted")
    }
}

/// Decorator that observes every call through the wrapped transport.
///
/// The wrapped call's result — response or error — is returned to the caller
/// unchanged. Observation happens after settlement, inside a panic boundary,
/// and never delays or alters the result.
pub struct InterceptedTransport<T: Transport> {
    inner: T,
    observer: Arc<dyn NetworkObserver>,
    installed: Arc<AtomicBool>,
}

impl<T: Transport> InterceptedTransport<T> {
    pub(crate) fn new(
        inner: T,
        observer: Arc<dyn NetworkObserver>,
        installed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            inner,
            observer,
            installed,
        }
    }

    /// Uninstall: clears the engine's install guard and returns the original
    /// transport so the host can put it back.
    pub fn release(self) -> T {
        self.installed.store(false, Ordering::SeqCst);
        self.inner
    }
}

#[async_trait]
impl<T: Transport> Transport for InterceptedTransport<T> {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let started = Instant::now();
        let result = self.inner.send(request).await;

        let elapsed = started.elapsed();
        let bookkeeping = catch_unwind(AssertUnwindSafe(|| {
            let record = build_network_record(request, result.as_ref(), elapsed);
            self.observer.network_settled(record);
        }));
        if bookkeeping.is_err() {
            warn!(url = %request.url, "network observation panicked; call result unaffected");
        }

        result
    }
}

// ─── Reqwest-backed transport ─────────────────────────────────────────────────

/// [`Transport`] over a `reqwest` client, for hosts that issue real traffic.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::TimedOut
    } else {
        TransportError::Network(err.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;
        let status = response.status();
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), v.to_string());
            }
        }
        let body = response.text().await.map_err(classify_reqwest_error)?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body: (!body.is_empty()).then_some(body),
        })
    }
}
