//! Wire-level data model for everything the capture engine records.
//!
//! Three record families cross the module boundary: [`ErrorRecord`] for
//! console/page/promise failures, [`NetworkRecord`] for observed
//! request/response cycles, and [`CrashEvent`] for correlated crash bundles.
//! All of them serialize as camelCase JSON and are copied by value when they
//! leave the engine — a snapshot handed to a consumer is never mutated by
//! later capture activity.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hard cap on captured request/response body text, in characters.
pub const MAX_BODY_CHARS: usize = 10_000;

/// Hard cap on captured error message text, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2_000;

/// Hard cap on captured stack text, in characters.
pub const MAX_STACK_CHARS: usize = 8_000;

// ─── ErrorRecord ──────────────────────────────────────────────────────────────

/// Which interception hook produced an [`ErrorRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConsoleError,
    ConsoleWarn,
    Assertion,
    UncaughtError,
    UnhandledRejection,
}

/// Best-effort script location attached to page errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// Normalized representation of one captured failure.
///
/// Created at interception time by the normalizer, then appended to a bounded
/// ring buffer. Noise (per the filter module) is never turned into a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    /// Semantic classification — `"TypeError"`, `"Warning"`, `"AssertionError"`, ...
    pub error_type: String,
    /// Truncated to [`MAX_MESSAGE_CHARS`].
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// UI framework error-boundary info, when the thrown value carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation>,
    /// RFC 3339 capture time.
    pub timestamp: String,
    pub page_url: String,
}

// ─── NetworkRecord ────────────────────────────────────────────────────────────

/// Why a call settled with status 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NetworkError,
    Aborted,
    TimedOut,
}

/// One observed request/response cycle.
///
/// Created when the call settles — on completion, network error, or timeout.
/// Status 0 means the failure happened below HTTP; `failure_kind` says how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRecord {
    pub method: String,
    pub url: String,
    /// HTTP status, or 0 for a network-level failure.
    pub status: u16,
    pub status_text: String,
    pub duration_ms: u64,
    pub request_headers: BTreeMap<String, String>,
    /// Truncated to [`MAX_BODY_CHARS`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    pub response_headers: BTreeMap<String, String>,
    /// Truncated to [`MAX_BODY_CHARS`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    /// Best-effort JSON parse of an error response body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<serde_json::Value>,
    /// Value of the first matching trace header, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Which trace header supplied `correlation_id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_header: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    /// True iff `status == 0 || status >= 400`.
    pub is_error: bool,
    pub timestamp: String,
}

// ─── CrashEvent ───────────────────────────────────────────────────────────────

/// Which detector concluded the page crashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    ErrorBased,
    DomBased,
}

/// A fatal-error UI marker found in the document by the DOM watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomMarker {
    /// Name of the heuristic that matched, e.g. `"class:fatal-error"`.
    pub matcher: String,
    /// Short description of the matched element.
    pub element: String,
    /// Visible text of the matched element, truncated.
    pub text: String,
}

/// The signal that triggered crash detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum CrashTrigger {
    Error { record: ErrorRecord },
    DomMarker { marker: DomMarker },
}

/// The terminal enriched bundle, emitted at most once per cooldown window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashEvent {
    pub detection_method: DetectionMethod,
    /// Human-readable trigger description.
    pub reason: String,
    pub primary: CrashTrigger,
    pub recent_critical_errors: Vec<ErrorRecord>,
    pub recent_console_errors: Vec<ErrorRecord>,
    pub recent_page_errors: Vec<ErrorRecord>,
    pub recent_api_errors: Vec<NetworkRecord>,
    pub recent_api_requests: Vec<NetworkRecord>,
    pub timestamp: String,
    pub page_url: String,
    pub session_duration_ms: u64,
}

// ─── Session ──────────────────────────────────────────────────────────────────

/// Process-wide identity for one page load. Not persisted across navigation.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub page_url: String,
}

impl Session {
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            start_time: Utc::now(),
            page_url: page_url.into(),
        }
    }

    /// Wall-clock milliseconds since the session started.
    pub fn duration_ms(&self, now: DateTime<Utc>) -> u64 {
        (now - self.start_time).num_milliseconds().max(0) as u64
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Truncate a string to at most `max` characters, on a character boundary.
///
/// Appends an ellipsis marker when truncation happened so consumers can tell
/// a capped field from a short one.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

/// RFC 3339 rendering of a capture instant.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_error(message: &str) -> ErrorRecord {
        ErrorRecord {
            kind: ErrorKind::UncaughtError,
            error_type: "TypeError".to_string(),
            message: message.to_string(),
            stack: Some("at render (app.js:10:5)".to_string()),
            component_stack: None,
            source_location: Some(SourceLocation {
                file: "app.js".to_string(),
                line: 10,
                column: 5,
            }),
            timestamp: Utc::now().to_rfc3339(),
            page_url: "https://app.example/checkout".to_string(),
        }
    }

    #[test]
    fn truncate_is_char_boundary_safe() {
        let s = "héllo wörld";
        let out = truncate_chars(s, 4);
        assert_eq!(out, "héll…");
    }

    #[test]
    fn truncate_leaves_short_strings_alone() {
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn error_record_round_trips() {
        let record = sample_error("x is not a function");
        let json = serde_json::to_string(&record).unwrap();
        let back: ErrorRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn crash_event_round_trips_at_body_cap() {
        let body = "x".repeat(MAX_BODY_CHARS);
        let net = NetworkRecord {
            method: "POST".to_string(),
            url: "https://api.example/orders".to_string(),
            status: 500,
            status_text: "Internal Server Error".to_string(),
            duration_ms: 120,
            request_headers: BTreeMap::new(),
            request_body: Some(body.clone()),
            response_headers: BTreeMap::new(),
            response_body: Some(body),
            error_details: Some(serde_json::json!({"error": "boom"})),
            correlation_id: Some("abc-123".to_string()),
            correlation_header: Some("x-trace-id".to_string()),
            failure_kind: None,
            is_error: true,
            timestamp: Utc::now().to_rfc3339(),
        };
        let event = CrashEvent {
            detection_method: DetectionMethod::ErrorBased,
            reason: "reference error".to_string(),
            primary: CrashTrigger::Error {
                record: sample_error("y is not defined"),
            },
            recent_critical_errors: vec![sample_error("y is not defined")],
            recent_console_errors: vec![],
            recent_page_errors: vec![sample_error("y is not defined")],
            recent_api_errors: vec![net.clone()],
            recent_api_requests: vec![net],
            timestamp: Utc::now().to_rfc3339(),
            page_url: "https://app.example/checkout".to_string(),
            session_duration_ms: 4210,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: CrashEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn session_duration_is_monotonic_non_negative() {
        let session = Session::new("https://app.example");
        let earlier = session.start_time - chrono::Duration::seconds(5);
        assert_eq!(session.duration_ms(earlier), 0);
        let later = session.start_time + chrono::Duration::milliseconds(1500);
        assert_eq!(session.duration_ms(later), 1500);
    }
}
