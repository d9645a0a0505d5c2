//! Replay of recorded page-event streams.
//!
//! A replay file is JSON Lines: one captured page event per line, tagged by
//! `type`. The harness binary feeds each event through a live engine exactly
//! as the in-page hooks would, which makes recorded incidents reproducible
//! and gives the detector path an end-to-end test surface.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::dom::DomNode;
use crate::engine::{CaptureEngine, ConsoleLevel};
use crate::net::{build_network_record, HttpRequest, HttpResponse, TransportError};

/// Sub-kind of a failed call in a replay stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayFailure {
    NetworkError,
    Aborted,
    TimedOut,
}

/// One recorded page event.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReplayEvent {
    ConsoleError {
        args: Vec<Value>,
    },
    ConsoleWarn {
        args: Vec<Value>,
    },
    Assertion {
        message: String,
    },
    PageError {
        error: Value,
    },
    UnhandledRejection {
        reason: Value,
    },
    /// A settled network call: a response, or a failure sub-kind.
    #[serde(rename_all = "camelCase")]
    NetworkCall {
        request: HttpRequest,
        #[serde(default)]
        response: Option<HttpResponse>,
        #[serde(default)]
        failure: Option<ReplayFailure>,
        #[serde(default)]
        duration_ms: u64,
    },
    DomSnapshot {
        root: DomNode,
    },
}

/// Parse one JSONL line.
pub fn parse_line(line: &str) -> Result<ReplayEvent, serde_json::Error> {
    serde_json::from_str(line)
}

/// Feed one event through the engine the way the live hooks would.
pub fn apply(engine: &CaptureEngine, event: ReplayEvent) {
    match event {
        ReplayEvent::ConsoleError { args } => engine.record_console(ConsoleLevel::Error, &args),
        ReplayEvent::ConsoleWarn { args } => engine.record_console(ConsoleLevel::Warn, &args),
        ReplayEvent::Assertion { message } => engine.record_assertion(&message),
        ReplayEvent::PageError { error } => engine.record_page_error(&error),
        ReplayEvent::UnhandledRejection { reason } => engine.record_unhandled_rejection(&reason),
        ReplayEvent::NetworkCall {
            request,
            response,
            failure,
            duration_ms,
        } => {
            let mut error = failure.map(|f| match f {
                ReplayFailure::NetworkError => {
                    TransportError::Network("replayed network failure".to_string())
                }
                ReplayFailure::Aborted => TransportError::Aborted,
                ReplayFailure::TimedOut => TransportError::TimedOut,
            });
            if response.is_none() && error.is_none() {
                // Neither a response nor a failure kind: the call never
                // settled cleanly; record it as a network-level failure.
                error = Some(TransportError::Network("call never settled".to_string()));
            }
            let duration = Duration::from_millis(duration_ms);
            let record = match (&error, &response) {
                (Some(err), _) => build_network_record(&request, Err(err), duration),
                (None, Some(resp)) => build_network_record(&request, Ok(resp), duration),
                (None, None) => return,
            };
            engine.record_network(record);
        }
        ReplayEvent::DomSnapshot { root } => engine.observe_dom(&root),
    }
}
