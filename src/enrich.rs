//! Crash bundle assembly.
//!
//! When either detector fires, the enrichment step snapshots a bounded tail
//! of every in-memory buffer into one [`CrashEvent`]. The snapshot is copied
//! by value — buffers keep accumulating afterward, and nothing is drained.

use chrono::{DateTime, Utc};

use crate::records::{
    format_timestamp, CrashEvent, CrashTrigger, DetectionMethod, ErrorRecord, NetworkRecord,
    Session,
};
use crate::ring::RingBuffer;

/// Tail sizes per category. Requests get the widest slice because they are
/// the densest stream and the cheapest to scan later.
const RECENT_CRITICAL: usize = 10;
const RECENT_CONSOLE: usize = 20;
const RECENT_PAGE: usize = 20;
const RECENT_API_ERRORS: usize = 20;
const RECENT_API_REQUESTS: usize = 30;

/// Read-only view over the engine's buffers at trigger time.
pub struct EnrichmentSources<'a> {
    pub console_errors: &'a RingBuffer<ErrorRecord>,
    pub page_errors: &'a RingBuffer<ErrorRecord>,
    pub api_errors: &'a RingBuffer<NetworkRecord>,
    pub api_requests: &'a RingBuffer<NetworkRecord>,
    pub recent_critical: Vec<ErrorRecord>,
}

/// Assemble the terminal crash bundle.
pub fn build_crash_event(
    detection_method: DetectionMethod,
    reason: String,
    primary: CrashTrigger,
    sources: EnrichmentSources<'_>,
    session: &Session,
    now: DateTime<Utc>,
) -> CrashEvent {
    let mut recent_critical = sources.recent_critical;
    if recent_critical.len() > RECENT_CRITICAL {
        recent_critical.drain(..recent_critical.len() - RECENT_CRITICAL);
    }

    CrashEvent {
        detection_method,
        reason,
        primary,
        recent_critical_errors: recent_critical,
        recent_console_errors: sources.console_errors.tail(RECENT_CONSOLE),
        recent_page_errors: sources.page_errors.tail(RECENT_PAGE),
        recent_api_errors: sources.api_errors.tail(RECENT_API_ERRORS),
        recent_api_requests: sources.api_requests.tail(RECENT_API_REQUESTS),
        timestamp: format_timestamp(now),
        page_url: session.page_url.clone(),
        session_duration_ms: session.duration_ms(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::ErrorKind;
    use std::collections::BTreeMap;

    fn error(message: &str) -> ErrorRecord {
        ErrorRecord {
            kind: ErrorKind::ConsoleError,
            error_type: "TypeError".to_string(),
            message: message.to_string(),
            stack: None,
            component_stack: None,
            source_location: None,
            timestamp: Utc::now().to_rfc3339(),
            page_url: "https://app.example".to_string(),
        }
    }

    fn request(url: &str) -> NetworkRecord {
        NetworkRecord {
            method: "GET".to_string(),
            url: url.to_string(),
            status: 200,
            status_text: "OK".to_string(),
            duration_ms: 1,
            request_headers: BTreeMap::new(),
            request_body: None,
            response_headers: BTreeMap::new(),
            response_body: None,
            error_details: None,
            correlation_id: None,
            correlation_header: None,
            failure_kind: None,
            is_error: false,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn slices_are_bounded_and_most_recent() {
        let mut console = RingBuffer::new(100);
        for i in 0..50 {
            console.push(error(&format!("console failure number {i}")));
        }
        let mut requests = RingBuffer::new(100);
        for i in 0..80 {
            requests.push(request(&format!("/r{i}")));
        }
        let page = RingBuffer::new(50);
        let api_errors = RingBuffer::new(50);

        let session = Session::new("https://app.example/checkout");
        let now = session.start_time + chrono::Duration::seconds(7);
        let trigger = error("boom happened here");
        let event = build_crash_event(
            DetectionMethod::ErrorBased,
            "test trigger".to_string(),
            CrashTrigger::Error {
                record: trigger.clone(),
            },
            EnrichmentSources {
                console_errors: &console,
                page_errors: &page,
                api_errors: &api_errors,
                api_requests: &requests,
                recent_critical: (0..15).map(|i| error(&format!("critical {i}"))).collect(),
            },
            &session,
            now,
        );

        assert_eq!(event.recent_console_errors.len(), RECENT_CONSOLE);
        assert_eq!(
            event.recent_console_errors.last().unwrap().message,
            "console failure number 49"
        );
        assert_eq!(event.recent_api_requests.len(), RECENT_API_REQUESTS);
        assert_eq!(event.recent_api_requests.last().unwrap().url, "/r79");
        // Over-long critical list keeps the most recent entries.
        assert_eq!(event.recent_critical_errors.len(), RECENT_CRITICAL);
        assert_eq!(event.recent_critical_errors[0].message, "critical 5");
        assert!(event.recent_page_errors.is_empty());
        assert_eq!(event.session_duration_ms, 7000);
        assert_eq!(event.page_url, "https://app.example/checkout");

        // Source buffers are untouched by enrichment.
        assert_eq!(console.len(), 50);
        assert_eq!(requests.len(), 80);
    }
}
