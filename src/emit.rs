//! Typed event channel — the engine's outbound notification boundary.
//!
//! Every capture and every crash crosses to the surrounding execution context
//! as one [`AgentEvent`] on a broadcast channel: fire-and-forget, one-way,
//! never blocking capture. No subscribers is a normal state and send errors
//! are ignored.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::records::{CrashEvent, ErrorRecord, NetworkRecord};

/// Event categories crossing the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ConsoleError,
    ConsoleWarn,
    PageError,
    PromiseRejection,
    ApiError,
    ApiRequest,
    CrashDetected,
}

/// The record carried by an event.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Error(ErrorRecord),
    Network(NetworkRecord),
    Crash(Box<CrashEvent>),
}

/// One outbound notification: kind + record + session identity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEvent {
    pub kind: EventKind,
    pub session_id: String,
    pub page_url: String,
    pub payload: EventPayload,
}

/// Broadcasts [`AgentEvent`]s to all subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Send to all subscribers. Ignores errors — no subscribers is fine.
    pub fn emit(&self, event: AgentEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to all subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::ErrorKind;
    use chrono::Utc;

    fn event(kind: EventKind, message: &str) -> AgentEvent {
        AgentEvent {
            kind,
            session_id: "s-1".to_string(),
            page_url: "https://app.example".to_string(),
            payload: EventPayload::Error(ErrorRecord {
                kind: ErrorKind::ConsoleError,
                error_type: "TypeError".to_string(),
                message: message.to_string(),
                stack: None,
                component_stack: None,
                source_location: None,
                timestamp: Utc::now().to_rfc3339(),
                page_url: "https://app.example".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(event(EventKind::ConsoleError, "first"));
        bus.emit(event(EventKind::PageError, "second"));

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::ConsoleError);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::PageError);
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.emit(event(EventKind::ApiError, "nobody listening"));
    }

    #[test]
    fn events_serialize_with_session_identity() {
        let json = serde_json::to_string(&event(EventKind::ConsoleError, "x")).unwrap();
        assert!(json.contains("\"sessionId\":\"s-1\""));
        assert!(json.contains("\"kind\":\"console_error\""));
    }
}
