//! The capture engine — one context object owning all buffers and latches.
//!
//! Every interception hook feeds records into this object; nothing else may
//! write to its buffers, and consumers only ever read bounded copies. One
//! engine instance corresponds to one monitored page load. Instances are
//! independent, so tests (and multi-page hosts) can run several side by side.
//!
//! Capture paths are deliberately infallible: a fault inside the engine's own
//! bookkeeping is logged and swallowed, never surfaced to the code path that
//! was being observed.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::collector::{self, CollectorClient, OutboundRecord};
use crate::config::AgentConfig;
use crate::detector::CrashDetector;
use crate::dom::{DomCrashWatcher, DomNode};
use crate::emit::{AgentEvent, EventBus, EventKind, EventPayload};
use crate::enrich::{build_crash_event, EnrichmentSources};
use crate::filters;
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::net::{AlreadyIntercepted, InterceptedTransport, NetworkObserver, Transport};
use crate::normalize::{extract_error_info, format_args, ErrorInfo};
use crate::records::{
    format_timestamp, CrashEvent, CrashTrigger, DetectionMethod, ErrorKind, ErrorRecord,
    NetworkRecord, Session,
};
use crate::ring::RingBuffer;
use crate::window::SlidingApiWindow;

/// Console method a captured call came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Error,
    Warn,
}

/// Which ring an error record lands in.
enum ErrorBufferKind {
    Console,
    Page,
}

/// Synchronous snapshot of every in-memory buffer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferSnapshot {
    pub console_errors: Vec<ErrorRecord>,
    pub page_errors: Vec<ErrorRecord>,
    pub api_errors: Vec<NetworkRecord>,
    pub api_requests: Vec<NetworkRecord>,
    pub crashes: Vec<CrashEvent>,
    /// The sliding window's persisted before/failure/after trace.
    pub window_trace: Vec<NetworkRecord>,
    pub session_id: String,
    pub page_url: String,
}

/// All mutable capture state, behind one lock.
struct EngineState {
    console_errors: RingBuffer<ErrorRecord>,
    page_errors: RingBuffer<ErrorRecord>,
    api_errors: RingBuffer<NetworkRecord>,
    api_requests: RingBuffer<NetworkRecord>,
    crashes: RingBuffer<CrashEvent>,
    window: SlidingApiWindow,
    detector: CrashDetector,
    dom_watcher: DomCrashWatcher,
}

/// The capture/correlation engine for one monitored page.
pub struct CaptureEngine {
    config: AgentConfig,
    session: Session,
    state: Mutex<EngineState>,
    bus: EventBus,
    metrics: Arc<EngineMetrics>,
    collector: Mutex<Option<CollectorClient>>,
    transport_installed: Arc<AtomicBool>,
}

impl CaptureEngine {
    /// Create a capture-only engine (no collector forwarding).
    pub fn new(config: AgentConfig, page_url: impl Into<String>) -> Self {
        let session = Session::new(page_url);
        let state = EngineState {
            console_errors: RingBuffer::new(config.buffers.console_capacity),
            page_errors: RingBuffer::new(config.buffers.page_capacity),
            api_errors: RingBuffer::new(config.buffers.api_error_capacity),
            api_requests: RingBuffer::new(config.buffers.api_request_capacity),
            crashes: RingBuffer::new(config.buffers.crash_capacity),
            window: SlidingApiWindow::new(
                config.window.before_count,
                config.window.after_count,
                config.window.persisted_cap,
            ),
            detector: CrashDetector::new(config.detector.clone()),
            dom_watcher: DomCrashWatcher::new(config.dom.min_text_len),
        };
        Self {
            config,
            session,
            state: Mutex::new(state),
            bus: EventBus::new(),
            metrics: Arc::new(EngineMetrics::new()),
            collector: Mutex::new(None),
            transport_installed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start forwarding records to the configured collector endpoint.
    ///
    /// Must be called inside a tokio runtime. A second call replaces the
    /// previous forwarder (the old one flushes and exits).
    pub fn start_collector(&self) {
        if self.config.collector.endpoint.is_none() {
            debug!("collector endpoint not configured; forwarding disabled");
            return;
        }
        let client = collector::spawn(
            self.config.collector.clone(),
            self.session.session_id.clone(),
            self.session.page_url.clone(),
            Arc::clone(&self.metrics),
        );
        *self.lock_collector() = Some(client);
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Subscribe to the outbound event stream.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<AgentEvent> {
        self.bus.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // ─── Capture hooks ───────────────────────────────────────────────────────

    /// Intercepted console call. `args` are the logged values, verbatim.
    pub fn record_console(&self, level: ConsoleLevel, args: &[Value]) {
        self.guarded("console capture", || {
            let message = format_args(args);
            if filters::should_ignore_console(&message) {
                self.metrics.inc(&self.metrics.noise_suppressed);
                return;
            }

            // The first object argument supplies the semantic classification.
            let info = args
                .iter()
                .find(|a| a.is_object())
                .map(|a| extract_error_info(a, 0));
            let (kind, error_type) = match level {
                ConsoleLevel::Warn => (ErrorKind::ConsoleWarn, "Warning".to_string()),
                ConsoleLevel::Error => (
                    ErrorKind::ConsoleError,
                    info.as_ref()
                        .map(|i| i.error_type.clone())
                        .filter(|t| !t.is_empty() && t != "Object" && t != "string")
                        .unwrap_or_else(|| "ConsoleError".to_string()),
                ),
            };
            if !filters::is_real_error(&error_type, &message) {
                self.metrics.inc(&self.metrics.noise_suppressed);
                return;
            }

            let mut record = self.error_record(kind, error_type, message);
            if let Some(info) = info {
                record.stack = info.stack;
                record.component_stack = info.component_stack;
            }
            self.metrics.inc(&self.metrics.console_captured);

            let event_kind = match level {
                ConsoleLevel::Error => EventKind::ConsoleError,
                ConsoleLevel::Warn => EventKind::ConsoleWarn,
            };
            self.store_error(record, event_kind, ErrorBufferKind::Console);
        });
    }

    /// Failed `console.assert` condition.
    pub fn record_assertion(&self, message: &str) {
        self.guarded("assertion capture", || {
            if filters::should_ignore_console(message) {
                self.metrics.inc(&self.metrics.noise_suppressed);
                return;
            }
            let record = self.error_record(
                ErrorKind::Assertion,
                "AssertionError".to_string(),
                message.to_string(),
            );
            self.metrics.inc(&self.metrics.console_captured);
            self.store_error(record, EventKind::ConsoleError, ErrorBufferKind::Console);
        });
    }

    /// Uncaught page error — the value the global `error` hook delivered.
    pub fn record_page_error(&self, value: &Value) {
        self.guarded("page error capture", || {
            self.capture_page_value(value, ErrorKind::UncaughtError, EventKind::PageError);
        });
    }

    /// Unhandled promise rejection reason.
    pub fn record_unhandled_rejection(&self, reason: &Value) {
        self.guarded("rejection capture", || {
            self.capture_page_value(
                reason,
                ErrorKind::UnhandledRejection,
                EventKind::PromiseRejection,
            );
        });
    }

    /// One settled network call, from the interceptor or a replay stream.
    pub fn record_network(&self, record: NetworkRecord) {
        self.guarded("network capture", || {
            let now = Utc::now();
            self.metrics.inc(&self.metrics.network_observed);
            if record.is_error {
                self.metrics.inc(&self.metrics.network_errors);
            }

            let mut state = self.lock_state();
            state.api_requests.push(record.clone());
            if record.is_error {
                state.api_errors.push(record.clone());
            }
            state.window.observe(record.clone(), now);
            drop(state);

            let kind = if record.is_error {
                EventKind::ApiError
            } else {
                EventKind::ApiRequest
            };
            self.emit(kind, EventPayload::Network(record));
        });
    }

    /// Check a document snapshot for fatal-error UI markers.
    pub fn observe_dom(&self, root: &DomNode) {
        self.guarded("dom check", || {
            let now = Utc::now();
            let mut state = self.lock_state();
            let latched = state.detector.is_latched(now);
            let Some(marker) = state.dom_watcher.check(root, latched) else {
                return;
            };
            // DOM crashes share the error detector's cooldown window.
            state.detector.latch(now);
            let recent_critical = state.detector.recent_critical(now);
            let reason = format!("fatal error ui: {}", marker.matcher);
            self.emit_crash(
                &mut state,
                DetectionMethod::DomBased,
                reason,
                CrashTrigger::DomMarker { marker },
                recent_critical,
                now,
            );
        });
    }

    /// Diagnostic hook: drive a synthetic error through the full detector
    /// path. Emits a real crash event.
    pub fn trigger_test_error(&self) {
        let value = serde_json::json!({
            "name": "ReferenceError",
            "message": "crashwatch_selftest is not defined",
            "stack": "ReferenceError: crashwatch_selftest is not defined\n    at selftest",
        });
        self.record_page_error(&value);
    }

    // ─── Interception install ────────────────────────────────────────────────

    /// Wrap a transport so every call through it is observed.
    ///
    /// Installs at most once per engine: a second call returns the transport
    /// untouched. [`InterceptedTransport::release`] uninstalls.
    pub fn intercept<T: Transport>(
        self: &Arc<Self>,
        inner: T,
    ) -> Result<InterceptedTransport<T>, AlreadyIntercepted<T>> {
        if self
            .transport_installed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AlreadyIntercepted(inner));
        }
        Ok(InterceptedTransport::new(
            inner,
            Arc::clone(self) as Arc<dyn NetworkObserver>,
            Arc::clone(&self.transport_installed),
        ))
    }

    // ─── Query / command surface ─────────────────────────────────────────────

    /// Bounded copy of every buffer, for UI or export consumption.
    pub fn snapshot(&self) -> BufferSnapshot {
        let state = self.lock_state();
        BufferSnapshot {
            console_errors: state.console_errors.to_vec(),
            page_errors: state.page_errors.to_vec(),
            api_errors: state.api_errors.to_vec(),
            api_requests: state.api_requests.to_vec(),
            crashes: state.crashes.to_vec(),
            window_trace: state.window.trace(),
            session_id: self.session.session_id.clone(),
            page_url: self.session.page_url.clone(),
        }
    }

    /// Reset all buffers to empty. Detector and watcher state survive, so a
    /// crash already in cooldown is not re-reported.
    pub fn clear(&self) {
        let mut state = self.lock_state();
        state.console_errors.clear();
        state.page_errors.clear();
        state.api_errors.clear();
        state.api_requests.clear();
        state.crashes.clear();
        state.window.clear();
    }

    /// Return the engine to a fresh state: buffers, detector latch, and DOM
    /// dedup all cleared. The session identity is kept.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        state.console_errors.clear();
        state.page_errors.clear();
        state.api_errors.clear();
        state.api_requests.clear();
        state.crashes.clear();
        state.window.clear();
        state.detector.reset();
        state.dom_watcher.reset();
    }

    /// Stop forwarding (final collector flush) and release the intercept
    /// guard. The engine remains usable for capture afterward.
    pub fn teardown(&self) {
        self.lock_collector().take();
        self.transport_installed.store(false, Ordering::SeqCst);
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    /// Run capture bookkeeping inside a panic boundary. The agent must stay
    /// invisible: a fault here is logged, never propagated to the caller.
    fn guarded(&self, what: &str, f: impl FnOnce()) {
        if catch_unwind(AssertUnwindSafe(f)).is_err() {
            warn!("{what} failed internally; host call path unaffected");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_collector(&self) -> MutexGuard<'_, Option<CollectorClient>> {
        self.collector
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn error_record(&self, kind: ErrorKind, error_type: String, message: String) -> ErrorRecord {
        ErrorRecord {
            kind,
            error_type,
            message,
            stack: None,
            component_stack: None,
            source_location: None,
            timestamp: format_timestamp(Utc::now()),
            page_url: self.session.page_url.clone(),
        }
    }

    /// Shared path for uncaught errors and rejections.
    fn capture_page_value(&self, value: &Value, kind: ErrorKind, event_kind: EventKind) {
        let info = extract_error_info(value, 0);
        let message = flatten_message(&info);
        if filters::should_ignore(&message) || !filters::is_real_error(&info.error_type, &message)
        {
            self.metrics.inc(&self.metrics.noise_suppressed);
            return;
        }

        let mut record = self.error_record(kind, info.error_type.clone(), message);
        record.stack = info.stack;
        record.component_stack = info.component_stack;
        record.source_location = info.source_location;
        self.metrics.inc(&self.metrics.page_errors_captured);
        self.store_error(record, event_kind, ErrorBufferKind::Page);
    }

    /// Store a finished record, run the crash detector, emit, forward.
    fn store_error(&self, record: ErrorRecord, event_kind: EventKind, target: ErrorBufferKind) {
        let now = Utc::now();
        let mut state = self.lock_state();
        match target {
            ErrorBufferKind::Console => state.console_errors.push(record.clone()),
            ErrorBufferKind::Page => state.page_errors.push(record.clone()),
        }
        let decision = state.detector.observe(&record, now);
        if let Some(decision) = decision {
            self.emit_crash(
                &mut state,
                DetectionMethod::ErrorBased,
                decision.reason,
                CrashTrigger::Error {
                    record: record.clone(),
                },
                decision.recent_critical,
                now,
            );
        }
        drop(state);

        self.emit(event_kind, EventPayload::Error(record.clone()));
        self.forward(OutboundRecord::Error(record));
    }

    /// Enrich, buffer, emit, and forward one crash event.
    fn emit_crash(
        &self,
        state: &mut EngineState,
        method: DetectionMethod,
        reason: String,
        primary: CrashTrigger,
        recent_critical: Vec<ErrorRecord>,
        now: DateTime<Utc>,
    ) {
        let event = build_crash_event(
            method,
            reason,
            primary,
            EnrichmentSources {
                console_errors: &state.console_errors,
                page_errors: &state.page_errors,
                api_errors: &state.api_errors,
                api_requests: &state.api_requests,
                recent_critical,
            },
            &self.session,
            now,
        );
        state.crashes.push(event.clone());
        self.metrics.inc(&self.metrics.crashes_emitted);
        debug!(reason = %event.reason, method = ?event.detection_method, "crash detected");

        self.emit(
            EventKind::CrashDetected,
            EventPayload::Crash(Box::new(event.clone())),
        );
        self.forward(OutboundRecord::Crash(Box::new(event)));
    }

    fn emit(&self, kind: EventKind, payload: EventPayload) {
        self.bus.emit(AgentEvent {
            kind,
            session_id: self.session.session_id.clone(),
            page_url: self.session.page_url.clone(),
            payload,
        });
    }

    fn forward(&self, record: OutboundRecord) {
        if let Some(client) = self.lock_collector().as_ref() {
            client.send(record);
        }
    }
}

impl NetworkObserver for CaptureEngine {
    fn network_settled(&self, record: NetworkRecord) {
        self.record_network(record);
    }
}

/// Fold a one-level cause chain into the record's message.
fn flatten_message(info: &ErrorInfo) -> String {
    match &info.cause {
        Some(cause) => format!(
            "{}\nCaused by: {}: {}",
            info.message, cause.error_type, cause.message
        ),
        None => info.message.clone(),
    }
}
