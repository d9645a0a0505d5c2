//! DOM crash watcher — backup detector for crashes that never throw.
//!
//! Server-rendered fallback screens, framework error boundaries that swallow
//! the exception, blank-page "something went wrong" overlays: none of these
//! reach the error hooks. The watcher inspects snapshots of the document
//! against a fixed list of fatal-error UI heuristics and reports the first
//! visible match carrying real text.
//!
//! The engine does not own a browser. Hosts provide [`DomNode`] snapshots —
//! either by calling the engine directly on their own schedule, or by handing
//! a [`DomProvider`] to [`spawn_watcher`], which runs the canonical schedule:
//! fixed post-load delays, then debounced re-checks on mutation signals.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::engine::CaptureEngine;
use crate::records::{truncate_chars, DomMarker};

// ─── Document snapshot ────────────────────────────────────────────────────────

/// One element in a host-supplied document snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DomNode {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub role: Option<String>,
    /// The element's own text, excluding children.
    pub text: String,
    /// False for `display:none` subtrees — invisible elements never match.
    pub visible: bool,
    pub children: Vec<DomNode>,
}

impl DomNode {
    fn describe(&self) -> String {
        let mut out = if self.tag.is_empty() {
            "element".to_string()
        } else {
            self.tag.clone()
        };
        if let Some(id) = &self.id {
            out.push('#');
            out.push_str(id);
        }
        for class in &self.classes {
            out.push('.');
            out.push_str(class);
        }
        out
    }

    /// Concatenated visible text of this element and its descendants.
    fn visible_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if !self.visible {
            return;
        }
        let own = self.text.trim();
        if !own.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(own);
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }
}

// ─── Fatal-error heuristics ───────────────────────────────────────────────────

/// Class-name substrings that mark a dedicated error/crash screen.
const FATAL_CLASS_MARKERS: &[&str] = &[
    "error-page",
    "error-screen",
    "error-overlay",
    "error-boundary",
    "fatal-error",
    "crash",
    "something-went-wrong",
];

/// Id substrings that mark a dedicated error/crash screen.
const FATAL_ID_MARKERS: &[&str] = &["error-page", "fatal-error", "crash"];

fn match_node(node: &DomNode) -> Option<String> {
    for marker in FATAL_CLASS_MARKERS {
        if node.classes.iter().any(|c| c.contains(marker)) {
            return Some(format!("class:{marker}"));
        }
    }
    if let Some(id) = &node.id {
        for marker in FATAL_ID_MARKERS {
            if id.contains(marker) {
                return Some(format!("id:{marker}"));
            }
        }
    }
    // An alert role alone is too common (toasts, banners); require an
    // error-ish class alongside it.
    if node.role.as_deref() == Some("alert")
        && node.classes.iter().any(|c| c.contains("error"))
    {
        return Some("role:alert".to_string());
    }
    None
}

/// Depth-first search for the first visible fatal-error marker with
/// non-trivial text.
pub fn find_marker(root: &DomNode, min_text_len: usize) -> Option<DomMarker> {
    if !root.visible {
        return None;
    }
    if let Some(matcher) = match_node(root) {
        let text = root.visible_text();
        if text.chars().count() >= min_text_len {
            return Some(DomMarker {
                matcher,
                element: root.describe(),
                text: truncate_chars(&text, 400),
            });
        }
    }
    root.children
        .iter()
        .find_map(|child| find_marker(child, min_text_len))
}

// ─── Watcher state ────────────────────────────────────────────────────────────

/// Dedup state for DOM-based crash emission.
///
/// Emits only when the matched heuristic differs from the last emission, and
/// the engine additionally suppresses it while an error-based crash is
/// latched — one user-visible crash must not be reported twice.
#[derive(Debug)]
pub struct DomCrashWatcher {
    min_text_len: usize,
    last_matcher: Option<String>,
}

impl DomCrashWatcher {
    pub fn new(min_text_len: usize) -> Self {
        Self {
            min_text_len,
            last_matcher: None,
        }
    }

    /// Check one snapshot. `error_latched` is the error-detector's latch
    /// state at call time.
    pub fn check(&mut self, root: &DomNode, error_latched: bool) -> Option<DomMarker> {
        let marker = find_marker(root, self.min_text_len)?;
        if error_latched {
            debug!(matcher = %marker.matcher, "dom marker suppressed by error-based latch");
            return None;
        }
        if self.last_matcher.as_deref() == Some(marker.matcher.as_str()) {
            return None;
        }
        self.last_matcher = Some(marker.matcher.clone());
        Some(marker)
    }

    pub fn reset(&mut self) {
        self.last_matcher = None;
    }
}

// ─── Scheduling ───────────────────────────────────────────────────────────────

/// Supplies document snapshots on demand.
pub trait DomProvider: Send + Sync {
    /// None when no document is available (detached, navigating).
    fn snapshot(&self) -> Option<DomNode>;
}

/// Run the canonical watch schedule against an engine.
///
/// Checks fire at the configured post-load delays, then on every mutation
/// signal after a short debounce (bursts coalesce into one check). The task
/// ends when the mutation channel closes.
pub fn spawn_watcher(
    engine: Arc<CaptureEngine>,
    provider: Arc<dyn DomProvider>,
    mut mutations: mpsc::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    let delays = engine.config().dom.check_delays_ms.clone();
    let debounce = Duration::from_millis(engine.config().dom.debounce_ms);

    tokio::spawn(async move {
        let started = Instant::now();
        for delay_ms in delays {
            let target = Duration::from_millis(delay_ms);
            if let Some(remaining) = target.checked_sub(started.elapsed()) {
                tokio::time::sleep(remaining).await;
            }
            run_check(&engine, provider.as_ref());
        }

        while mutations.recv().await.is_some() {
            tokio::time::sleep(debounce).await;
            while mutations.try_recv().is_ok() {}
            run_check(&engine, provider.as_ref());
        }
    })
}

fn run_check(engine: &CaptureEngine, provider: &dyn DomProvider) {
    if let Some(root) = provider.snapshot() {
        engine.observe_dom(&root);
    }
}
