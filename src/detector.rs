// SPDX-License-Identifier: MIT
//! Crash-detection state machine.
//!
//! Aggregates recent critical errors and decides when the page has crashed in
//! a user-visible way. The trigger is an OR of three signals with different
//! precision/recall trade-offs: a strict type match (`ReferenceError`), a
//! strict substring match (`is not defined` / a component boundary stack), and
//! a volume threshold over a recency window that catches cascades of
//! lower-confidence errors. After a trigger the detector latches for a
//! cooldown so the secondary errors a crash throws off don't become duplicate
//! crash events.
//!
//! All time comparisons take `now` as a parameter — the engine passes
//! wall-clock time, tests pass synthetic instants.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::DetectorConfig;
use crate::records::{truncate_chars, ErrorRecord};

// ─── Criticality classification ───────────────────────────────────────────────

/// Error classes that are critical regardless of message content.
const CRITICAL_TYPES: &[&str] = &["ReferenceError", "TypeError", "ChunkLoadError", "SyntaxError"];

/// Crash-indicative message patterns for errors of any class.
static CRASH_MESSAGE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"is not defined").expect("regex: undefined reference"),
        Regex::new(r"Cannot read propert(?:y|ies) of (?:null|undefined)")
            .expect("regex: null property access"),
        Regex::new(r"(?i)null is not an object").expect("regex: null object"),
        Regex::new(r"Maximum call stack size exceeded").expect("regex: stack overflow"),
        Regex::new(r"(?i)out of memory").expect("regex: oom"),
        Regex::new(r"Loading chunk [\w-]+ failed").expect("regex: chunk load"),
        Regex::new(r"Failed to fetch dynamically imported module")
            .expect("regex: dynamic import"),
        Regex::new(r"(?i)failed to fetch").expect("regex: fetch failure"),
    ]
});

/// True if the error is severe enough to count toward crash detection.
pub fn is_critical(error_type: &str, message: &str) -> bool {
    CRITICAL_TYPES.contains(&error_type)
        || CRASH_MESSAGE_PATTERNS.iter().any(|p| p.is_match(message))
}

// ─── Detector ─────────────────────────────────────────────────────────────────

/// A crash trigger, with the critical-error context captured at that instant.
#[derive(Debug, Clone)]
pub struct CrashDecision {
    /// Human-readable trigger description.
    pub reason: String,
    /// Critical errors in the recency window at trigger time.
    pub recent_critical: Vec<ErrorRecord>,
}

/// State machine deciding when a stream of error records constitutes a crash.
#[derive(Debug)]
pub struct CrashDetector {
    config: DetectorConfig,
    recent_critical: VecDeque<(DateTime<Utc>, ErrorRecord)>,
    latched_until: Option<DateTime<Utc>>,
}

impl CrashDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            recent_critical: VecDeque::new(),
            latched_until: None,
        }
    }

    /// Feed one error record through the detector.
    ///
    /// Returns a [`CrashDecision`] when a crash should be emitted. While
    /// latched (cooldown running), qualifying errors still accumulate but
    /// never produce a second decision.
    pub fn observe(&mut self, record: &ErrorRecord, now: DateTime<Utc>) -> Option<CrashDecision> {
        self.prune(now);

        if is_critical(&record.error_type, &record.message) {
            self.recent_critical.push_back((now, record.clone()));
        }

        let reason = self.trigger_reason(record)?;
        if self.is_latched(now) {
            debug!(reason = %reason, "crash trigger suppressed by cooldown");
            return None;
        }

        self.latched_until = Some(now + Duration::seconds(self.config.cooldown_secs as i64));
        let recent_critical: Vec<ErrorRecord> = self
            .recent_critical
            .drain(..)
            .map(|(_, record)| record)
            .collect();
        Some(CrashDecision {
            reason,
            recent_critical,
        })
    }

    /// True while the post-crash cooldown is running.
    pub fn is_latched(&self, now: DateTime<Utc>) -> bool {
        self.latched_until.is_some_and(|until| now < until)
    }

    /// Start the cooldown without an error-based trigger. Used when the DOM
    /// watcher emits a crash, so both detectors share one cooldown window.
    pub fn latch(&mut self, now: DateTime<Utc>) {
        self.latched_until = Some(now + Duration::seconds(self.config.cooldown_secs as i64));
    }

    /// Critical errors currently inside the recency window.
    pub fn recent_critical(&mut self, now: DateTime<Utc>) -> Vec<ErrorRecord> {
        self.prune(now);
        self.recent_critical
            .iter()
            .map(|(_, record)| record.clone())
            .collect()
    }

    pub fn reset(&mut self) {
        self.recent_critical.clear();
        self.latched_until = None;
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(self.config.critical_window_secs as i64);
        while self
            .recent_critical
            .front()
            .is_some_and(|(at, _)| *at <= cutoff)
        {
            self.recent_critical.pop_front();
        }
    }

    fn trigger_reason(&self, record: &ErrorRecord) -> Option<String> {
        if record.error_type == "ReferenceError" {
            return Some(format!(
                "reference error: {}",
                truncate_chars(&record.message, 120)
            ));
        }
        if record.message.contains("is not defined") {
            return Some(format!(
                "undefined reference: {}",
                truncate_chars(&record.message, 120)
            ));
        }
        if record.component_stack.is_some() {
            return Some("component boundary error".to_string());
        }
        if self.recent_critical.len() >= self.config.volume_threshold {
            return Some(format!(
                "{} critical errors within {}s",
                self.recent_critical.len(),
                self.config.critical_window_secs
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::ErrorKind;

    fn record(error_type: &str, message: &str) -> ErrorRecord {
        ErrorRecord {
            kind: ErrorKind::UncaughtError,
            error_type: error_type.to_string(),
            message: message.to_string(),
            stack: None,
            component_stack: None,
            source_location: None,
            timestamp: Utc::now().to_rfc3339(),
            page_url: "https://app.example".to_string(),
        }
    }

    fn detector() -> CrashDetector {
        CrashDetector::new(DetectorConfig::default())
    }

    #[test]
    fn classifies_critical_types_and_messages() {
        assert!(is_critical("ReferenceError", "x is not defined"));
        assert!(is_critical("TypeError", "anything"));
        assert!(is_critical("CustomError", "Maximum call stack size exceeded"));
        assert!(is_critical("CustomError", "Loading chunk vendors-3f2 failed"));
        assert!(!is_critical("Warning", "slow render"));
    }

    #[test]
    fn reference_error_triggers_immediately() {
        let mut d = detector();
        let now = Utc::now();
        let decision = d.observe(&record("ReferenceError", "foo is not defined"), now);
        assert!(decision.unwrap().reason.starts_with("reference error"));
    }

    #[test]
    fn component_stack_triggers() {
        let mut d = detector();
        let now = Utc::now();
        let mut r = record("Error", "render blew up badly");
        r.component_stack = Some("\n at CheckoutForm".to_string());
        let decision = d.observe(&r, now).unwrap();
        assert_eq!(decision.reason, "component boundary error");
    }

    #[test]
    fn volume_threshold_triggers_on_third_critical() {
        let mut d = detector();
        let now = Utc::now();
        assert!(d.observe(&record("TypeError", "a.b is broken"), now).is_none());
        assert!(d.observe(&record("TypeError", "c.d is broken"), now).is_none());
        let decision = d
            .observe(&record("TypeError", "e.f is broken"), now)
            .unwrap();
        assert!(decision.reason.contains("3 critical errors"));
        assert_eq!(decision.recent_critical.len(), 3);
    }

    #[test]
    fn old_criticals_fall_out_of_the_window() {
        let mut d = detector();
        let t0 = Utc::now();
        assert!(d.observe(&record("TypeError", "one went wrong"), t0).is_none());
        // 61 seconds later the first error no longer counts.
        let t1 = t0 + Duration::seconds(61);
        assert!(d.observe(&record("TypeError", "two went wrong"), t1).is_none());
        assert!(d.observe(&record("TypeError", "three went wrong"), t1).is_none());
        assert_eq!(d.recent_critical(t1).len(), 2);
    }

    #[test]
    fn cooldown_suppresses_duplicate_crashes() {
        let mut d = detector();
        let t0 = Utc::now();

        // Five reference errors inside one second: exactly one decision.
        let mut decisions = 0;
        for i in 0..5 {
            let at = t0 + Duration::milliseconds(i * 200);
            if d.observe(&record("ReferenceError", "x is not defined"), at).is_some() {
                decisions += 1;
            }
        }
        assert_eq!(decisions, 1);

        // A sixth, 11 seconds after the first, emits a second crash.
        let late = t0 + Duration::seconds(11);
        assert!(d.observe(&record("ReferenceError", "x is not defined"), late).is_some());
    }

    #[test]
    fn trigger_drains_the_critical_window() {
        let mut d = detector();
        let now = Utc::now();
        let decision = d
            .observe(&record("ReferenceError", "x is not defined"), now)
            .unwrap();
        assert_eq!(decision.recent_critical.len(), 1);
        assert!(d.recent_critical(now).is_empty());
    }

    #[test]
    fn external_latch_shares_the_cooldown() {
        let mut d = detector();
        let now = Utc::now();
        d.latch(now);
        assert!(d.observe(&record("ReferenceError", "x is not defined"), now).is_none());
        let later = now + Duration::seconds(11);
        assert!(d.observe(&record("ReferenceError", "x is not defined"), later).is_some());
    }

    #[test]
    fn non_critical_errors_never_accumulate() {
        let mut d = detector();
        let now = Utc::now();
        for _ in 0..10 {
            assert!(d.observe(&record("Warning", "styling looks off today"), now).is_none());
        }
        assert!(d.recent_critical(now).is_empty());
    }
}
