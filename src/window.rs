// SPDX-License-Identifier: MIT
//! Sliding API window — flight-recorder context around network failures.
//!
//! Keeping all traffic would be unbounded; keeping only failures would lose
//! the context that explains them. The window holds the last few successful
//! calls in a small ring; when a failure arrives, that ring is flushed to the
//! persisted trace as the "before" requests, the failure itself is persisted,
//! and the next few calls are persisted as the "after" requests. The persisted
//! trace itself is capped, oldest-first.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::records::NetworkRecord;

/// Bounded before/after capture around each failing call.
#[derive(Debug)]
pub struct SlidingApiWindow {
    /// Candidate "before" calls, awaiting the next failure.
    buffer: VecDeque<NetworkRecord>,
    before_count: usize,
    after_count: usize,
    /// How many more settled calls get persisted as "after" context.
    pending_after: usize,
    persisted: VecDeque<NetworkRecord>,
    persisted_cap: usize,
    last_error_at: Option<DateTime<Utc>>,
}

impl SlidingApiWindow {
    pub fn new(before_count: usize, after_count: usize, persisted_cap: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(before_count),
            before_count,
            after_count,
            pending_after: 0,
            persisted: VecDeque::new(),
            persisted_cap: persisted_cap.max(1),
            last_error_at: None,
        }
    }

    /// Feed one settled call through the window.
    pub fn observe(&mut self, record: NetworkRecord, now: DateTime<Utc>) {
        if record.is_error {
            // Flush the held "before" calls, then the failure itself.
            while let Some(before) = self.buffer.pop_front() {
                self.persist(before);
            }
            self.persist(record);
            self.pending_after = self.after_count;
            self.last_error_at = Some(now);
        } else if self.pending_after > 0 {
            self.persist(record);
            self.pending_after -= 1;
        } else {
            self.buffer.push_back(record);
            while self.buffer.len() > self.before_count {
                self.buffer.pop_front();
            }
        }
    }

    fn persist(&mut self, record: NetworkRecord) {
        if self.persisted.len() == self.persisted_cap {
            self.persisted.pop_front();
        }
        self.persisted.push_back(record);
    }

    /// The persisted before/failure/after trace, oldest first.
    pub fn trace(&self) -> Vec<NetworkRecord> {
        self.persisted.iter().cloned().collect()
    }

    pub fn last_error_at(&self) -> Option<DateTime<Utc>> {
        self.last_error_at
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.persisted.clear();
        self.pending_after = 0;
        self.last_error_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn call(url: &str, status: u16) -> NetworkRecord {
        NetworkRecord {
            method: "GET".to_string(),
            url: url.to_string(),
            status,
            status_text: String::new(),
            duration_ms: 1,
            request_headers: BTreeMap::new(),
            request_body: None,
            response_headers: BTreeMap::new(),
            response_body: None,
            error_details: None,
            correlation_id: None,
            correlation_header: None,
            failure_kind: None,
            is_error: status == 0 || status >= 400,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    fn urls(records: &[NetworkRecord]) -> Vec<&str> {
        records.iter().map(|r| r.url.as_str()).collect()
    }

    #[test]
    fn persists_before_failure_after_in_order() {
        let mut window = SlidingApiWindow::new(3, 3, 150);
        let now = Utc::now();

        for i in 1..=3 {
            window.observe(call(&format!("/ok{i}"), 200), now);
        }
        window.observe(call("/boom", 500), now);
        for i in 1..=3 {
            window.observe(call(&format!("/after{i}"), 200), now);
        }
        // A success beyond the after-window is buffered, not persisted.
        window.observe(call("/buffered", 200), now);

        let trace = window.trace();
        assert_eq!(
            urls(&trace),
            vec!["/ok1", "/ok2", "/ok3", "/boom", "/after1", "/after2", "/after3"]
        );
        assert!(window.last_error_at().is_some());
    }

    #[test]
    fn before_ring_keeps_only_most_recent() {
        let mut window = SlidingApiWindow::new(3, 3, 150);
        let now = Utc::now();

        for i in 1..=6 {
            window.observe(call(&format!("/ok{i}"), 200), now);
        }
        window.observe(call("/boom", 0), now);

        assert_eq!(urls(&window.trace()), vec!["/ok4", "/ok5", "/ok6", "/boom"]);
    }

    #[test]
    fn back_to_back_failures_each_get_after_context() {
        let mut window = SlidingApiWindow::new(3, 2, 150);
        let now = Utc::now();

        window.observe(call("/boom1", 500), now);
        window.observe(call("/a1", 200), now);
        window.observe(call("/boom2", 502), now);
        window.observe(call("/a2", 200), now);
        window.observe(call("/a3", 200), now);
        window.observe(call("/buffered", 200), now);

        assert_eq!(
            urls(&window.trace()),
            vec!["/boom1", "/a1", "/boom2", "/a2", "/a3"]
        );
    }

    #[test]
    fn persisted_trace_is_capped_oldest_first() {
        let mut window = SlidingApiWindow::new(1, 0, 4);
        let now = Utc::now();

        for i in 1..=8 {
            window.observe(call(&format!("/boom{i}"), 500), now);
        }

        let trace = window.trace();
        assert_eq!(trace.len(), 4);
        assert_eq!(urls(&trace), vec!["/boom5", "/boom6", "/boom7", "/boom8"]);
    }

    #[test]
    fn clear_resets_everything() {
        let mut window = SlidingApiWindow::new(3, 3, 150);
        let now = Utc::now();
        window.observe(call("/boom", 500), now);
        window.clear();
        assert!(window.trace().is_empty());
        assert!(window.last_error_at().is_none());
    }
}
