// SPDX-License-Identifier: MIT
//! In-process engine counters.
//!
//! All counters are `AtomicU64` incremented inline on the capture paths — no
//! locks, no external library. Consumers read a point-in-time snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

/// Capture-engine counters shared across all hooks.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Console messages turned into records.
    pub console_captured: AtomicU64,
    /// Uncaught errors and rejections turned into records.
    pub page_errors_captured: AtomicU64,
    /// Messages dropped by the noise filters.
    pub noise_suppressed: AtomicU64,
    /// Network calls observed through the interceptor.
    pub network_observed: AtomicU64,
    /// Observed calls classified as failures.
    pub network_errors: AtomicU64,
    /// Crash events emitted (both detection methods).
    pub crashes_emitted: AtomicU64,
    /// Record batches delivered to the collector.
    pub collector_batches_flushed: AtomicU64,
    /// Record batches dropped after flush failure.
    pub collector_batches_dropped: AtomicU64,
}

/// Point-in-time copy of [`EngineMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub console_captured: u64,
    pub page_errors_captured: u64,
    pub noise_suppressed: u64,
    pub network_observed: u64,
    pub network_errors: u64,
    pub crashes_emitted: u64,
    pub collector_batches_flushed: u64,
    pub collector_batches_dropped: u64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            console_captured: self.console_captured.load(Ordering::Relaxed),
            page_errors_captured: self.page_errors_captured.load(Ordering::Relaxed),
            noise_suppressed: self.noise_suppressed.load(Ordering::Relaxed),
            network_observed: self.network_observed.load(Ordering::Relaxed),
            network_errors: self.network_errors.load(Ordering::Relaxed),
            crashes_emitted: self.crashes_emitted.load(Ordering::Relaxed),
            collector_batches_flushed: self.collector_batches_flushed.load(Ordering::Relaxed),
            collector_batches_dropped: self.collector_batches_dropped.load(Ordering::Relaxed),
        }
    }
}
