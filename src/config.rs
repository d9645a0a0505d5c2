//! Agent configuration.
//!
//! Every section deserializes with defaults, so an empty TOML file (or no
//! file at all) yields a fully working engine. The detector thresholds are
//! deliberately configuration rather than constants — they are tuned
//! heuristics, and hosts monitoring chatty pages will want to adjust them.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

// ─── BufferConfig ─────────────────────────────────────────────────────────────

/// Ring-buffer capacities, per record kind (`[buffers]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Console errors and warnings. Default: 100.
    pub console_capacity: usize,
    /// Uncaught errors and unhandled rejections. Default: 50.
    pub page_capacity: usize,
    /// Failed network calls. Default: 50.
    pub api_error_capacity: usize,
    /// All settled network calls. Default: 100.
    pub api_request_capacity: usize,
    /// Emitted crash events. Default: 20.
    pub crash_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            console_capacity: 100,
            page_capacity: 50,
            api_error_capacity: 50,
            api_request_capacity: 100,
            crash_capacity: 20,
        }
    }
}

// ─── WindowConfig ─────────────────────────────────────────────────────────────

/// Sliding API window sizing (`[window]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Successful calls retained as "before" context. Default: 3.
    pub before_count: usize,
    /// Calls persisted as "after" context following a failure. Default: 3.
    pub after_count: usize,
    /// Cap on the persisted flight-recorder trace. Default: 150.
    pub persisted_cap: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            before_count: 3,
            after_count: 3,
            persisted_cap: 150,
        }
    }
}

// ─── DetectorConfig ───────────────────────────────────────────────────────────

/// Crash-detector thresholds (`[detector]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Recency window for accumulating critical errors, seconds. Default: 60.
    pub critical_window_secs: u64,
    /// Critical-error count that triggers a crash on its own. Default: 3.
    pub volume_threshold: usize,
    /// Minimum time between two crash emissions, seconds. Default: 10.
    pub cooldown_secs: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            critical_window_secs: 60,
            volume_threshold: 3,
            cooldown_secs: 10,
        }
    }
}

// ─── DomWatchConfig ───────────────────────────────────────────────────────────

/// DOM crash watcher scheduling (`[dom]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DomWatchConfig {
    /// Post-load check delays, milliseconds. Default: 500, 2000, 5000.
    pub check_delays_ms: Vec<u64>,
    /// Debounce applied to mutation-triggered checks. Default: 100 ms.
    pub debounce_ms: u64,
    /// Minimum visible text length for a fatal-error marker. Default: 10.
    pub min_text_len: usize,
}

impl Default for DomWatchConfig {
    fn default() -> Self {
        Self {
            check_delays_ms: vec![500, 2000, 5000],
            debounce_ms: 100,
            min_text_len: 10,
        }
    }
}

// ─── CollectorConfig ──────────────────────────────────────────────────────────

/// Collector forwarding (`[collector]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Analysis endpoint URL. None = forwarding disabled, capture-only.
    pub endpoint: Option<String>,
    /// Flush on this timer even if the batch is small. Default: 30 s.
    pub flush_interval_secs: u64,
    /// Flush as soon as this many records accumulate. Default: 20.
    pub flush_batch_size: usize,
    /// Per-request timeout for collector POSTs. Default: 10 s.
    pub request_timeout_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            flush_interval_secs: 30,
            flush_batch_size: 20,
            request_timeout_secs: 10,
        }
    }
}

// ─── AgentConfig ──────────────────────────────────────────────────────────────

/// Top-level configuration for one capture engine instance.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    pub buffers: BufferConfig,
    pub window: WindowConfig,
    pub detector: DetectorConfig,
    pub dom: DomWatchConfig,
    pub collector: CollectorConfig,
}

impl AgentConfig {
    /// Load from a TOML file. Missing sections fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, AgentError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}
