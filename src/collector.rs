// SPDX-License-Identifier: MIT
//! Collector forwarding — fire-and-forget delivery of captured records.
//!
//! Records are queued in memory and flushed to the collector endpoint when
//! the flush interval elapses or the batch fills, whichever comes first.
//! Redaction happens at flush time, on the copies leaving the process.
//! Flush failures are retried briefly, then logged and dropped — forwarding
//! never blocks capture and never surfaces an error to the monitored page.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::CollectorConfig;
use crate::metrics::EngineMetrics;
use crate::records::{CrashEvent, ErrorRecord};
use crate::redact;

/// Flush retry schedule: one retry after a short pause.
const FLUSH_ATTEMPTS: u32 = 2;
const FLUSH_RETRY_DELAY: Duration = Duration::from_millis(300);

// ─── Outbound records ─────────────────────────────────────────────────────────

/// One record leaving the capture boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "recordType", rename_all = "snake_case")]
pub enum OutboundRecord {
    Error(ErrorRecord),
    Crash(Box<CrashEvent>),
}

impl OutboundRecord {
    fn redact(&mut self) {
        match self {
            OutboundRecord::Error(record) => redact::redact_error_record(record),
            OutboundRecord::Crash(event) => redact::redact_crash_event(event),
        }
    }
}

// ─── Client handle ────────────────────────────────────────────────────────────

/// Queues records for the background flush task. Cheap to clone.
#[derive(Clone)]
pub struct CollectorClient {
    tx: mpsc::Sender<OutboundRecord>,
}

impl CollectorClient {
    /// Queue a record for the next flush. Never blocks — drops silently when
    /// the queue is full.
    pub fn send(&self, record: OutboundRecord) {
        let _ = self.tx.try_send(record);
    }
}

// ─── Background flush task ────────────────────────────────────────────────────

/// Spawn the flush task and return its client handle.
///
/// The task flushes on the configured timer or when the batch fills, and once
/// more when the last client handle is dropped. Must be called from within a
/// tokio runtime.
pub fn spawn(
    config: CollectorConfig,
    session_id: String,
    page_url: String,
    metrics: Arc<EngineMetrics>,
) -> CollectorClient {
    let (tx, mut rx) = mpsc::channel::<OutboundRecord>(256);
    let endpoint = config.endpoint.clone().unwrap_or_default();

    tokio::spawn(async move {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build();
        let client = match client {
            Ok(c) => c,
            Err(e) => {
                warn!("collector: failed to build HTTP client: {e:#}");
                return;
            }
        };

        let mut batch: Vec<OutboundRecord> = Vec::new();
        let mut interval =
            tokio::time::interval(Duration::from_secs(config.flush_interval_secs.max(1)));
        interval.tick().await; // skip immediate tick

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(record) => {
                        batch.push(record);
                        if batch.len() >= config.flush_batch_size {
                            flush(&client, &endpoint, &session_id, &page_url, &metrics, &mut batch).await;
                        }
                    }
                    // All client handles dropped — final flush below.
                    None => break,
                },
                _ = interval.tick() => {
                    if !batch.is_empty() {
                        flush(&client, &endpoint, &session_id, &page_url, &metrics, &mut batch).await;
                    }
                }
            }
        }

        if !batch.is_empty() {
            flush(&client, &endpoint, &session_id, &page_url, &metrics, &mut batch).await;
        }
    });

    CollectorClient { tx }
}

async fn flush(
    client: &reqwest::Client,
    endpoint: &str,
    session_id: &str,
    page_url: &str,
    metrics: &EngineMetrics,
    batch: &mut Vec<OutboundRecord>,
) {
    let mut records = std::mem::take(batch);
    if endpoint.is_empty() {
        debug!("collector: no endpoint configured, discarding {} records", records.len());
        return;
    }
    for record in &mut records {
        record.redact();
    }
    let count = records.len();

    let payload = serde_json::json!({
        "sessionId": session_id,
        "pageUrl": page_url,
        "agentVersion": env!("CARGO_PKG_VERSION"),
        "records": records,
    });

    match post_with_retry(client, endpoint, &payload).await {
        Ok(()) => {
            metrics.inc(&metrics.collector_batches_flushed);
            debug!("collector: flushed {count} records");
        }
        Err(reason) => {
            metrics.inc(&metrics.collector_batches_dropped);
            warn!("collector: dropped {count} records: {reason}");
        }
    }
}

async fn post_with_retry(
    client: &reqwest::Client,
    endpoint: &str,
    payload: &serde_json::Value,
) -> Result<(), String> {
    let mut last = String::new();
    let mut delay = FLUSH_RETRY_DELAY;
    for attempt in 1..=FLUSH_ATTEMPTS {
        match client.post(endpoint).json(payload).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => last = format!("server returned {}", resp.status()),
            Err(e) => last = format!("{e:#}"),
        }
        if attempt < FLUSH_ATTEMPTS {
            debug!("collector: flush attempt {attempt} failed ({last}), retrying");
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }
    Err(last)
}
