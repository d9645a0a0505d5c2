//! Crashwatch — in-page error telemetry capture and crash correlation.
//!
//! The crate's core is [`engine::CaptureEngine`]: one context object per
//! monitored page that ingests console output, uncaught errors, unhandled
//! rejections, and observed network calls; filters noise; normalizes
//! heterogeneous error values; correlates failures into crash events; and
//! forwards bounded, redacted bundles to a collector.
//!
//! Hosts wire their interception points to the engine's hooks:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use crashwatch::config::AgentConfig;
//! use crashwatch::engine::{CaptureEngine, ConsoleLevel};
//!
//! let engine = Arc::new(CaptureEngine::new(AgentConfig::default(), page_url));
//! let transport = engine.intercept(real_transport)?; // observe network calls
//! engine.record_console(ConsoleLevel::Error, &args);  // console hook
//! engine.record_page_error(&thrown_value);            // global error hook
//! let mut events = engine.subscribe();                // outbound notifications
//! ```

pub mod collector;
pub mod config;
pub mod detector;
pub mod dom;
pub mod emit;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod filters;
pub mod metrics;
pub mod net;
pub mod normalize;
pub mod records;
pub mod redact;
pub mod replay;
pub mod ring;
pub mod window;

pub use config::AgentConfig;
pub use engine::{BufferSnapshot, CaptureEngine, ConsoleLevel};
pub use error::AgentError;
pub use records::{CrashEvent, ErrorRecord, NetworkRecord, Session};
