//! Library error type.
//!
//! Only boundary operations (config loading, collector setup) surface errors.
//! Capture paths never do: an interception hook that failed internally logs
//! and swallows, because the agent must stay invisible to the page it watches.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("collector endpoint is not configured")]
    CollectorNotConfigured,
}
