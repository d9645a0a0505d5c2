//! Noise-filtering heuristics for captured messages.
//!
//! Capture volume must stay bounded and signal-dense. These classifiers
//! decide which console/page messages are worth turning into records at all.
//! Patterns are anchored and specific rather than broad: letting the odd
//! piece of noise through is cheaper than suppressing a real error.

use once_cell::sync::Lazy;
use regex::Regex;

// ─── Pattern registries ───────────────────────────────────────────────────────

/// Known-noise messages that never become records, regardless of source.
static NOISE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Generic placeholders with no diagnostic content
        Regex::new(r"^Unknown error\.?$").expect("regex: unknown error"),
        Regex::new(r"^\[object Object\]$").expect("regex: object object"),
        // Cross-origin scripts report this instead of a real message
        Regex::new(r"^Script error\.?$").expect("regex: script error"),
        // Browser-internal observer churn, fires on benign layout passes
        Regex::new(r"^ResizeObserver loop (?:limit exceeded|completed with undelivered notifications)")
            .expect("regex: resize observer"),
        // DevTools banners
        Regex::new(r"DevTools failed to load source map").expect("regex: source map"),
        Regex::new(r"Download the React DevTools").expect("regex: react devtools"),
        // UI framework deprecation notices
        Regex::new(r"has been renamed, and is not recommended for use")
            .expect("regex: react rename notice"),
        Regex::new(r"Warning: ReactDOM\.render is no longer supported")
            .expect("regex: reactdom render"),
        Regex::new(r"is deprecated and will be removed").expect("regex: deprecation"),
        // Autoplay/permission policy chatter
        Regex::new(r"play\(\) failed because the user didn't interact")
            .expect("regex: autoplay"),
    ]
});

/// Dev-tooling chatter that additionally pollutes the console stream.
static CONSOLE_NOISE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Module-bundler hot-reload diagnostics
        Regex::new(r"^\[(?:HMR|WDS|vite|webpack-dev-server)\]").expect("regex: bundler tag"),
        Regex::new(r"(?i)hot[ -]?(?:module )?(?:update|replacement|reload)")
            .expect("regex: hot reload"),
        Regex::new(r"App is running in development mode").expect("regex: dev mode banner"),
        // Styled-log directives (`console.log('%c...', 'color: ...')`)
        Regex::new(r"%c").expect("regex: styled log"),
    ]
});

/// Error class names that always count as meaningful.
const REAL_ERROR_TYPES: &[&str] = &[
    "TypeError",
    "ReferenceError",
    "SyntaxError",
    "RangeError",
    "URIError",
    "EvalError",
    "AggregateError",
    "InternalError",
    "DOMException",
    "NetworkError",
    "AbortError",
    "ChunkLoadError",
];

// ─── Classifiers ──────────────────────────────────────────────────────────────

/// True if `message` should never become a record.
///
/// Rejects empty/whitespace-only strings, strings under 3 characters, and
/// anything on the known-noise denylist.
pub fn should_ignore(message: &str) -> bool {
    let trimmed = message.trim();
    if trimmed.len() < 3 {
        return true;
    }
    NOISE_PATTERNS.iter().any(|p| p.is_match(trimmed))
}

/// Superset of [`should_ignore`] for console-sourced messages: also drops
/// bundler/hot-reload diagnostics and styled-log directives.
pub fn should_ignore_console(message: &str) -> bool {
    if should_ignore(message) {
        return true;
    }
    let trimmed = message.trim();
    CONSOLE_NOISE_PATTERNS.iter().any(|p| p.is_match(trimmed))
}

/// True if the pair (type, message) carries real diagnostic signal.
///
/// Either side is sufficient: a recognized error class name, OR a
/// non-trivial message (more than 5 characters and not on the denylist).
pub fn is_real_error(error_type: &str, message: &str) -> bool {
    if REAL_ERROR_TYPES.contains(&error_type) {
        return true;
    }
    message.trim().chars().count() > 5 && !should_ignore(message)
}
