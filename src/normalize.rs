//! Normalization of heterogeneous thrown values.
//!
//! Pages throw anything: `Error` objects, `ErrorEvent`s, `DOMException`s,
//! framework boundary payloads, wrapped rejections, plain objects, bare
//! strings. Everything reaches the engine as a JSON value and is reduced to
//! one canonical [`ErrorInfo`] by an ordered chain of shape predicates —
//! first match wins, and there is always a fallback, so normalization never
//! fails.

use serde_json::Value;

use crate::records::{truncate_chars, SourceLocation, MAX_MESSAGE_CHARS, MAX_STACK_CHARS};

/// Recursion cap for nested/self-referential error chains.
const MAX_DEPTH: usize = 3;

/// Canonical form of one thrown value, before it becomes an [`crate::records::ErrorRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    pub error_type: String,
    pub message: String,
    pub stack: Option<String>,
    pub component_stack: Option<String>,
    pub source_location: Option<SourceLocation>,
    /// One unwrapped level of an `Error.cause` chain.
    pub cause: Option<Box<ErrorInfo>>,
}

impl ErrorInfo {
    fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: truncate_chars(&message.into(), MAX_MESSAGE_CHARS),
            stack: None,
            component_stack: None,
            source_location: None,
            cause: None,
        }
    }

    fn with_stack(mut self, stack: Option<String>) -> Self {
        self.stack = stack.map(|s| truncate_chars(&s, MAX_STACK_CHARS));
        self
    }
}

// ─── Shape predicates ─────────────────────────────────────────────────────────

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Native `Error` shape: `name` + `message` + `stack`.
fn is_error_like(value: &Value) -> bool {
    str_field(value, "name").is_some()
        && value.get("message").is_some()
        && str_field(value, "stack").is_some()
}

/// Browser `ErrorEvent` shape: `message` + nested `error` + `filename`.
fn is_error_event_like(value: &Value) -> bool {
    value.get("message").is_some()
        && value.get("error").is_some()
        && str_field(value, "filename").is_some()
}

/// `DOMException` shape: `name` + `message` + numeric `code`.
fn is_dom_exception_like(value: &Value) -> bool {
    str_field(value, "name").is_some()
        && str_field(value, "message").is_some()
        && value.get("code").map(Value::is_u64).unwrap_or(false)
}

/// UI error-boundary payload: carries a `componentStack`.
fn has_component_stack(value: &Value) -> bool {
    str_field(value, "componentStack").is_some()
}

// ─── Extraction ───────────────────────────────────────────────────────────────

/// Reduce an arbitrary captured value to a canonical [`ErrorInfo`].
///
/// Dispatch is by shape, in priority order; unmatched objects fall through to
/// best-effort stringification. Recursion (cause chains, wrapped rejections)
/// is capped at depth 3 and returns a sentinel record beyond that.
pub fn extract_error_info(value: &Value, depth: usize) -> ErrorInfo {
    if depth >= MAX_DEPTH {
        return ErrorInfo::new("Unknown", "max error depth reached");
    }

    match value {
        Value::Null => ErrorInfo::new("null", "null"),

        Value::Object(_) => {
            if is_error_like(value) {
                let name = str_field(value, "name").unwrap_or("Error").to_string();
                let message = str_field(value, "message").unwrap_or_default().to_string();
                let mut info = ErrorInfo::new(name, message)
                    .with_stack(str_field(value, "stack").map(str::to_string));
                if let Some(cause) = value.get("cause") {
                    info.cause = Some(Box::new(extract_error_info(cause, depth + 1)));
                }
                info
            } else if is_error_event_like(value) {
                let nested = value
                    .get("error")
                    .map(|e| extract_error_info(e, depth + 1))
                    .unwrap_or_else(|| ErrorInfo::new("Error", ""));
                let message = str_field(value, "message")
                    .map(str::to_string)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| nested.message.clone());
                let mut info = ErrorInfo::new(nested.error_type, message).with_stack(nested.stack);
                info.source_location = Some(SourceLocation {
                    file: str_field(value, "filename").unwrap_or_default().to_string(),
                    line: value.get("lineno").and_then(Value::as_u64).unwrap_or(0) as u32,
                    column: value.get("colno").and_then(Value::as_u64).unwrap_or(0) as u32,
                });
                info
            } else if is_dom_exception_like(value) {
                let name = str_field(value, "name").unwrap_or("DOMException");
                let message = str_field(value, "message").unwrap_or_default();
                let code = value.get("code").and_then(Value::as_u64).unwrap_or(0);
                ErrorInfo::new(name, format!("{message} (code {code})"))
            } else if has_component_stack(value) {
                let nested = value.get("error").map(|e| extract_error_info(e, depth + 1));
                let message = str_field(value, "message")
                    .map(str::to_string)
                    .or_else(|| nested.as_ref().map(|n| n.message.clone()))
                    .unwrap_or_else(|| "component render error".to_string());
                let mut info = ErrorInfo::new("ReactError", message)
                    .with_stack(nested.and_then(|n| n.stack));
                info.component_stack = str_field(value, "componentStack")
                    .map(|s| truncate_chars(s, MAX_STACK_CHARS));
                info
            } else if let Some(message) = str_field(value, "message") {
                let name = str_field(value, "name").unwrap_or("Error").to_string();
                ErrorInfo::new(name, message.to_string())
                    .with_stack(str_field(value, "stack").map(str::to_string))
            } else if let Some(inner) = value.get("error").or_else(|| value.get("reason")) {
                extract_error_info(inner, depth + 1)
            } else {
                // Best-effort JSON serialization; an empty object carries nothing.
                match serde_json::to_string(value) {
                    Ok(json) if json != "{}" => ErrorInfo::new("Object", json),
                    _ => ErrorInfo::new("Object", "[object Object]"),
                }
            }
        }

        Value::String(s) => ErrorInfo::new("string", s.clone()),
        Value::Number(n) => ErrorInfo::new("number", n.to_string()),
        Value::Bool(b) => ErrorInfo::new("boolean", b.to_string()),
        Value::Array(_) => {
            let json = serde_json::to_string(value).unwrap_or_else(|_| "[...]".to_string());
            ErrorInfo::new("Array", json)
        }
    }
}

/// Join multiple logged arguments into one message string.
///
/// Strings pass through untouched, objects with a `message` contribute it,
/// anything else is compact JSON. The first stack-bearing argument's stack
/// text is appended on its own line.
pub fn format_args(args: &[Value]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(args.len());
    let mut stack: Option<&str> = None;

    for arg in args {
        match arg {
            Value::String(s) => parts.push(s.clone()),
            Value::Object(_) => {
                if let Some(message) = str_field(arg, "message") {
                    parts.push(message.to_string());
                } else {
                    parts.push(serde_json::to_string(arg).unwrap_or_else(|_| "{}".to_string()));
                }
                if stack.is_none() {
                    stack = str_field(arg, "stack");
                }
            }
            other => parts.push(other.to_string()),
        }
    }

    let mut out = parts.join(" ");
    if let Some(stack) = stack {
        out.push('\n');
        out.push_str(&truncate_chars(stack, MAX_STACK_CHARS));
    }
    truncate_chars(&out, MAX_MESSAGE_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_value() {
        let info = extract_error_info(&Value::Null, 0);
        assert_eq!(info.error_type, "null");
        assert_eq!(info.message, "null");
    }

    #[test]
    fn native_error_with_cause() {
        let value = json!({
            "name": "TypeError",
            "message": "x.map is not a function",
            "stack": "TypeError: x.map is not a function\n  at render (app.js:3:1)",
            "cause": {
                "name": "RangeError",
                "message": "index out of bounds",
                "stack": "RangeError\n  at pick (util.js:9:2)"
            }
        });
        let info = extract_error_info(&value, 0);
        assert_eq!(info.error_type, "TypeError");
        assert_eq!(info.message, "x.map is not a function");
        assert!(info.stack.as_deref().unwrap().contains("app.js:3:1"));
        let cause = info.cause.expect("cause unwrapped");
        assert_eq!(cause.error_type, "RangeError");
    }

    #[test]
    fn error_event_shape_extracts_location() {
        let value = json!({
            "message": "Uncaught ReferenceError: foo is not defined",
            "filename": "https://app.example/static/main.js",
            "lineno": 120,
            "colno": 9,
            "error": {
                "name": "ReferenceError",
                "message": "foo is not defined",
                "stack": "ReferenceError: foo is not defined"
            }
        });
        let info = extract_error_info(&value, 0);
        assert_eq!(info.error_type, "ReferenceError");
        let loc = info.source_location.expect("location");
        assert_eq!(loc.line, 120);
        assert_eq!(loc.column, 9);
    }

    #[test]
    fn dom_exception_shape() {
        let value = json!({
            "name": "QuotaExceededError",
            "message": "The quota has been exceeded.",
            "code": 22
        });
        let info = extract_error_info(&value, 0);
        assert_eq!(info.error_type, "QuotaExceededError");
        assert!(info.message.contains("code 22"));
    }

    #[test]
    fn component_stack_shape_is_tagged() {
        let value = json!({
            "componentStack": "\n    at CheckoutForm\n    at App",
            "error": {
                "name": "TypeError",
                "message": "Cannot read properties of undefined",
                "stack": "TypeError: Cannot read properties of undefined"
            }
        });
        let info = extract_error_info(&value, 0);
        assert_eq!(info.error_type, "ReactError");
        assert!(info.component_stack.as_deref().unwrap().contains("CheckoutForm"));
        assert!(info.stack.is_some());
    }

    #[test]
    fn wrapped_rejection_unwraps_reason() {
        let value = json!({
            "reason": {
                "name": "AbortError",
                "message": "The operation was aborted.",
                "stack": "AbortError"
            }
        });
        let info = extract_error_info(&value, 0);
        assert_eq!(info.error_type, "AbortError");
    }

    #[test]
    fn depth_bound_terminates_with_sentinel() {
        // Four levels of wrapping — one past the cap.
        let value = json!({
            "error": { "error": { "error": { "error": { "message": "deep" } } } }
        });
        let info = extract_error_info(&value, 0);
        assert_eq!(info.error_type, "Unknown");
        assert_eq!(info.message, "max error depth reached");
    }

    #[test]
    fn empty_object_falls_back_to_placeholder() {
        let info = extract_error_info(&json!({}), 0);
        assert_eq!(info.error_type, "Object");
        assert_eq!(info.message, "[object Object]");
    }

    #[test]
    fn plain_object_is_serialized() {
        let info = extract_error_info(&json!({"status": "failed", "retries": 3}), 0);
        assert_eq!(info.error_type, "Object");
        assert!(info.message.contains("\"retries\":3"));
    }

    #[test]
    fn primitives_keep_their_type_tag() {
        assert_eq!(extract_error_info(&json!("boom"), 0).error_type, "string");
        assert_eq!(extract_error_info(&json!(42), 0).message, "42");
        assert_eq!(extract_error_info(&json!(false), 0).error_type, "boolean");
    }

    #[test]
    fn format_args_joins_and_appends_first_stack() {
        let args = vec![
            json!("request failed:"),
            json!({
                "name": "TypeError",
                "message": "x is null",
                "stack": "TypeError: x is null\n  at f (a.js:1:1)"
            }),
            json!({"message": "second", "stack": "ignored stack"}),
        ];
        let out = format_args(&args);
        assert!(out.starts_with("request failed: x is null second"));
        assert!(out.contains("at f (a.js:1:1)"));
        assert!(!out.contains("ignored stack"));
    }

    #[test]
    fn format_args_is_bounded() {
        let long = "a".repeat(3 * MAX_MESSAGE_CHARS);
        let out = format_args(&[Value::String(long)]);
        assert!(out.chars().count() <= MAX_MESSAGE_CHARS + 1);
    }
}
