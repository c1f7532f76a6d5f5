//! # Error Display
//!
//! Turns a `StructuredError` into text fit for the person chatting with the
//! assistant. The user-facing sentence depends only on the error type (and
//! breaker state); technical detail is appended only when the caller has
//! elevated privileges, and is scrubbed of credentials first.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{ErrorType, Severity, StructuredError};

// (pattern, replacement)
static SENSITIVE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (
            r#"(?i)(api[_-]?key|x-api-key|token|secret|password)["']?\s*[=:]\s*["']?[^"'\s,]+"#,
            "${1}=[REDACTED]",
        ),
        (r"(?i)(bearer)\s+[a-zA-Z0-9._\-]+", "${1} [REDACTED]"),
        (r"\bsk-[A-Za-z0-9_\-]{8,}", "[REDACTED]"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

const SENSITIVE_KEYS: [&str; 6] = ["key", "token", "secret", "password", "auth", "credential"];

/// Options for [`format_for_display`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayOptions {
    /// Append error id, code and sanitized message. Only for privileged viewers.
    pub include_technical: bool,
}

/// Human-readable sentence for an error, chosen by its type
pub fn user_message(error: &StructuredError) -> &'static str {
    if error.circuit_breaker_tripped() {
        return "The AI service is temporarily paused after repeated failures. \
                Please try again in a few minutes.";
    }

    match error.error_type {
        ErrorType::Api => "The AI service is currently unavailable. Please try again later.",
        ErrorType::Tool => "The assistant could not complete a requested action.",
        ErrorType::Agent => "The assistant could not process your request.",
        ErrorType::Database => "There was a problem accessing stored data.",
        ErrorType::Permission => "You do not have permission to perform this action.",
        ErrorType::Validation => "The request was invalid. Please check your input and try again.",
        ErrorType::Timeout => "The request took too long to complete. Please try again.",
        ErrorType::Resource => "The system is busy right now. Please try again shortly.",
        ErrorType::Network => "A network problem prevented the request from completing.",
        ErrorType::System | ErrorType::Other(_) => match error.severity {
            Severity::Critical => {
                "A critical error occurred. Please contact the site administrator."
            }
            _ => "An unexpected error occurred. Please try again later.",
        },
    }
}

/// Formats an error for display at the chat boundary
pub fn format_for_display(error: &StructuredError, options: DisplayOptions) -> String {
    let message = user_message(error);
    if !options.include_technical {
        return message.to_string();
    }

    format!(
        "{} [Error ID: {}] {}/{}: {}",
        message,
        error.id,
        error.error_type,
        error.code,
        sanitize_message(&error.message)
    )
}

/// Redacts credentials and bearer tokens from free text
pub fn sanitize_message(message: &str) -> String {
    SENSITIVE_PATTERNS
        .iter()
        .fold(message.to_string(), |text, (pattern, replacement)| {
            pattern.replace_all(&text, *replacement).into_owned()
        })
}

/// Copy of the error with its message scrubbed and sensitive context keys removed
pub fn sanitize_error(error: &StructuredError) -> StructuredError {
    let mut sanitized = error.clone();
    sanitized.message = sanitize_message(&error.message);
    sanitized.context = error
        .context
        .iter()
        .filter(|(key, _)| !is_sensitive_key(key))
        .map(|(key, value)| match value.as_str() {
            Some(text) => (key.clone(), serde_json::Value::String(sanitize_message(text))),
            None => (key.clone(), value.clone()),
        })
        .collect();
    sanitized
}

fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|sensitive| key.contains(sensitive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CIRCUIT_BREAKER_TRIPPED;

    #[test]
    fn test_message_follows_type() {
        let api = StructuredError::new(ErrorType::Api, "server_error", "502 from upstream");
        assert_eq!(
            format_for_display(&api, DisplayOptions::default()),
            "The AI service is currently unavailable. Please try again later."
        );

        let validation =
            StructuredError::new(ErrorType::Validation, "empty_messages", "no messages");
        assert!(user_message(&validation).starts_with("The request was invalid"));
    }

    #[test]
    fn test_tripped_breaker_message() {
        let error = StructuredError::new(ErrorType::Api, "circuit_open", "blocked")
            .context(CIRCUIT_BREAKER_TRIPPED, true);
        assert!(user_message(&error).contains("temporarily paused"));
    }

    #[test]
    fn test_technical_detail_is_gated_and_sanitized() {
        let error = StructuredError::new(
            ErrorType::Api,
            "authentication_failed",
            "Incorrect API key provided: sk-abcdef1234567890",
        );

        let plain = format_for_display(&error, DisplayOptions::default());
        assert!(!plain.contains("authentication_failed"));

        let technical = format_for_display(
            &error,
            DisplayOptions {
                include_technical: true,
            },
        );
        assert!(technical.contains(&error.id.to_string()));
        assert!(technical.contains("authentication_failed"));
        assert!(!technical.contains("sk-abcdef1234567890"));
    }

    #[test]
    fn test_sanitize_message() {
        assert_eq!(
            sanitize_message("request failed: api_key=abc123"),
            "request failed: api_key=[REDACTED]"
        );
        assert_eq!(
            sanitize_message("Authorization: Bearer abc.def-ghi"),
            "Authorization: Bearer [REDACTED]"
        );
        assert_eq!(sanitize_message("nothing to hide"), "nothing to hide");
    }

    #[test]
    fn test_sanitize_error_drops_sensitive_context() {
        let error = StructuredError::new(ErrorType::Api, "http_error", "bad request")
            .context("api_key", "sk-live-1234567890")
            .context("provider", "openai")
            .context("status", 400);

        let sanitized = sanitize_error(&error);
        assert!(!sanitized.context.contains_key("api_key"));
        assert_eq!(sanitized.context.get("provider"), Some(&serde_json::json!("openai")));
        assert_eq!(sanitized.context.get("status"), Some(&serde_json::json!(400)));
        assert_eq!(sanitized.id, error.id);
    }
}
