//! Error mapping for provider HTTP responses
//!
//! Both providers report failures as JSON with an `error.message` field
//! (OpenAI: `{"error": {"message", "type", "code"}}`, Anthropic:
//! `{"type": "error", "error": {"type", "message"}}`).

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;

use super::ProviderError;

const MAX_BODY_CHARS: usize = 300;

/// Maps a non-success response to a `ProviderError`
pub fn map_http_error(status: StatusCode, headers: &HeaderMap, body: &str) -> ProviderError {
    let message = extract_message(body);
    let code = status.as_u16();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Authentication {
            status: code,
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            status: code,
            retry_after: retry_after(headers, body),
            message,
        },
        // includes Anthropic's 529 overloaded
        s if s.is_server_error() => ProviderError::Server {
            status: code,
            message,
        },
        _ => ProviderError::Http {
            status: code,
            message,
        },
    }
}

/// Whether a response status is worth retrying
pub fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

fn extract_message(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let message = parsed.as_ref().and_then(|json| {
        json.get("error")
            .and_then(|error| error.get("message").or(Some(error)))
            .or_else(|| json.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    match message {
        Some(message) => message,
        None if body.trim().is_empty() => "empty response body".to_string(),
        None => truncate(body),
    }
}

fn retry_after(headers: &HeaderMap, body: &str) -> Option<u64> {
    let from_header = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok());

    let from_body = || {
        let json: Value = serde_json::from_str(body).ok()?;
        json["error"]["retry_after"]
            .as_f64()
            .or_else(|| json["retry_after"].as_f64())
    };

    from_header.or_else(from_body).map(|secs| secs.max(0.0).ceil() as u64)
}

fn truncate(body: &str) -> String {
    if body.chars().count() > MAX_BODY_CHARS {
        let cut: String = body.chars().take(MAX_BODY_CHARS).collect();
        format!("{}...", cut)
    } else {
        body.to_string()
    }
}
