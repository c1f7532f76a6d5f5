//! Provider errors and their classification into `StructuredError`s.
//!
//! Provider clients fail with a `ProviderError`. Before a failure enters
//! recovery it is classified: turned into an `api` typed `StructuredError`
//! for the provider's component and recorded with the `RecoveryService`,
//! which is where it counts towards that provider's circuit breaker.

use recovery_rs::{ErrorType, RecoveryService, Severity, StructuredError};
use thiserror::Error;

use crate::types::ProviderId;

pub mod mapping;

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Why a single provider call failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// No API key configured
    #[error("{provider} API key is not configured")]
    MissingCredential { provider: ProviderId },

    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Connection refused, DNS failure, reset
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded ({status}): {message}")]
    RateLimited {
        status: u16,
        message: String,
        retry_after: Option<u64>,
    },

    /// 401/403
    #[error("Authentication failed ({status}): {message}")]
    Authentication { status: u16, message: String },

    /// 5xx
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Any other non-success status
    #[error("HTTP error ({status}): {message}")]
    Http { status: u16, message: String },

    /// The body could not be read as the provider's response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Client construction or request building failed
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Stable error code carried into the `StructuredError`
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::MissingCredential { .. } => "missing_api_key",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::Network(_) => "network_error",
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::Authentication { .. } => "authentication_failed",
            ProviderError::Server { .. } => "server_error",
            ProviderError::Http { .. } => "http_error",
            ProviderError::InvalidResponse(_) => "invalid_response",
            ProviderError::Internal(_) => "client_error",
        }
    }

    /// Whether the same request could succeed if sent again
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Timeout(_)
            | ProviderError::Network(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Server { .. } => true,
            ProviderError::Http { status, .. } => mapping::is_retryable_status(*status),
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::RateLimited { status, .. }
            | ProviderError::Authentication { status, .. }
            | ProviderError::Server { status, .. }
            | ProviderError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_redirect() {
            ProviderError::Network(err.to_string())
        } else if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            ProviderError::Internal(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::InvalidResponse(err.to_string())
    }
}

/// Converts a provider failure into an `api` error for `provider` and
/// records it against that provider's breaker.
pub fn classify(
    recovery: &RecoveryService,
    provider: ProviderId,
    error: &ProviderError,
) -> StructuredError {
    let mut structured = StructuredError::new(ErrorType::Api, error.code(), error.to_string())
        .severity(Severity::Error)
        .context("provider", provider.as_str())
        .context("retryable", error.is_retryable());

    if let Some(status) = error.status() {
        structured = structured.context("status", status);
    }
    if let ProviderError::RateLimited {
        retry_after: Some(seconds),
        ..
    } = error
    {
        structured = structured.context("retry_after", seconds);
    }

    recovery.record_error(structured, provider.as_str())
}

/// Error for a provider call that panicked instead of returning a result.
/// Recorded like any classified failure so it follows the same recovery path.
pub fn exception_error(
    recovery: &RecoveryService,
    provider: ProviderId,
    detail: &str,
) -> StructuredError {
    let structured = StructuredError::new(
        ErrorType::Api,
        "api_exception",
        format!("Unexpected failure calling {}: {}", provider, detail),
    )
    .severity(Severity::Error)
    .context("provider", provider.as_str())
    .context("retryable", false);

    recovery.record_error(structured, provider.as_str())
}

/// Error returned without calling `provider` because its breaker is open.
/// Not recorded: no call was made, so there is no new failure to count.
pub fn circuit_open_error(provider: ProviderId) -> StructuredError {
    StructuredError::new(
        ErrorType::Api,
        "circuit_open",
        format!("{} is temporarily disabled after repeated failures", provider),
    )
    .context("provider", provider.as_str())
    .context(recovery_rs::types::COMPONENT, provider.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(ProviderError::Timeout("slow".into()).is_retryable());
        assert!(ProviderError::Server {
            status: 502,
            message: "bad gateway".into()
        }
        .is_retryable());
        assert!(ProviderError::Http {
            status: 408,
            message: "timeout".into()
        }
        .is_retryable());
        assert!(!ProviderError::Http {
            status: 422,
            message: "bad".into()
        }
        .is_retryable());
        assert!(!ProviderError::MissingCredential {
            provider: ProviderId::Anthropic
        }
        .is_retryable());
        assert!(!ProviderError::InvalidResponse("eof".into()).is_retryable());
    }

    #[test]
    fn test_classify_builds_api_error() {
        let recovery = RecoveryService::new();
        let error = ProviderError::RateLimited {
            status: 429,
            message: "slow down".into(),
            retry_after: Some(20),
        };

        let structured = classify(&recovery, ProviderId::OpenAi, &error);

        assert_eq!(structured.error_type, ErrorType::Api);
        assert_eq!(structured.severity, Severity::Error);
        assert_eq!(structured.code, "rate_limited");
        assert_eq!(structured.component(), Some("openai"));
        assert_eq!(structured.context["status"], 429);
        assert_eq!(structured.context["retry_after"], 20);
        assert_eq!(structured.context["retryable"], true);
        assert_eq!(recovery.error_count(&ErrorType::Api, "openai"), 1);
    }

    #[test]
    fn test_each_classification_is_a_new_occurrence() {
        let recovery = RecoveryService::new();
        let error = ProviderError::MissingCredential {
            provider: ProviderId::Anthropic,
        };

        let first = classify(&recovery, ProviderId::Anthropic, &error);
        let second = classify(&recovery, ProviderId::Anthropic, &error);

        assert_ne!(first.id, second.id);
        assert_eq!(first.message, "anthropic API key is not configured");
        assert_eq!(recovery.error_count(&ErrorType::Api, "anthropic"), 2);
    }

    #[test]
    fn test_exception_error() {
        let recovery = RecoveryService::new();
        let structured = exception_error(&recovery, ProviderId::OpenAi, "index out of bounds");

        assert_eq!(structured.code, "api_exception");
        assert_eq!(structured.error_type, ErrorType::Api);
        assert_eq!(recovery.error_count(&ErrorType::Api, "openai"), 1);
    }

    #[test]
    fn test_circuit_open_error_is_not_counted() {
        let structured = circuit_open_error(ProviderId::Anthropic);
        assert_eq!(structured.code, "circuit_open");
        assert_eq!(structured.component(), Some("anthropic"));
    }
}
