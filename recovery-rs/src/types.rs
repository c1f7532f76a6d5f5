//! # Structured Error Types
//!
//! The canonical error envelope carried through the recovery pipeline.
//! Every failure produces its own `StructuredError` with a fresh id; the
//! envelope is never mutated after creation (builder methods consume it).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Context key set when a call was refused because the breaker was open
pub const CIRCUIT_BREAKER_TRIPPED: &str = "circuit_breaker_tripped";

/// Context key naming the component an error was recorded against
pub const COMPONENT: &str = "component";

/// The severity level of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Never recoverable
    Critical,
    /// A failed operation that may succeed through retry or fallback
    Error,
    /// A degraded result
    Warning,
    /// Informational, not an actual failure
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Error
    }
}

/// Categorizes the failure so a recovery strategy can be selected for it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorType {
    /// Upstream AI provider failure
    Api,
    /// Tool execution failure
    Tool,
    /// Agent failure
    Agent,
    /// Storage failure
    Database,
    /// Capability or authorization failure
    Permission,
    /// Invalid input
    Validation,
    /// An operation exceeded its deadline
    Timeout,
    /// Resource exhaustion
    Resource,
    /// Internal failure, also the type assumed when none is attached
    System,
    /// Connectivity failure
    Network,
    /// Error type registered by an extension component
    Other(String),
}

impl ErrorType {
    /// The ten built-in error types
    pub const BUILTIN: [ErrorType; 10] = [
        ErrorType::Api,
        ErrorType::Tool,
        ErrorType::Agent,
        ErrorType::Database,
        ErrorType::Permission,
        ErrorType::Validation,
        ErrorType::Timeout,
        ErrorType::Resource,
        ErrorType::System,
        ErrorType::Network,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ErrorType::Api => "api",
            ErrorType::Tool => "tool",
            ErrorType::Agent => "agent",
            ErrorType::Database => "database",
            ErrorType::Permission => "permission",
            ErrorType::Validation => "validation",
            ErrorType::Timeout => "timeout",
            ErrorType::Resource => "resource",
            ErrorType::System => "system",
            ErrorType::Network => "network",
            ErrorType::Other(name) => name,
        }
    }
}

impl Default for ErrorType {
    fn default() -> Self {
        ErrorType::System
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ErrorType {
    fn from(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "api" => ErrorType::Api,
            "tool" => ErrorType::Tool,
            "agent" => ErrorType::Agent,
            "database" => ErrorType::Database,
            "permission" => ErrorType::Permission,
            "validation" => ErrorType::Validation,
            "timeout" => ErrorType::Timeout,
            "resource" => ErrorType::Resource,
            "system" | "" => ErrorType::System,
            "network" => ErrorType::Network,
            _ => ErrorType::Other(normalized),
        }
    }
}

impl From<String> for ErrorType {
    fn from(value: String) -> Self {
        ErrorType::from(value.as_str())
    }
}

impl From<ErrorType> for String {
    fn from(value: ErrorType) -> Self {
        value.as_str().to_string()
    }
}

impl FromStr for ErrorType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ErrorType::from(s))
    }
}

/// Composite key for error counters and circuit breakers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorKey {
    pub error_type: ErrorType,
    pub component: String,
}

impl ErrorKey {
    pub fn new<S: Into<String>>(error_type: ErrorType, component: S) -> Self {
        Self {
            error_type,
            component: component.into(),
        }
    }
}

impl fmt::Display for ErrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.error_type, self.component)
    }
}

/// Canonical error envelope for a single failure occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredError {
    /// Unique per occurrence
    pub id: Uuid,
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl StructuredError {
    /// Creates a new error with a fresh id, stamped with the current time
    /// and the caller's correlation id.
    ///
    /// This does not count the failure; use
    /// [`RecoveryService::record_error`](crate::RecoveryService::record_error)
    /// for errors that should feed the circuit breaker.
    pub fn new<C, M>(error_type: ErrorType, code: C, message: M) -> Self
    where
        C: Into<String>,
        M: Into<String>,
    {
        Self {
            id: Uuid::new_v4(),
            error_type,
            severity: Severity::default(),
            code: code.into(),
            message: message.into(),
            timestamp: Utc::now(),
            context: serde_json::Map::new(),
            correlation_id: crate::logging::current_correlation_id(),
        }
    }

    /// Sets the error severity
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Overrides the creation timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Adds context information to the error
    pub fn context<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Serialize,
    {
        if let Ok(value) = serde_json::to_value(value) {
            self.context.insert(key.into(), value);
        }
        self
    }

    /// Component the error was recorded against, if any
    pub fn component(&self) -> Option<&str> {
        self.context.get(COMPONENT).and_then(|v| v.as_str())
    }

    /// Whether the call was refused by an open circuit breaker
    pub fn circuit_breaker_tripped(&self) -> bool {
        self.context
            .get(CIRCUIT_BREAKER_TRIPPED)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Critical errors and errors refused by an open breaker are terminal
    pub fn is_recoverable(&self) -> bool {
        self.severity != Severity::Critical && !self.circuit_breaker_tripped()
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} error {}: {}", self.severity, self.error_type, self.code, self.message)
    }
}

impl std::error::Error for StructuredError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = StructuredError::new(ErrorType::Api, "http_error", "upstream returned 502")
            .severity(Severity::Warning)
            .context("status", 502)
            .context(COMPONENT, "openai");

        assert_eq!(error.error_type, ErrorType::Api);
        assert_eq!(error.severity, Severity::Warning);
        assert_eq!(error.code, "http_error");
        assert_eq!(error.context.get("status"), Some(&serde_json::json!(502)));
        assert_eq!(error.component(), Some("openai"));
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_ids_are_unique_per_occurrence() {
        let first = StructuredError::new(ErrorType::Api, "timeout", "slow");
        let second = StructuredError::new(ErrorType::Api, "timeout", "slow");
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_error_display() {
        let error = StructuredError::new(ErrorType::Network, "connect", "connection refused");
        assert_eq!(error.to_string(), "[ERROR] network error connect: connection refused");
    }

    #[test]
    fn test_terminal_errors() {
        let critical = StructuredError::new(ErrorType::System, "boot", "no config")
            .severity(Severity::Critical);
        assert!(!critical.is_recoverable());

        let tripped = StructuredError::new(ErrorType::Api, "circuit_open", "blocked")
            .context(CIRCUIT_BREAKER_TRIPPED, true);
        assert!(tripped.circuit_breaker_tripped());
        assert!(!tripped.is_recoverable());
    }

    #[test]
    fn test_error_type_parsing() {
        assert_eq!("API".parse::<ErrorType>().ok(), Some(ErrorType::Api));
        assert_eq!(ErrorType::from(""), ErrorType::System);
        assert_eq!(ErrorType::from("billing"), ErrorType::Other("billing".to_string()));
        assert_eq!(ErrorType::Other("billing".to_string()).to_string(), "billing");
    }

    #[test]
    fn test_serialization_uses_wire_names() {
        let error = StructuredError::new(ErrorType::Timeout, "deadline", "took too long")
            .severity(Severity::Critical);
        let json = serde_json::to_value(&error).unwrap();

        assert_eq!(json["type"], "timeout");
        assert_eq!(json["severity"], "critical");

        let back: StructuredError = serde_json::from_value(json).unwrap();
        assert_eq!(back, error);
    }
}
