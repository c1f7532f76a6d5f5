//! # Recovery
//!
//! Error recovery core for calls to upstream AI providers:
//!
//! - `StructuredError`, the canonical failure envelope
//! - Per `(error_type, component)` failure counters and circuit breakers
//!   with lazy cooldown reset
//! - A registry of per-error-type recovery strategies
//! - `RecoveryService`, which drives retry-then-fallback for a failure
//! - Structured logging and user-facing error display

pub mod circuit_breaker;
pub mod clock;
pub mod display;
pub mod logging;
pub mod recovery;
pub mod strategy;
pub mod types;

pub use circuit_breaker::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerState, CircuitState, ErrorCounter,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use display::{format_for_display, DisplayOptions};
pub use logging::{
    current_correlation_id, init_logging, new_correlation_id, scope_correlation_id,
    set_correlation_id, LoggingConfig,
};
pub use recovery::{RecoveryAction, RecoveryFuture, RecoveryService};
pub use strategy::{load_strategy_overrides, RecoveryStrategy, StrategyRegistry};
pub use types::{ErrorKey, ErrorType, Severity, StructuredError, CIRCUIT_BREAKER_TRIPPED};
