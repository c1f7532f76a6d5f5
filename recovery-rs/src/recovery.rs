//! # Recovery Orchestrator
//!
//! `RecoveryService` owns the circuit breaker and the strategy registry and
//! drives the retry-then-fallback decision for a failed operation:
//!
//! ```text
//! START -> CHECK_BREAKER -> OPEN   -> FALLBACK_OR_FAIL
//!                        -> CLOSED -> RETRY_LOOP -> success   -> DONE
//!                                                -> exhausted -> FALLBACK_OR_FAIL
//! ```
//!
//! Failures are counted when an error is recorded, not when it is handled,
//! so every failed attempt feeds the breaker whether or not it reaches
//! [`RecoveryService::handle_error`].

use std::sync::Arc;

use futures::future::BoxFuture;
use metrics::counter;
use tracing::{debug, info, warn};

use crate::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerState, ErrorCounter};
use crate::clock::{Clock, SystemClock};
use crate::logging::log_structured_error;
use crate::strategy::{RecoveryStrategy, StrategyRegistry};
use crate::types::{
    ErrorKey, ErrorType, Severity, StructuredError, CIRCUIT_BREAKER_TRIPPED, COMPONENT,
};

/// Future produced by a recovery action
pub type RecoveryFuture<'a, T> = BoxFuture<'a, Result<T, StructuredError>>;

/// A retry or fallback action. Called once per attempt; each call must start
/// a fresh attempt from the original inputs.
pub type RecoveryAction<'a, T> = Box<dyn FnMut() -> RecoveryFuture<'a, T> + Send + 'a>;

/// Error recovery service shared by everything that talks to a failing
/// dependency. Construct one per application and pass it around in an `Arc`.
#[derive(Debug)]
pub struct RecoveryService {
    strategies: StrategyRegistry,
    breaker: CircuitBreaker,
}

impl RecoveryService {
    /// Creates a service with the built-in strategies and the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_parts(StrategyRegistry::new(), clock)
    }

    pub fn with_parts(strategies: StrategyRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            strategies,
            breaker: CircuitBreaker::with_clock(clock),
        }
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    pub fn get_strategy(&self, error_type: &ErrorType) -> RecoveryStrategy {
        self.strategies.get_strategy(error_type)
    }

    pub fn register_strategy(&self, error_type: ErrorType, strategy: RecoveryStrategy) {
        self.strategies.register_strategy(error_type, strategy);
    }

    /// Creates an error for `component` and records it as a failure
    pub fn create_error<C, M>(
        &self,
        error_type: ErrorType,
        code: C,
        message: M,
        component: &str,
    ) -> StructuredError
    where
        C: Into<String>,
        M: Into<String>,
    {
        let error = StructuredError::new(error_type, code, message).at(self.breaker.now());
        self.record_error(error, component)
    }

    /// Tags `error` with `component`, counts it against
    /// `(error.error_type, component)` and logs it.
    ///
    /// Counting here may trip the breaker for that key.
    pub fn record_error(&self, error: StructuredError, component: &str) -> StructuredError {
        let error = error.context(COMPONENT, component);
        let key = ErrorKey::new(error.error_type.clone(), component);
        let strategy = self.strategies.get_strategy(&key.error_type);

        let count = self
            .breaker
            .record_failure(&key, strategy.circuit_breaker_threshold, strategy.cooldown());
        counter!("recovery.errors_recorded", 1);

        debug!(error_id = %error.id, key = %key, count, "Error recorded");
        log_structured_error(&error);
        error
    }

    /// Whether the breaker for `(error_type, component)` is open.
    /// Applies the lazy cooldown reset before answering.
    pub fn is_open(&self, error_type: &ErrorType, component: &str) -> bool {
        self.breaker.is_open(&ErrorKey::new(error_type.clone(), component))
    }

    /// Clears the counter and closes the breaker for `(error_type, component)`
    pub fn record_success(&self, error_type: &ErrorType, component: &str) {
        self.breaker.reset(&ErrorKey::new(error_type.clone(), component));
    }

    pub fn error_count(&self, error_type: &ErrorType, component: &str) -> u32 {
        self.breaker.error_count(&ErrorKey::new(error_type.clone(), component))
    }

    pub fn error_counter(&self, error_type: &ErrorType, component: &str) -> Option<ErrorCounter> {
        self.breaker.counter(&ErrorKey::new(error_type.clone(), component))
    }

    pub fn breaker_state(
        &self,
        error_type: &ErrorType,
        component: &str,
    ) -> Option<CircuitBreakerState> {
        self.breaker.state(&ErrorKey::new(error_type.clone(), component))
    }

    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        self.breaker.snapshot()
    }

    /// Runs recovery for a finished operation. Successful outcomes pass
    /// through untouched.
    pub async fn recover<'a, T>(
        &self,
        outcome: Result<T, StructuredError>,
        component: &str,
        retry: Option<RecoveryAction<'a, T>>,
        fallback: Option<RecoveryAction<'a, T>>,
    ) -> Result<T, StructuredError> {
        match outcome {
            Ok(value) => Ok(value),
            Err(error) => self.handle_error(error, component, retry, fallback).await,
        }
    }

    /// Attempts to recover from `error` raised by `component`.
    ///
    /// Consults the breaker first: an open breaker skips retries and goes
    /// straight to `fallback` (or returns the error annotated with
    /// `circuit_breaker_tripped`). Otherwise retries up to the strategy's
    /// `max_retries` strictly in sequence, and falls back once when the
    /// strategy allows it. A fallback's result is returned as-is.
    pub async fn handle_error<'a, T>(
        &self,
        error: StructuredError,
        component: &str,
        retry: Option<RecoveryAction<'a, T>>,
        fallback: Option<RecoveryAction<'a, T>>,
    ) -> Result<T, StructuredError> {
        if error.severity == Severity::Critical {
            debug!(error_id = %error.id, "Critical error is not recoverable");
            return Err(error);
        }

        let key = ErrorKey::new(error.error_type.clone(), component);

        if self.breaker.is_open(&key) {
            return match fallback {
                Some(mut fallback) => {
                    info!(
                        key = %key,
                        error_id = %error.id,
                        "Circuit open, skipping retries and using fallback"
                    );
                    counter!("recovery.fallbacks", 1);
                    fallback().await
                }
                None => {
                    warn!(
                        key = %key,
                        error_id = %error.id,
                        "Circuit open and no fallback available"
                    );
                    Err(error.context(CIRCUIT_BREAKER_TRIPPED, true))
                }
            };
        }

        let strategy = self.strategies.get_strategy(&key.error_type);

        if strategy.retry_allowed {
            if let Some(mut retry) = retry {
                for attempt in 1..=strategy.max_retries {
                    if strategy.retry_delay_seconds > 0 {
                        tokio::time::sleep(strategy.retry_delay()).await;
                    }

                    counter!("recovery.retry_attempts", 1);
                    match retry().await {
                        Ok(value) => {
                            info!(key = %key, attempt, "Retry succeeded");
                            counter!("recovery.retry_successes", 1);
                            self.breaker.reset(&key);
                            return Ok(value);
                        }
                        Err(retry_error) => {
                            debug!(
                                key = %key,
                                attempt,
                                max_retries = strategy.max_retries,
                                error_id = %retry_error.id,
                                code = %retry_error.code,
                                "Retry attempt failed"
                            );
                        }
                    }
                }
                warn!(key = %key, attempts = strategy.max_retries, "Retries exhausted");
            }
        }

        if strategy.fallback_allowed {
            if let Some(mut fallback) = fallback {
                info!(key = %key, error_id = %error.id, "Using fallback");
                counter!("recovery.fallbacks", 1);
                return fallback().await;
            }
        }

        Err(error)
    }
}

impl Default for RecoveryService {
    fn default() -> Self {
        Self::new()
    }
}
