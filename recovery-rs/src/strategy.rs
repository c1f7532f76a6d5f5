//! # Recovery Strategies
//!
//! Static per-error-type policy: whether to retry, how often, how long to
//! wait between attempts, whether a fallback may be used, and when the
//! circuit breaker for that type trips.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::ErrorType;

/// Longest cooldown in seconds (`chrono::Duration` holds at most `i64::MAX` milliseconds)
pub const MAX_COOLDOWN_SECONDS: u64 = (i64::MAX / 1000) as u64;

/// Recovery policy for one error type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryStrategy {
    pub retry_allowed: bool,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub fallback_allowed: bool,
    /// Failures on one key before its breaker opens; 0 never trips
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_cooldown_seconds: u64,
}

impl RecoveryStrategy {
    /// No retry and no fallback
    pub const fn inert() -> Self {
        Self {
            retry_allowed: false,
            max_retries: 0,
            retry_delay_seconds: 0,
            fallback_allowed: false,
            circuit_breaker_threshold: 5,
            circuit_breaker_cooldown_seconds: 300,
        }
    }

    pub const fn retry(mut self, max_retries: u32, delay_seconds: u64) -> Self {
        self.retry_allowed = true;
        self.max_retries = max_retries;
        self.retry_delay_seconds = delay_seconds;
        self
    }

    pub const fn fallback(mut self) -> Self {
        self.fallback_allowed = true;
        self
    }

    pub const fn circuit_breaker(mut self, threshold: u32, cooldown_seconds: u64) -> Self {
        self.circuit_breaker_threshold = threshold;
        self.circuit_breaker_cooldown_seconds = cooldown_seconds;
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }

    /// Breaker cooldown, capped at the longest span chrono can represent
    pub fn cooldown(&self) -> chrono::Duration {
        let seconds = self.circuit_breaker_cooldown_seconds.min(MAX_COOLDOWN_SECONDS);
        chrono::Duration::seconds(seconds as i64)
    }
}

impl Default for RecoveryStrategy {
    fn default() -> Self {
        Self::inert()
    }
}

/// Built-in policy for each of the standard error types
pub fn default_strategy(error_type: &ErrorType) -> Option<RecoveryStrategy> {
    let strategy = match error_type {
        ErrorType::Api => RecoveryStrategy::inert().retry(3, 1).fallback().circuit_breaker(5, 300),
        ErrorType::Tool => RecoveryStrategy::inert().retry(2, 0).fallback().circuit_breaker(3, 60),
        ErrorType::Agent => RecoveryStrategy::inert().fallback().circuit_breaker(3, 300),
        ErrorType::Database => RecoveryStrategy::inert().retry(3, 1).circuit_breaker(5, 60),
        ErrorType::Permission => RecoveryStrategy::inert().circuit_breaker(10, 60),
        ErrorType::Validation => RecoveryStrategy::inert().circuit_breaker(10, 60),
        ErrorType::Timeout => RecoveryStrategy::inert()
            .retry(2, 2)
            .fallback()
            .circuit_breaker(3, 120),
        ErrorType::Resource => RecoveryStrategy::inert().retry(2, 5).circuit_breaker(3, 300),
        ErrorType::System => RecoveryStrategy::inert().circuit_breaker(5, 300),
        ErrorType::Network => RecoveryStrategy::inert()
            .retry(3, 2)
            .fallback()
            .circuit_breaker(5, 120),
        ErrorType::Other(_) => return None,
    };
    Some(strategy)
}

/// Registry of recovery strategies keyed by error type.
///
/// Read-mostly: entries are registered at startup or when an extension
/// adds its own error types, and read on every failure.
#[derive(Debug)]
pub struct StrategyRegistry {
    strategies: RwLock<HashMap<ErrorType, RecoveryStrategy>>,
}

impl StrategyRegistry {
    /// Creates an empty registry; every lookup yields the inert strategy
    pub fn empty() -> Self {
        Self {
            strategies: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry pre-populated with the built-in strategies
    pub fn new() -> Self {
        let strategies = ErrorType::BUILTIN
            .iter()
            .filter_map(|t| default_strategy(t).map(|s| (t.clone(), s)))
            .collect();

        Self {
            strategies: RwLock::new(strategies),
        }
    }

    /// Returns the strategy for `error_type`, or the inert strategy when
    /// none is registered
    pub fn get_strategy(&self, error_type: &ErrorType) -> RecoveryStrategy {
        let strategies = self.strategies.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        strategies.get(error_type).copied().unwrap_or_else(RecoveryStrategy::inert)
    }

    /// Registers or overwrites the strategy for `error_type`
    pub fn register_strategy(&self, error_type: ErrorType, strategy: RecoveryStrategy) {
        debug!(error_type = %error_type, ?strategy, "Registering recovery strategy");
        let mut strategies = self
            .strategies
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        strategies.insert(error_type, strategy);
    }

    pub fn is_registered(&self, error_type: &ErrorType) -> bool {
        let strategies = self.strategies.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        strategies.contains_key(error_type)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies `recovery.<type>` tables from configuration on top of the
/// registered strategies. Fields missing from a table keep the value of the
/// strategy already registered for that type.
///
/// Returns the number of strategies that were overridden.
pub fn load_strategy_overrides(registry: &StrategyRegistry, cfg: &config::Config) -> usize {
    let table = match cfg.get_table("recovery") {
        Ok(table) => table,
        Err(_) => return 0,
    };

    let mut applied = 0;
    for (name, value) in table {
        let error_type = ErrorType::from(name.as_str());
        let base = registry.get_strategy(&error_type);

        let overrides = match value.into_table() {
            Ok(overrides) => overrides,
            Err(e) => {
                warn!(
                    error_type = %error_type,
                    error = %e,
                    "Ignoring malformed recovery strategy override"
                );
                continue;
            }
        };

        let mut strategy = base;
        for (field, value) in overrides {
            let outcome = match field.as_str() {
                "retry_allowed" => value.into_bool().map(|v| strategy.retry_allowed = v),
                "max_retries" => value.into_int().map(|v| strategy.max_retries = v.max(0) as u32),
                "retry_delay_seconds" => value
                    .into_int()
                    .map(|v| strategy.retry_delay_seconds = v.max(0) as u64),
                "fallback_allowed" => value.into_bool().map(|v| strategy.fallback_allowed = v),
                "circuit_breaker_threshold" => value
                    .into_int()
                    .map(|v| strategy.circuit_breaker_threshold = v.max(0) as u32),
                "circuit_breaker_cooldown_seconds" => value
                    .into_int()
                    .map(|v| strategy.circuit_breaker_cooldown_seconds = v.max(0) as u64),
                other => {
                    warn!(
                        error_type = %error_type,
                        field = other,
                        "Unknown recovery strategy field"
                    );
                    Ok(())
                }
            };
            if let Err(e) = outcome {
                warn!(
                    error_type = %error_type,
                    field = %field,
                    error = %e,
                    "Invalid recovery strategy value"
                );
            }
        }

        registry.register_strategy(error_type, strategy);
        applied += 1;
    }

    applied
}
