//! # Circuit Breaker
//!
//! Failure counters and breakers keyed by `(error_type, component)`.
//!
//! Two states only: CLOSED and OPEN. A breaker opens at the moment a
//! failure pushes its counter to the strategy threshold, and closes either
//! explicitly (a successful retry) or lazily, the first time it is read after
//! its cooldown has elapsed. There is no half-open probing; once the cooldown
//! passes the next call is a normal attempt.
//!
//! Both maps live behind one mutex so that an increment and the trip it
//! causes are a single atomic step.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::types::ErrorKey;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Calls proceed normally
    Closed,
    /// Calls are refused until the cooldown elapses
    Open,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
        }
    }
}

/// Consecutive failures observed for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCounter {
    pub count: u32,
    pub first_error: DateTime<Utc>,
    pub last_error: DateTime<Utc>,
}

/// Trip record for one key. Invariant: `reset_at = tripped_at + cooldown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub tripped: bool,
    pub tripped_at: DateTime<Utc>,
    pub reset_at: DateTime<Utc>,
}

impl CircuitBreakerState {
    fn is_blocking(&self, now: DateTime<Utc>) -> bool {
        self.tripped && now < self.reset_at
    }
}

/// Diagnostic view of one key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub key: ErrorKey,
    pub state: CircuitState,
    pub counter: Option<ErrorCounter>,
    pub breaker: Option<CircuitBreakerState>,
}

#[derive(Debug, Default)]
struct BreakerBook {
    counters: HashMap<ErrorKey, ErrorCounter>,
    breakers: HashMap<ErrorKey, CircuitBreakerState>,
}

impl BreakerBook {
    /// Lazy OPEN -> CLOSED transition. Returns true while the breaker blocks.
    fn refresh(&mut self, key: &ErrorKey, now: DateTime<Utc>) -> bool {
        let expired = match self.breakers.get(key) {
            Some(state) if state.is_blocking(now) => return true,
            Some(state) => state.tripped,
            None => return false,
        };

        if expired {
            info!(key = %key, "Circuit breaker cooldown elapsed, closing");
            self.counters.remove(key);
        }
        self.breakers.remove(key);
        false
    }
}

/// Shared failure counters and breakers for every `(error_type, component)` key
pub struct CircuitBreaker {
    clock: Arc<dyn Clock>,
    book: Mutex<BreakerBook>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            book: Mutex::new(BreakerBook::default()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn book(&self) -> MutexGuard<'_, BreakerBook> {
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Counts one failure for `key` and trips the breaker when the count
    /// reaches `threshold`. Returns the updated count.
    ///
    /// A threshold of zero never trips. A breaker that is already open keeps
    /// its original `reset_at`. A cooldown reaching past the representable
    /// range holds the breaker open until `DateTime::<Utc>::MAX_UTC`.
    pub fn record_failure(&self, key: &ErrorKey, threshold: u32, cooldown: Duration) -> u32 {
        let now = self.clock.now();
        let mut book = self.book();
        let already_open = book.refresh(key, now);

        let counter = book.counters.entry(key.clone()).or_insert(ErrorCounter {
            count: 0,
            first_error: now,
            last_error: now,
        });
        counter.count += 1;
        counter.last_error = now;
        let count = counter.count;

        debug!(key = %key, count, threshold, "Recorded failure");

        if threshold > 0 && count >= threshold && !already_open {
            let state = CircuitBreakerState {
                tripped: true,
                tripped_at: now,
                reset_at: now
                    .checked_add_signed(cooldown.max(Duration::zero()))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            };
            book.breakers.insert(key.clone(), state);
            counter!("recovery.circuit_trips", 1);
            warn!(
                key = %key,
                count,
                threshold,
                reset_at = %state.reset_at,
                "Circuit breaker tripped"
            );
        }

        count
    }

    /// Whether the breaker for `key` is open. Performs the lazy auto-reset:
    /// once `reset_at` has passed the breaker and its counter are cleared.
    pub fn is_open(&self, key: &ErrorKey) -> bool {
        let now = self.clock.now();
        self.book().refresh(key, now)
    }

    /// Clears the counter and closes the breaker for `key`, regardless of
    /// cooldown
    pub fn reset(&self, key: &ErrorKey) {
        let mut book = self.book();
        let had_breaker = book.breakers.remove(key).is_some();
        let had_counter = book.counters.remove(key).is_some();

        if had_breaker {
            info!(key = %key, "Circuit breaker reset after success");
        } else if had_counter {
            debug!(key = %key, "Error counter reset after success");
        }
    }

    /// Current failure count for `key` (zero when none recorded)
    pub fn error_count(&self, key: &ErrorKey) -> u32 {
        self.counter(key).map(|c| c.count).unwrap_or(0)
    }

    pub fn counter(&self, key: &ErrorKey) -> Option<ErrorCounter> {
        let now = self.clock.now();
        let mut book = self.book();
        book.refresh(key, now);
        book.counters.get(key).copied()
    }

    /// Current breaker record for `key`, if it is open
    pub fn state(&self, key: &ErrorKey) -> Option<CircuitBreakerState> {
        let now = self.clock.now();
        let mut book = self.book();
        book.refresh(key, now);
        book.breakers.get(key).copied()
    }

    /// All keys with a counter or breaker, after applying lazy resets
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let now = self.clock.now();
        let mut book = self.book();

        let mut keys: Vec<ErrorKey> = book
            .counters
            .keys()
            .chain(book.breakers.keys())
            .cloned()
            .collect();
        keys.sort_by(|a, b| {
            (a.error_type.as_str(), &a.component).cmp(&(b.error_type.as_str(), &b.component))
        });
        keys.dedup();

        keys.into_iter()
            .filter_map(|key| {
                let open = book.refresh(&key, now);
                let counter = book.counters.get(&key).copied();
                let breaker = book.breakers.get(&key).copied();
                if counter.is_none() && breaker.is_none() {
                    return None;
                }
                Some(BreakerSnapshot {
                    state: if open { CircuitState::Open } else { CircuitState::Closed },
                    key,
                    counter,
                    breaker,
                })
            })
            .collect()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let book = self.book();
        f.debug_struct("CircuitBreaker")
            .field("counters", &book.counters.len())
            .field("breakers", &book.breakers.len())
            .finish()
    }
}
