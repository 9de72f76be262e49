//! Time sources for circuit breaker bookkeeping.
//!
//! Breakers never run background timers. Reset timeouts and the failure
//! monitoring window are evaluated against a [`Clock`] whenever the breaker
//! is consulted, so swapping in a [`ManualClock`] makes every time-driven
//! transition deterministic.
//!
//! # Examples
//!
//! ```rust
//! use provider_guard_core::clock::{Clock, ManualClock};
//! use std::time::Duration;
//!
//! let clock = ManualClock::new();
//! let before = clock.now();
//! clock.advance(Duration::from_secs(30));
//! assert_eq!(clock.now().saturating_duration_since(before), Duration::from_secs(30));
//! ```

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::Timestamp;

/// Source of the current time.
///
/// Implementations must be cheap to call; breakers read the clock on every
/// state check.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> Timestamp;
}

/// Wall clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually advanced clock for tests and simulations.
///
/// Clones share the same underlying time, so a clone handed to a registry
/// can be advanced from the test body.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<RwLock<Timestamp>>,
}

impl ManualClock {
    /// Create a manual clock starting at the current wall-clock time.
    pub fn new() -> Self {
        Self::starting_at(Timestamp::now())
    }

    /// Create a manual clock starting at `start`.
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            current: Arc::new(RwLock::new(start)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = current.add_duration(duration);
    }

    /// Jump to an absolute time.
    pub fn set(&self, timestamp: Timestamp) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = timestamp;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared handle to a clock, as stored by breakers and registries.
pub type SharedClock = Arc<dyn Clock>;

/// Default clock used when none is injected.
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
