//! # Provider-Guard Core
//!
//! Resilience layer for calls to external AI providers.
//!
//! Every provider (e.g. `"openai"`, `"anthropic"`) gets its own
//! [`CircuitBreaker`](circuit_breaker::CircuitBreaker) that gates outbound
//! calls, bounds them with a request timeout, and tracks health with a
//! closed / open / half-open state machine. A
//! [`CircuitBreakerRegistry`](circuit_breaker::CircuitBreakerRegistry) owns
//! one breaker per provider and aggregates their health into a fleet view.
//!
//! ## Architecture
//!
//! - Time is read through the [`clock::Clock`] trait so tests and
//!   simulations can move time deterministically
//! - Breakers publish [`circuit_breaker::CircuitBreakerEvent`]s to explicit
//!   observer lists; the registry relays them rather than sharing state
//! - Metrics exporters plug in through [`monitoring::MetricsCollector`]
//!
//! ## Usage
//!
//! ```rust
//! use provider_guard_core::circuit_breaker::{create_circuit_breaker_registry, CircuitState};
//!
//! # async fn example() {
//! let registry = create_circuit_breaker_registry(None);
//! let breaker = registry.get("openai");
//!
//! let answer: Result<&str, _> = breaker
//!     .execute(|| async { Ok::<_, std::io::Error>("42") })
//!     .await;
//!
//! assert!(answer.is_ok());
//! assert_eq!(breaker.state(), CircuitState::Closed);
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::time::Duration;

pub mod circuit_breaker;
pub mod clock;
pub mod monitoring;

// ============================================================================
// Provider Identifier
// ============================================================================

/// Opaque key identifying one external AI provider.
///
/// Used as the registry cache key. Two breakers never share an `AiProvider`
/// within the same registry.
///
/// # Examples
///
/// ```rust
/// use provider_guard_core::AiProvider;
///
/// let provider = AiProvider::from("anthropic");
/// assert_eq!(provider.as_str(), "anthropic");
/// assert_eq!(provider.to_string(), "anthropic");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AiProvider(String);

impl AiProvider {
    /// Create a provider key from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Return the provider key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AiProvider {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AiProvider {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&AiProvider> for AiProvider {
    fn from(value: &AiProvider) -> Self {
        value.clone()
    }
}

impl Borrow<str> for AiProvider {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for AiProvider {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Timestamp
// ============================================================================

/// UTC timestamp used for breaker bookkeeping and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wrap an existing UTC datetime
    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Convert to RFC3339 string
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Add duration to timestamp
    pub fn add_duration(&self, duration: Duration) -> Self {
        let chrono_duration = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        Self(
            self.0
                .checked_add_signed(chrono_duration)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }

    /// Subtract duration from timestamp
    pub fn subtract_duration(&self, duration: Duration) -> Self {
        let chrono_duration = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        Self(
            self.0
                .checked_sub_signed(chrono_duration)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        )
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        (self.0 - earlier.0).to_std().unwrap_or(Duration::ZERO)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
