//! Circuit breaker resilience patterns for external AI providers.
//!
//! This module implements the circuit breaker pattern to stop hammering an
//! AI provider that is failing, and to let callers fail over quickly.
//!
//! # Circuit Breaker States
//!
//! - **Closed**: Normal operation, requests pass through and failures are
//!   counted over a sliding monitoring window
//! - **Open**: Provider is failing, requests are rejected immediately
//! - **Half-Open**: Reset timeout elapsed, requests probe for recovery
//!
//! ```text
//! closed    --[windowed failures >= failure_threshold]--> open
//! open      --[reset_timeout elapsed, checked lazily]---> half-open
//! half-open --[consecutive successes >= threshold]------> closed
//! half-open --[any failure]-----------------------------> open
//! ```
//!
//! # Example
//!
//! ```rust
//! use provider_guard_core::circuit_breaker::{
//!     create_circuit_breaker, CircuitBreakerConfigUpdate, CircuitBreakerError,
//! };
//!
//! # async fn example() {
//! let breaker = create_circuit_breaker(
//!     "openai",
//!     Some(CircuitBreakerConfigUpdate {
//!         failure_threshold: Some(3),
//!         ..Default::default()
//!     }),
//! );
//!
//! match breaker.execute(|| async { Err::<(), _>("upstream 503") }).await {
//!     Err(CircuitBreakerError::Operation(original)) => assert_eq!(original, "upstream 503"),
//!     other => panic!("unexpected result: {:?}", other),
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::{AiProvider, Timestamp};

mod adapter;
mod breaker;
mod events;
mod registry;

pub use adapter::{with_circuit_breaker, ProtectedCall};
pub use breaker::CircuitBreaker;
pub use events::{
    CircuitBreakerEvent, CircuitBreakerEventType, EventHandler, EventMetadata, Subscription,
    TransitionReason,
};
pub use registry::CircuitBreakerRegistry;

// ============================================================================
// Circuit State
// ============================================================================

/// Current state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Circuit is closed, allowing requests through.
    Closed,

    /// Circuit is open, rejecting all requests.
    Open,

    /// Circuit is half-open, probing whether the provider recovered.
    HalfOpen,
}

impl CircuitState {
    /// Check if requests are allowed in current state.
    pub fn allows_requests(&self) -> bool {
        matches!(self, Self::Closed | Self::HalfOpen)
    }

    /// Check if circuit is in failure state.
    ///
    /// Open and HalfOpen both indicate the provider has recently failed.
    pub fn is_failure_state(&self) -> bool {
        matches!(self, Self::Open | Self::HalfOpen)
    }

    /// Gauge value for metrics exporters (0=closed, 1=open, 2=half-open).
    pub fn as_gauge(&self) -> i64 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }

    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Circuit Breaker Configuration
// ============================================================================

/// Configuration for circuit breaker behavior.
///
/// Durations serialize as integer milliseconds (`reset_timeout_ms`, ...).
///
/// # Default Configuration
///
/// - Failure threshold: 5 failures inside the monitoring window
/// - Reset timeout: 30 seconds
/// - Success threshold: 2 consecutive half-open successes
/// - Monitoring window: 60 seconds
/// - Request timeout: 30 seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failures inside the monitoring window needed to open the circuit.
    pub failure_threshold: u32,

    /// Time the circuit stays open before a request may probe it.
    #[serde(rename = "reset_timeout_ms", with = "duration_ms")]
    pub reset_timeout: Duration,

    /// Consecutive half-open successes needed to close the circuit.
    pub success_threshold: u32,

    /// Sliding period over which failures count toward the threshold.
    #[serde(rename = "monitoring_window_ms", with = "duration_ms")]
    pub monitoring_window: Duration,

    /// Deadline for an individual request.
    #[serde(rename = "request_timeout_ms", with = "duration_ms")]
    pub request_timeout: Duration,
}

/// Configuration applied to any field a caller leaves unset.
pub const DEFAULT_CONFIG: CircuitBreakerConfig = CircuitBreakerConfig {
    failure_threshold: 5,
    reset_timeout: Duration::from_secs(30),
    success_threshold: 2,
    monitoring_window: Duration::from_secs(60),
    request_timeout: Duration::from_secs(30),
};

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        DEFAULT_CONFIG
    }
}

impl CircuitBreakerConfig {
    /// Check that thresholds and durations are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroThreshold`] for a threshold of 0 and
    /// [`ConfigError::ZeroDuration`] for a zero reset timeout, monitoring
    /// window, or request timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroThreshold {
                field: "failure_threshold",
            });
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::ZeroThreshold {
                field: "success_threshold",
            });
        }

        let durations = [
            ("reset_timeout_ms", self.reset_timeout),
            ("monitoring_window_ms", self.monitoring_window),
            ("request_timeout_ms", self.request_timeout),
        ];
        for (field, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration { field });
            }
        }

        Ok(())
    }

    /// Merge `update` over this configuration.
    pub fn merged(&self, update: &CircuitBreakerConfigUpdate) -> Self {
        update.apply_to(self)
    }

    // Thresholds of 0 behave as 1 at runtime.
    pub(crate) fn effective_failure_threshold(&self) -> usize {
        self.failure_threshold.max(1) as usize
    }

    pub(crate) fn effective_success_threshold(&self) -> u32 {
        self.success_threshold.max(1)
    }
}

/// Partial configuration; `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfigUpdate {
    /// See [`CircuitBreakerConfig::failure_threshold`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,

    /// See [`CircuitBreakerConfig::reset_timeout`].
    #[serde(
        rename = "reset_timeout_ms",
        with = "option_duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub reset_timeout: Option<Duration>,

    /// See [`CircuitBreakerConfig::success_threshold`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_threshold: Option<u32>,

    /// See [`CircuitBreakerConfig::monitoring_window`].
    #[serde(
        rename = "monitoring_window_ms",
        with = "option_duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub monitoring_window: Option<Duration>,

    /// See [`CircuitBreakerConfig::request_timeout`].
    #[serde(
        rename = "request_timeout_ms",
        with = "option_duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub request_timeout: Option<Duration>,
}

impl CircuitBreakerConfigUpdate {
    /// Produce a full configuration from `base` with this update's fields applied.
    pub fn apply_to(&self, base: &CircuitBreakerConfig) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold.unwrap_or(base.failure_threshold),
            reset_timeout: self.reset_timeout.unwrap_or(base.reset_timeout),
            success_threshold: self.success_threshold.unwrap_or(base.success_threshold),
            monitoring_window: self.monitoring_window.unwrap_or(base.monitoring_window),
            request_timeout: self.request_timeout.unwrap_or(base.request_timeout),
        }
    }

    /// Layer `other` on top of this update; fields set in `other` win.
    pub fn overlay(&self, other: &CircuitBreakerConfigUpdate) -> Self {
        Self {
            failure_threshold: other.failure_threshold.or(self.failure_threshold),
            reset_timeout: other.reset_timeout.or(self.reset_timeout),
            success_threshold: other.success_threshold.or(self.success_threshold),
            monitoring_window: other.monitoring_window.or(self.monitoring_window),
            request_timeout: other.request_timeout.or(self.request_timeout),
        }
    }

    /// Check if no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<CircuitBreakerConfig> for CircuitBreakerConfigUpdate {
    fn from(config: CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: Some(config.failure_threshold),
            reset_timeout: Some(config.reset_timeout),
            success_threshold: Some(config.success_threshold),
            monitoring_window: Some(config.monitoring_window),
            request_timeout: Some(config.request_timeout),
        }
    }
}

/// Invalid circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A threshold must be at least 1.
    #[error("Invalid circuit breaker configuration: {field} must be at least 1")]
    ZeroThreshold { field: &'static str },

    /// A duration must be greater than zero.
    #[error("Invalid circuit breaker configuration: {field} must be greater than 0")]
    ZeroDuration { field: &'static str },
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => super::duration_ms::serialize(duration, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Point-in-time statistics for one breaker.
///
/// `failures` and `successes` cover the monitoring window only; the
/// `total_*` counters cover the breaker's lifetime (until [`CircuitBreaker::reset`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    /// Provider this breaker guards.
    pub provider: AiProvider,

    /// Current circuit state.
    pub state: CircuitState,

    /// Failures inside the monitoring window.
    pub failures: u32,

    /// Successes inside the monitoring window.
    pub successes: u32,

    /// Requests that were attempted (rejections excluded).
    pub total_requests: u64,

    /// Attempted requests that failed or timed out.
    pub total_failures: u64,

    /// `total_failures / total_requests`, 0.0 when nothing was attempted.
    pub failure_rate: f64,

    /// Failures since the last success.
    pub consecutive_failures: u32,

    /// Successes since the last failure or state transition.
    pub consecutive_successes: u32,

    /// Requests rejected without being attempted.
    pub rejected_requests: u64,

    /// Attempted requests that exceeded the request timeout.
    pub timeouts: u64,

    /// Time of the most recent success.
    pub last_success: Option<Timestamp>,

    /// Time of the most recent failure.
    pub last_failure: Option<Timestamp>,

    /// Time the circuit last opened, while it is open.
    pub opened_at: Option<Timestamp>,

    /// Earliest time an open circuit will admit a probe.
    pub next_attempt: Option<Timestamp>,
}

impl CircuitBreakerStats {
    /// Success rate from 0.0 to 1.0, or 1.0 if no requests were attempted.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            1.0 - self.failure_rate
        }
    }
}

/// Fleet-wide breaker counts by state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerSummary {
    /// Number of registered breakers.
    pub total: usize,

    /// Breakers in the closed state.
    pub closed: usize,

    /// Breakers in the open state.
    pub open: usize,

    /// Breakers in the half-open state.
    pub half_open: usize,

    /// State of every registered provider.
    pub providers: BTreeMap<AiProvider, CircuitState>,
}

// ============================================================================
// Circuit Breaker Error
// ============================================================================

/// Outcome of a gated call that did not produce a value.
///
/// `CircuitOpen` and `Timeout` are raised by the breaker itself;
/// `Operation` hands back the wrapped operation's own error unchanged.
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open - the operation was never invoked.
    #[error("Circuit breaker for provider '{provider}' is {state} - request rejected")]
    CircuitOpen {
        provider: AiProvider,
        state: CircuitState,
    },

    /// Operation exceeded the request timeout.
    ///
    /// `state` is the breaker state after the timeout was recorded.
    #[error("Request to provider '{provider}' timed out after {timeout_ms}ms")]
    Timeout {
        provider: AiProvider,
        state: CircuitState,
        timeout_ms: u64,
    },

    /// Operation failed with its own error.
    #[error("{0}")]
    Operation(E),
}

impl<E> CircuitBreakerError<E> {
    /// Check if the breaker produced this error (open circuit or timeout).
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::Timeout { .. })
    }

    /// Check if the call exceeded its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if the call was rejected because the circuit is open.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Check if the error counted as a failure for the state machine.
    ///
    /// Open-circuit rejections never reach the provider, so they do not.
    pub fn counts_as_failure(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Operation(_))
    }

    /// Provider named by a breaker rejection.
    pub fn provider(&self) -> Option<&AiProvider> {
        match self {
            Self::CircuitOpen { provider, .. } | Self::Timeout { provider, .. } => Some(provider),
            Self::Operation(_) => None,
        }
    }

    /// Breaker state carried by a breaker rejection.
    pub fn state(&self) -> Option<CircuitState> {
        match self {
            Self::CircuitOpen { state, .. } | Self::Timeout { state, .. } => Some(*state),
            Self::Operation(_) => None,
        }
    }

    /// The wrapped operation's error, if that is what this is.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::Operation(error) => Some(error),
            _ => None,
        }
    }

    /// Convert the operation error type, keeping breaker rejections as they are.
    pub fn map_operation<F>(self, f: impl FnOnce(E) -> F) -> CircuitBreakerError<F> {
        match self {
            Self::CircuitOpen { provider, state } => {
                CircuitBreakerError::CircuitOpen { provider, state }
            }
            Self::Timeout {
                provider,
                state,
                timeout_ms,
            } => CircuitBreakerError::Timeout {
                provider,
                state,
                timeout_ms,
            },
            Self::Operation(error) => CircuitBreakerError::Operation(f(error)),
        }
    }
}

// ============================================================================
// Factories
// ============================================================================

/// Create a breaker for `provider`, filling unset fields from [`DEFAULT_CONFIG`].
pub fn create_circuit_breaker(
    provider: impl Into<AiProvider>,
    config: Option<CircuitBreakerConfigUpdate>,
) -> CircuitBreaker {
    let config = config.unwrap_or_default().apply_to(&DEFAULT_CONFIG);
    CircuitBreaker::new(provider, config)
}

/// Create a registry whose breakers use [`DEFAULT_CONFIG`] merged with `config`.
pub fn create_circuit_breaker_registry(
    config: Option<CircuitBreakerConfigUpdate>,
) -> CircuitBreakerRegistry {
    let config = config.unwrap_or_default().apply_to(&DEFAULT_CONFIG);
    CircuitBreakerRegistry::with_config(config)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
