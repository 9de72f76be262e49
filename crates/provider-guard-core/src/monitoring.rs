//! Metrics collection for provider health.
//!
//! This module defines what breaker metrics are collected via the
//! [`MetricsCollector`] trait. Exporters (Prometheus, OpenTelemetry, ...)
//! implement the trait; [`attach_metrics`] feeds it from a registry's
//! relayed event stream.
//!
//! # Best-Effort Pattern
//!
//! Metric recording never fails and never blocks a gated call.
//!
//! # Examples
//!
//! ```rust
//! use provider_guard_core::circuit_breaker::CircuitBreakerRegistry;
//! use provider_guard_core::monitoring::{attach_metrics, InMemoryMetricsCollector};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let registry = CircuitBreakerRegistry::new();
//! let metrics = Arc::new(InMemoryMetricsCollector::new());
//! let _subscription = attach_metrics(&registry, metrics.clone());
//!
//! let _ = registry
//!     .get("openai")
//!     .execute(|| async { Ok::<_, std::io::Error>(()) })
//!     .await;
//!
//! assert_eq!(metrics.snapshot()["openai"].successes, 1);
//! # });
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::circuit_breaker::{
    CircuitBreakerEvent, CircuitBreakerEventType, CircuitBreakerRegistry, CircuitState,
    Subscription,
};
use crate::AiProvider;

/// Result of an attempted provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestOutcome {
    /// The call returned a value.
    Success,
    /// The call returned an error.
    Failure,
    /// The call exceeded the request timeout.
    Timeout,
}

/// Metrics collector for breaker activity.
///
/// All methods take `&self` to support `Arc<dyn MetricsCollector>` sharing
/// across async tasks. Implementations must be thread-safe and must never
/// panic or block for long; they run inline with gated calls.
#[cfg_attr(test, mockall::automock)]
pub trait MetricsCollector: Send + Sync {
    /// Record an attempted call.
    ///
    /// # Metrics Updated
    ///
    /// - `provider_requests_total{provider, outcome}`: Incremented by 1
    /// - `provider_request_duration_seconds{provider}`: Histogram observation
    fn record_request(
        &self,
        provider: &AiProvider,
        outcome: RequestOutcome,
        duration: Option<Duration>,
    );

    /// Record a call rejected by an open circuit.
    ///
    /// # Metrics Updated
    ///
    /// - `provider_rejections_total{provider}`: Incremented by 1
    fn record_rejection(&self, provider: &AiProvider);

    /// Record a breaker state.
    ///
    /// # Metrics Updated
    ///
    /// - `circuit_breaker_state{provider}`: Gauge set to [`CircuitState::as_gauge`]
    fn record_circuit_breaker_state(&self, provider: &AiProvider, state: CircuitState);
}

/// No-op metrics collector for testing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetricsCollector;

impl MetricsCollector for NoOpMetricsCollector {
    fn record_request(
        &self,
        _provider: &AiProvider,
        _outcome: RequestOutcome,
        _duration: Option<Duration>,
    ) {
        // No-op
    }

    fn record_rejection(&self, _provider: &AiProvider) {
        // No-op
    }

    fn record_circuit_breaker_state(&self, _provider: &AiProvider, _state: CircuitState) {
        // No-op
    }
}

/// Per-provider counters kept by [`InMemoryMetricsCollector`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetrics {
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub rejections: u64,
    pub state_changes: u64,
    pub last_state: Option<CircuitState>,
    pub total_duration_ms: u64,
}

impl ProviderMetrics {
    /// Attempted calls (successes, failures and timeouts).
    pub fn attempts(&self) -> u64 {
        self.successes + self.failures + self.timeouts
    }

    /// Average duration of attempted calls in milliseconds.
    pub fn avg_duration_ms(&self) -> f64 {
        match self.attempts() {
            0 => 0.0,
            attempts => self.total_duration_ms as f64 / attempts as f64,
        }
    }
}

/// Collector that keeps counters in memory, for dashboards and tooling.
#[derive(Debug, Default)]
pub struct InMemoryMetricsCollector {
    providers: RwLock<BTreeMap<AiProvider, ProviderMetrics>>,
}

impl InMemoryMetricsCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, provider: &AiProvider, f: impl FnOnce(&mut ProviderMetrics)) {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(providers.entry(provider.clone()).or_default());
    }

    /// Copy of the current counters.
    pub fn snapshot(&self) -> BTreeMap<AiProvider, ProviderMetrics> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MetricsCollector for InMemoryMetricsCollector {
    fn record_request(
        &self,
        provider: &AiProvider,
        outcome: RequestOutcome,
        duration: Option<Duration>,
    ) {
        self.update(provider, |metrics| {
            match outcome {
                RequestOutcome::Success => metrics.successes += 1,
                RequestOutcome::Failure => metrics.failures += 1,
                RequestOutcome::Timeout => metrics.timeouts += 1,
            }
            if let Some(duration) = duration {
                let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
                metrics.total_duration_ms = metrics.total_duration_ms.saturating_add(ms);
            }
        });
    }

    fn record_rejection(&self, provider: &AiProvider) {
        self.update(provider, |metrics| metrics.rejections += 1);
    }

    fn record_circuit_breaker_state(&self, provider: &AiProvider, state: CircuitState) {
        self.update(provider, |metrics| {
            if metrics.last_state.is_some_and(|last| last != state) {
                metrics.state_changes += 1;
            }
            metrics.last_state = Some(state);
        });
    }
}

/// Translate one breaker event into collector calls.
pub fn record_event(collector: &dyn MetricsCollector, event: &CircuitBreakerEvent) {
    let duration = event.metadata.duration_ms.map(Duration::from_millis);
    match event.event_type {
        CircuitBreakerEventType::Success => {
            collector.record_request(&event.provider, RequestOutcome::Success, duration);
        }
        CircuitBreakerEventType::Failure => {
            let outcome = if event.metadata.timed_out {
                RequestOutcome::Timeout
            } else {
                RequestOutcome::Failure
            };
            collector.record_request(&event.provider, outcome, duration);
        }
        CircuitBreakerEventType::Rejected => collector.record_rejection(&event.provider),
        CircuitBreakerEventType::StateChange => {
            if let Some(previous) = event.previous_state {
                collector.record_circuit_breaker_state(&event.provider, previous);
            }
            collector.record_circuit_breaker_state(&event.provider, event.current_state);
        }
    }
}

/// Feed every event relayed by `registry` into `collector`.
pub fn attach_metrics(
    registry: &CircuitBreakerRegistry,
    collector: Arc<dyn MetricsCollector>,
) -> Subscription {
    registry.on_event(move |event| record_event(collector.as_ref(), event))
}

#[cfg(test)]
#[path = "monitoring_tests.rs"]
mod tests;
