//! Registry owning one circuit breaker per AI provider.
//!
//! Breakers are created lazily on first [`get`](CircuitBreakerRegistry::get)
//! and cached, so every caller asking for the same provider shares one
//! breaker. The registry subscribes to each breaker it creates and relays
//! the events to its own listeners.
//!
//! Construct one registry per fleet and pass it to the code that calls
//! providers. There is no process-wide instance.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use super::events::{EventListeners, Subscription};
use super::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigUpdate, CircuitBreakerEvent,
    CircuitBreakerStats, CircuitBreakerSummary, CircuitState, DEFAULT_CONFIG,
};
use crate::clock::{system_clock, SharedClock};
use crate::AiProvider;

/// Registry mapping provider ids to their circuit breakers.
///
/// # Examples
///
/// ```rust
/// use provider_guard_core::circuit_breaker::{CircuitBreakerRegistry, CircuitState};
/// use std::sync::Arc;
///
/// let registry = CircuitBreakerRegistry::new();
/// let openai = registry.get("openai");
/// assert!(Arc::ptr_eq(&openai, &registry.get("openai")));
///
/// openai.force_state(CircuitState::Open);
/// assert!(!registry.is_available("openai"));
/// assert!(registry.is_available("mistral")); // never registered
/// ```
pub struct CircuitBreakerRegistry {
    config: RwLock<CircuitBreakerConfig>,
    clock: SharedClock,
    breakers: RwLock<BTreeMap<AiProvider, Arc<CircuitBreaker>>>,
    known_providers: RwLock<BTreeSet<AiProvider>>,
    listeners: EventListeners,
}

impl CircuitBreakerRegistry {
    /// Create an empty registry using [`DEFAULT_CONFIG`].
    pub fn new() -> Self {
        Self::with_config(DEFAULT_CONFIG)
    }

    /// Create an empty registry whose breakers use `config`.
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    /// Create an empty registry whose breakers read time from `clock`.
    pub fn with_clock(config: CircuitBreakerConfig, clock: SharedClock) -> Self {
        Self {
            config: RwLock::new(config),
            clock,
            breakers: RwLock::new(BTreeMap::new()),
            known_providers: RwLock::new(BTreeSet::new()),
            listeners: EventListeners::new(),
        }
    }

    /// Declare the provider fleet up front. Returns `self` for chaining.
    pub fn with_known_providers<I, P>(self, providers: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<AiProvider>,
    {
        self.declare_providers(providers);
        self
    }

    /// Record providers that belong to the fleet without creating breakers.
    ///
    /// Declared providers appear in [`available_providers`](Self::available_providers)
    /// even before any call was made to them.
    pub fn declare_providers<I, P>(&self, providers: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<AiProvider>,
    {
        let mut known = self
            .known_providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        known.extend(providers.into_iter().map(Into::into));
    }

    /// Configuration used for breakers created from now on.
    pub fn config(&self) -> CircuitBreakerConfig {
        *self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the breaker for `provider`, creating it on first use.
    ///
    /// Repeated calls return the same `Arc`.
    pub fn get(&self, provider: impl AsRef<str>) -> Arc<CircuitBreaker> {
        self.get_or_create(provider.as_ref(), None)
    }

    /// Get the breaker for `provider`, creating it with `overrides` merged
    /// over the registry configuration if it does not exist yet.
    ///
    /// Overrides are ignored for an already registered provider.
    pub fn get_with_config(
        &self,
        provider: impl AsRef<str>,
        overrides: &CircuitBreakerConfigUpdate,
    ) -> Arc<CircuitBreaker> {
        self.get_or_create(provider.as_ref(), Some(overrides))
    }

    fn get_or_create(
        &self,
        provider: &str,
        overrides: Option<&CircuitBreakerConfigUpdate>,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.lookup(provider) {
            return existing;
        }

        let mut breakers = self
            .breakers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Another caller may have inserted while we waited for the write lock.
        if let Some(existing) = breakers.get(provider) {
            return Arc::clone(existing);
        }

        let base = self.config();
        let config = overrides.map_or(base, |update| update.apply_to(&base));
        let breaker = Arc::new(CircuitBreaker::with_clock(
            provider,
            config,
            Arc::clone(&self.clock),
        ));

        let relay = self.listeners.clone();
        // The relay lives as long as the breaker; destroy() clears it.
        let _relay_subscription = breaker.on_event(move |event| relay.emit(event));

        debug!(provider = %provider, config = ?config, "Circuit breaker registered");
        breakers.insert(AiProvider::from(provider), Arc::clone(&breaker));
        breaker
    }

    fn lookup(&self, provider: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider)
            .cloned()
    }

    fn snapshot(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Check whether a breaker exists for `provider`.
    pub fn contains(&self, provider: impl AsRef<str>) -> bool {
        self.lookup(provider.as_ref()).is_some()
    }

    /// Providers with a registered breaker, sorted.
    pub fn providers(&self) -> Vec<AiProvider> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Number of registered breakers.
    pub fn len(&self) -> usize {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if no breaker is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Statistics for every registered breaker.
    pub fn all_stats(&self) -> BTreeMap<AiProvider, CircuitBreakerStats> {
        self.snapshot()
            .into_iter()
            .map(|breaker| (breaker.provider().clone(), breaker.stats()))
            .collect()
    }

    /// Breaker counts by state.
    pub fn summary(&self) -> CircuitBreakerSummary {
        let mut summary = CircuitBreakerSummary::default();
        for breaker in self.snapshot() {
            let state = breaker.state();
            summary.total += 1;
            match state {
                CircuitState::Closed => summary.closed += 1,
                CircuitState::Open => summary.open += 1,
                CircuitState::HalfOpen => summary.half_open += 1,
            }
            summary.providers.insert(breaker.provider().clone(), state);
        }
        summary
    }

    /// Check if `provider`'s breaker is not open.
    ///
    /// Unknown providers are optimistically available. This is a plain read:
    /// an open breaker whose reset timeout has elapsed stays unavailable until
    /// [`CircuitBreaker::can_execute`] or [`CircuitBreaker::execute`] moves it
    /// to half-open.
    pub fn is_available(&self, provider: impl AsRef<str>) -> bool {
        self.lookup(provider.as_ref())
            .map_or(true, |breaker| breaker.state() != CircuitState::Open)
    }

    /// Declared and registered providers that are not open, sorted.
    pub fn available_providers(&self) -> Vec<AiProvider> {
        let mut candidates: BTreeSet<AiProvider> = self
            .known_providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        candidates.extend(self.providers());

        candidates
            .into_iter()
            .filter(|provider| self.is_available(provider))
            .collect()
    }

    /// Filter `candidates` down to the available ones, keeping their order.
    pub fn available_providers_among<I, P>(&self, candidates: I) -> Vec<AiProvider>
    where
        I: IntoIterator<Item = P>,
        P: Into<AiProvider>,
    {
        candidates
            .into_iter()
            .map(Into::into)
            .filter(|provider| self.is_available(provider))
            .collect()
    }

    /// Subscribe to events from every breaker in this registry.
    pub fn on_event<H>(&self, handler: H) -> Subscription
    where
        H: Fn(&CircuitBreakerEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(Arc::new(handler))
    }

    /// Reset every registered breaker.
    pub fn reset_all(&self) {
        let breakers = self.snapshot();
        info!(count = breakers.len(), "Resetting all circuit breakers");
        for breaker in breakers {
            breaker.reset();
        }
    }

    /// Apply `update` to every registered breaker and to future ones.
    pub fn update_config(&self, update: &CircuitBreakerConfigUpdate) {
        {
            let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
            *config = update.apply_to(&config);
        }
        for breaker in self.snapshot() {
            breaker.update_config(update);
        }
    }

    /// Destroy every breaker, empty the registry, and drop its listeners.
    pub fn destroy(&self) {
        let breakers = std::mem::take(
            &mut *self
                .breakers
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for breaker in breakers.values() {
            breaker.destroy();
        }
        self.listeners.clear();
        debug!(count = breakers.len(), "Circuit breaker registry destroyed");
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("config", &self.config())
            .field("providers", &self.providers())
            .field("listeners", &self.listeners)
            .finish()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
