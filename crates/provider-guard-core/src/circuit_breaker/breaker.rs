//! Default circuit breaker implementation.
//!
//! All counters and the current state live behind one `RwLock`. Every
//! read-modify-write happens inside a single lock acquisition, and the lock
//! is never held across an `.await` or while event handlers run.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;

use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use super::events::{EventListeners, Subscription};
use super::{
    CircuitBreakerConfig, CircuitBreakerConfigUpdate, CircuitBreakerError, CircuitBreakerEvent,
    CircuitBreakerStats, CircuitState, TransitionReason,
};
use crate::clock::{system_clock, SharedClock};
use crate::{AiProvider, Timestamp};

// ============================================================================
// Internal State
// ============================================================================

#[derive(Debug)]
struct InternalState {
    config: CircuitBreakerConfig,

    current_state: CircuitState,

    /// Failure times inside the monitoring window, oldest first
    failure_window: VecDeque<Timestamp>,

    /// Success times inside the monitoring window, oldest first
    success_window: VecDeque<Timestamp>,

    consecutive_failures: u32,
    consecutive_successes: u32,

    total_requests: u64,
    total_failures: u64,
    rejected_requests: u64,
    timeouts: u64,

    last_success: Option<Timestamp>,
    last_failure: Option<Timestamp>,

    /// Set while the circuit is open
    opened_at: Option<Timestamp>,
}

impl InternalState {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            current_state: CircuitState::Closed,
            failure_window: VecDeque::new(),
            success_window: VecDeque::new(),
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_requests: 0,
            total_failures: 0,
            rejected_requests: 0,
            timeouts: 0,
            last_success: None,
            last_failure: None,
            opened_at: None,
        }
    }

    /// Drop window entries that are `monitoring_window` or more old.
    fn purge_expired(&mut self, now: Timestamp) {
        let window = self.config.monitoring_window;
        for entries in [&mut self.failure_window, &mut self.success_window] {
            while entries
                .front()
                .is_some_and(|at| now.saturating_duration_since(*at) >= window)
            {
                entries.pop_front();
            }
        }
    }

    fn next_attempt(&self) -> Option<Timestamp> {
        match self.current_state {
            CircuitState::Open => self
                .opened_at
                .map(|opened| opened.add_duration(self.config.reset_timeout)),
            _ => None,
        }
    }

    fn failure_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_failures as f64 / self.total_requests as f64
        }
    }
}

/// Whether a call may proceed.
enum Admission {
    Admitted { request_timeout: Duration },
    Rejected { state: CircuitState },
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Circuit Breaker
// ============================================================================

/// Circuit breaker guarding calls to one AI provider.
///
/// Thread-safe: share it behind an `Arc` and call [`execute`](Self::execute)
/// from as many tasks as needed. Events are emitted in completion order.
pub struct CircuitBreaker {
    provider: AiProvider,
    clock: SharedClock,
    state: RwLock<InternalState>,
    listeners: EventListeners,
}

impl CircuitBreaker {
    /// Create a closed breaker using the system clock.
    pub fn new(provider: impl Into<AiProvider>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(provider, config, system_clock())
    }

    /// Create a closed breaker reading time from `clock`.
    pub fn with_clock(
        provider: impl Into<AiProvider>,
        config: CircuitBreakerConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            provider: provider.into(),
            clock,
            state: RwLock::new(InternalState::new(config)),
            listeners: EventListeners::new(),
        }
    }

    /// Provider this breaker guards.
    pub fn provider(&self) -> &AiProvider {
        &self.provider
    }

    /// Current configuration.
    pub fn config(&self) -> CircuitBreakerConfig {
        self.read_state(|state| state.config)
    }

    fn lock(&self) -> RwLockWriteGuard<'_, InternalState> {
        // State is consistent between statements, so a poisoned lock is still usable.
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_state<R>(&self, f: impl FnOnce(&InternalState) -> R) -> R {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    fn transition(
        &self,
        state: &mut InternalState,
        to: CircuitState,
        reason: TransitionReason,
        now: Timestamp,
        events: &mut Vec<CircuitBreakerEvent>,
    ) {
        let from = state.current_state;
        state.current_state = to;

        match to {
            CircuitState::Open => {
                state.opened_at = Some(now);
                state.consecutive_successes = 0;
                warn!(
                    provider = %self.provider,
                    previous = %from,
                    reason = ?reason,
                    reset_timeout_ms = state.config.reset_timeout.as_millis() as u64,
                    "Circuit opened"
                );
            }
            CircuitState::HalfOpen => {
                state.opened_at = None;
                state.consecutive_successes = 0;
                info!(
                    provider = %self.provider,
                    previous = %from,
                    reason = ?reason,
                    "Circuit half-open, probing provider"
                );
            }
            CircuitState::Closed => {
                state.opened_at = None;
                state.failure_window.clear();
                state.consecutive_failures = 0;
                state.consecutive_successes = 0;
                info!(
                    provider = %self.provider,
                    previous = %from,
                    reason = ?reason,
                    "Circuit closed"
                );
            }
        }

        events.push(CircuitBreakerEvent::state_change(
            &self.provider,
            from,
            to,
            now,
            reason,
        ));
    }

    /// Move an open circuit to half-open once the reset timeout has elapsed.
    fn check_recovery(
        &self,
        state: &mut InternalState,
        now: Timestamp,
        events: &mut Vec<CircuitBreakerEvent>,
    ) {
        if state.current_state != CircuitState::Open {
            return;
        }
        // An open circuit without an opening time can always probe.
        let due = state
            .next_attempt()
            .map_or(true, |next_attempt| now >= next_attempt);
        if due {
            self.transition(
                state,
                CircuitState::HalfOpen,
                TransitionReason::ResetTimeoutElapsed,
                now,
                events,
            );
        }
    }

    fn admit(&self) -> Admission {
        let mut events = Vec::new();
        let admission = {
            let mut state = self.lock();
            let now = self.clock.now();
            state.purge_expired(now);
            self.check_recovery(&mut state, now, &mut events);

            if state.current_state == CircuitState::Open {
                state.rejected_requests += 1;
                events.push(CircuitBreakerEvent::rejected(
                    &self.provider,
                    state.current_state,
                    now,
                ));
                debug!(provider = %self.provider, "Request rejected by open circuit");
                Admission::Rejected {
                    state: state.current_state,
                }
            } else {
                Admission::Admitted {
                    request_timeout: state.config.request_timeout,
                }
            }
        };

        self.listeners.emit_all(&events);
        admission
    }

    fn record_success(&self, duration_ms: u64) {
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            let now = self.clock.now();
            state.purge_expired(now);

            state.total_requests += 1;
            state.success_window.push_back(now);
            state.last_success = Some(now);
            state.consecutive_failures = 0;
            state.consecutive_successes = state.consecutive_successes.saturating_add(1);

            events.push(CircuitBreakerEvent::success(
                &self.provider,
                state.current_state,
                now,
                duration_ms,
            ));

            if state.current_state == CircuitState::HalfOpen
                && state.consecutive_successes >= state.config.effective_success_threshold()
            {
                self.transition(
                    &mut state,
                    CircuitState::Closed,
                    TransitionReason::SuccessThreshold,
                    now,
                    &mut events,
                );
            }
        }

        self.listeners.emit_all(&events);
    }

    /// Record a failed attempt; returns the state after recording.
    fn record_failure(&self, error: String, duration_ms: u64, timed_out: bool) -> CircuitState {
        let mut events = Vec::new();
        let current = {
            let mut state = self.lock();
            let now = self.clock.now();
            state.purge_expired(now);

            state.total_requests += 1;
            state.total_failures += 1;
            if timed_out {
                state.timeouts += 1;
            }
            state.failure_window.push_back(now);
            state.last_failure = Some(now);
            state.consecutive_successes = 0;
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);

            events.push(CircuitBreakerEvent::failure(
                &self.provider,
                state.current_state,
                now,
                error,
                duration_ms,
                timed_out,
            ));

            match state.current_state {
                CircuitState::Closed => {
                    if state.failure_window.len() >= state.config.effective_failure_threshold() {
                        self.transition(
                            &mut state,
                            CircuitState::Open,
                            TransitionReason::FailureThreshold,
                            now,
                            &mut events,
                        );
                    }
                }
                CircuitState::HalfOpen => {
                    self.transition(
                        &mut state,
                        CircuitState::Open,
                        TransitionReason::HalfOpenFailure,
                        now,
                        &mut events,
                    );
                }
                CircuitState::Open => {
                    // Already open; counted only.
                }
            }

            state.current_state
        };

        self.listeners.emit_all(&events);
        current
    }

    // ------------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------------

    /// Run `operation` under circuit breaker protection.
    ///
    /// # Behavior
    ///
    /// - **Open** (reset timeout pending): rejects with
    ///   [`CircuitBreakerError::CircuitOpen`] without invoking `operation`
    /// - **Open** (reset timeout elapsed): moves to half-open, then proceeds
    /// - **Closed / Half-Open**: runs `operation` bounded by the request
    ///   timeout
    ///
    /// A timed-out operation is dropped, which cancels it at its next
    /// suspension point, and the caller receives
    /// [`CircuitBreakerError::Timeout`]. An operation error is counted and
    /// returned unchanged as [`CircuitBreakerError::Operation`].
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let request_timeout = match self.admit() {
            Admission::Admitted { request_timeout } => request_timeout,
            Admission::Rejected { state } => {
                return Err(CircuitBreakerError::CircuitOpen {
                    provider: self.provider.clone(),
                    state,
                });
            }
        };

        let start = Instant::now();
        match timeout(request_timeout, operation()).await {
            Ok(Ok(value)) => {
                self.record_success(elapsed_ms(start));
                Ok(value)
            }
            Ok(Err(error)) => {
                self.record_failure(error.to_string(), elapsed_ms(start), false);
                Err(CircuitBreakerError::Operation(error))
            }
            Err(_) => {
                let timeout_ms = u64::try_from(request_timeout.as_millis()).unwrap_or(u64::MAX);
                debug!(provider = %self.provider, timeout_ms, "Request timed out");
                let state = self.record_failure(
                    format!("Request timed out after {}ms", timeout_ms),
                    elapsed_ms(start),
                    true,
                );
                Err(CircuitBreakerError::Timeout {
                    provider: self.provider.clone(),
                    state,
                    timeout_ms,
                })
            }
        }
    }

    /// Check if a request would be admitted right now.
    ///
    /// An open circuit whose reset timeout has elapsed moves to half-open as
    /// a side effect.
    pub fn can_execute(&self) -> bool {
        let mut events = Vec::new();
        let allowed = {
            let mut state = self.lock();
            let now = self.clock.now();
            self.check_recovery(&mut state, now, &mut events);
            state.current_state.allows_requests()
        };

        self.listeners.emit_all(&events);
        allowed
    }

    /// Current state, without evaluating the reset timeout.
    pub fn state(&self) -> CircuitState {
        self.read_state(|state| state.current_state)
    }

    /// Snapshot of counters and state.
    pub fn stats(&self) -> CircuitBreakerStats {
        let mut state = self.lock();
        state.purge_expired(self.clock.now());

        CircuitBreakerStats {
            provider: self.provider.clone(),
            state: state.current_state,
            failures: u32::try_from(state.failure_window.len()).unwrap_or(u32::MAX),
            successes: u32::try_from(state.success_window.len()).unwrap_or(u32::MAX),
            total_requests: state.total_requests,
            total_failures: state.total_failures,
            failure_rate: state.failure_rate(),
            consecutive_failures: state.consecutive_failures,
            consecutive_successes: state.consecutive_successes,
            rejected_requests: state.rejected_requests,
            timeouts: state.timeouts,
            last_success: state.last_success,
            last_failure: state.last_failure,
            opened_at: state.opened_at,
            next_attempt: state.next_attempt(),
        }
    }

    /// Force the circuit into `target`, bypassing thresholds (admin operation).
    ///
    /// Always emits a state-change event, even when `target` is the current state.
    pub fn force_state(&self, target: CircuitState) {
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            let now = self.clock.now();
            self.transition(&mut state, target, TransitionReason::Forced, now, &mut events);
        }

        self.listeners.emit_all(&events);
    }

    /// Clear all counters and close the circuit (admin operation).
    pub fn reset(&self) {
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            let now = self.clock.now();
            let previous = state.current_state;
            let config = state.config;
            *state = InternalState::new(config);

            if previous != CircuitState::Closed {
                events.push(CircuitBreakerEvent::state_change(
                    &self.provider,
                    previous,
                    CircuitState::Closed,
                    now,
                    TransitionReason::Reset,
                ));
            }
        }

        info!(provider = %self.provider, "Circuit breaker reset");
        self.listeners.emit_all(&events);
    }

    /// Merge `update` into the configuration. Counters are kept.
    pub fn update_config(&self, update: &CircuitBreakerConfigUpdate) {
        let mut state = self.lock();
        state.config = update.apply_to(&state.config);
        debug!(
            provider = %self.provider,
            config = ?state.config,
            "Circuit breaker configuration updated"
        );
    }

    /// Subscribe to this breaker's events.
    pub fn on_event<H>(&self, handler: H) -> Subscription
    where
        H: Fn(&CircuitBreakerEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(Arc::new(handler))
    }

    /// Number of active event subscriptions.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Release listeners. The breaker must not be used afterwards.
    pub fn destroy(&self) {
        self.listeners.clear();
        debug!(provider = %self.provider, "Circuit breaker destroyed");
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("provider", &self.provider)
            .field("state", &self.state())
            .field("listeners", &self.listeners)
            .finish()
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
