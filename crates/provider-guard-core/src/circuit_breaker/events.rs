//! Breaker events and observer lists.
//!
//! Each breaker owns an [`EventListeners`] list. Subscribing returns a
//! [`Subscription`] token that removes the handler again. Handlers run
//! synchronously on the task that produced the event, after the breaker has
//! released its internal lock, so a handler may query the breaker freely.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use super::CircuitState;
use crate::{AiProvider, Timestamp};

/// Kind of breaker event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitBreakerEventType {
    /// A gated call completed successfully.
    Success,
    /// A gated call failed or timed out.
    Failure,
    /// The breaker moved between states.
    StateChange,
    /// A call was rejected without being attempted.
    Rejected,
}

/// Why a state change happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionReason {
    /// Windowed failures reached the failure threshold.
    FailureThreshold,
    /// A half-open probe failed.
    HalfOpenFailure,
    /// The reset timeout elapsed while open.
    ResetTimeoutElapsed,
    /// Half-open probes reached the success threshold.
    SuccessThreshold,
    /// Administrative override via `force_state`.
    Forced,
    /// Counters cleared via `reset`.
    Reset,
}

/// Optional event details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventMetadata {
    /// Display text of the operation error, or the timeout message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Wall time the gated call took.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Set when the failure was a request timeout.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,

    /// Cause of a state change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<TransitionReason>,
}

/// Something that happened on one breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerEvent {
    /// Event kind.
    #[serde(rename = "type")]
    pub event_type: CircuitBreakerEventType,

    /// Provider whose breaker produced the event.
    pub provider: AiProvider,

    /// State before a state change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<CircuitState>,

    /// State after the event.
    pub current_state: CircuitState,

    /// When the event happened, per the breaker's clock.
    pub timestamp: Timestamp,

    /// Additional details.
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl CircuitBreakerEvent {
    pub(crate) fn success(
        provider: &AiProvider,
        current_state: CircuitState,
        timestamp: Timestamp,
        duration_ms: u64,
    ) -> Self {
        Self {
            event_type: CircuitBreakerEventType::Success,
            provider: provider.clone(),
            previous_state: None,
            current_state,
            timestamp,
            metadata: EventMetadata {
                duration_ms: Some(duration_ms),
                ..EventMetadata::default()
            },
        }
    }

    pub(crate) fn failure(
        provider: &AiProvider,
        current_state: CircuitState,
        timestamp: Timestamp,
        error: String,
        duration_ms: u64,
        timed_out: bool,
    ) -> Self {
        Self {
            event_type: CircuitBreakerEventType::Failure,
            provider: provider.clone(),
            previous_state: None,
            current_state,
            timestamp,
            metadata: EventMetadata {
                error: Some(error),
                duration_ms: Some(duration_ms),
                timed_out,
                reason: None,
            },
        }
    }

    pub(crate) fn state_change(
        provider: &AiProvider,
        previous_state: CircuitState,
        current_state: CircuitState,
        timestamp: Timestamp,
        reason: TransitionReason,
    ) -> Self {
        Self {
            event_type: CircuitBreakerEventType::StateChange,
            provider: provider.clone(),
            previous_state: Some(previous_state),
            current_state,
            timestamp,
            metadata: EventMetadata {
                reason: Some(reason),
                ..EventMetadata::default()
            },
        }
    }

    pub(crate) fn rejected(
        provider: &AiProvider,
        current_state: CircuitState,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            event_type: CircuitBreakerEventType::Rejected,
            provider: provider.clone(),
            previous_state: None,
            current_state,
            timestamp,
            metadata: EventMetadata::default(),
        }
    }
}

// ============================================================================
// Observer list
// ============================================================================

/// Shared event callback.
pub type EventHandler = Arc<dyn Fn(&CircuitBreakerEvent) + Send + Sync>;

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    handlers: Vec<(u64, EventHandler)>,
}

/// Observer list with unsubscribe tokens.
#[derive(Clone, Default)]
pub(crate) struct EventListeners {
    table: Arc<RwLock<ListenerTable>>,
}

impl EventListeners {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(&self, handler: EventHandler) -> Subscription {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let id = table.next_id;
        table.next_id += 1;
        table.handlers.push((id, handler));

        Subscription {
            table: Arc::downgrade(&self.table),
            id,
        }
    }

    /// Deliver `event` to every handler registered at the time of the call.
    pub(crate) fn emit(&self, event: &CircuitBreakerEvent) {
        // Snapshot so handlers can subscribe or unsubscribe while being called.
        let handlers: Vec<EventHandler> = {
            let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
            table
                .handlers
                .iter()
                .map(|(_, handler)| Arc::clone(handler))
                .collect()
        };

        for handler in handlers {
            handler(event);
        }
    }

    pub(crate) fn emit_all(&self, events: &[CircuitBreakerEvent]) {
        for event in events {
            self.emit(event);
        }
    }

    pub(crate) fn clear(&self) {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .len()
    }
}

impl fmt::Debug for EventListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("handlers", &self.len())
            .finish()
    }
}

/// Token returned by `on_event`; call [`Subscription::unsubscribe`] to stop
/// receiving events.
///
/// Dropping the token does not unsubscribe.
pub struct Subscription {
    table: Weak<RwLock<ListenerTable>>,
    id: u64,
}

impl Subscription {
    /// Remove the handler.
    ///
    /// Returns `false` if the handler was already gone (for example because
    /// the owning breaker was destroyed).
    pub fn unsubscribe(self) -> bool {
        let Some(table) = self.table.upgrade() else {
            return false;
        };
        let mut table = table.write().unwrap_or_else(PoisonError::into_inner);
        let before = table.handlers.len();
        table.handlers.retain(|(id, _)| *id != self.id);
        table.handlers.len() != before
    }

    /// Check if the handler is still registered.
    pub fn is_active(&self) -> bool {
        self.table.upgrade().is_some_and(|table| {
            table
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .handlers
                .iter()
                .any(|(id, _)| *id == self.id)
        })
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
