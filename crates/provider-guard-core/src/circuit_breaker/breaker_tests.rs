//! Tests for the circuit breaker implementation.
//!
//! These tests verify the complete behavior of the CircuitBreaker including
//! state transitions, windowed failure accounting, timeouts, events, and
//! thread safety.

use super::*;
use crate::circuit_breaker::{CircuitBreakerEventType, DEFAULT_CONFIG};
use crate::clock::ManualClock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

// ============================================================================
// Helper Functions
// ============================================================================

fn test_config(failure_threshold: u32, success_threshold: u32) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold,
        reset_timeout: Duration::from_secs(30),
        success_threshold,
        monitoring_window: Duration::from_secs(60),
        request_timeout: Duration::from_secs(1),
    }
}

/// Create test circuit breaker driven by a manual clock.
fn create_test_breaker(
    failure_threshold: u32,
    success_threshold: u32,
) -> (CircuitBreaker, ManualClock) {
    let clock = ManualClock::new();
    let breaker = CircuitBreaker::with_clock(
        "test-provider",
        test_config(failure_threshold, success_threshold),
        Arc::new(clock.clone()),
    );
    (breaker, clock)
}

/// Collect every event the breaker emits.
fn record_events(breaker: &CircuitBreaker) -> Arc<Mutex<Vec<CircuitBreakerEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    breaker.on_event(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

async fn successful_operation() -> Result<String, String> {
    Ok("success".to_string())
}

async fn failing_operation() -> Result<String, String> {
    Err("failure".to_string())
}

/// Slow operation that outlives the request timeout
async fn slow_operation() -> Result<String, String> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Ok("too slow".to_string())
}

async fn trip(breaker: &CircuitBreaker, failures: u32) {
    for _ in 0..failures {
        let _ = breaker.execute(failing_operation).await;
    }
}

// ============================================================================
// Basic State Tests
// ============================================================================

mod basic_state_tests {
    use super::*;

    #[test]
    fn test_new_breaker_is_closed_with_empty_counters() {
        let (breaker, _clock) = create_test_breaker(3, 2);
        let stats = breaker.stats();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(stats.provider.as_str(), "test-provider");
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.successes, 0);
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.total_failures, 0);
        assert_eq!(stats.failure_rate, 0.0);
        assert!(stats.last_success.is_none());
        assert!(stats.last_failure.is_none());
        assert!(stats.next_attempt.is_none());
        assert!(breaker.can_execute());
    }

    #[tokio::test]
    async fn test_closed_state_passes_results_through() {
        let (breaker, _clock) = create_test_breaker(3, 2);

        let result = breaker.execute(successful_operation).await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(breaker.state(), CircuitState::Closed);
        let stats = breaker.stats();
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.consecutive_successes, 1);
        assert!(stats.last_success.is_some());
    }

    /// The operation's own error comes back unchanged.
    #[tokio::test]
    async fn test_operation_error_is_returned_unchanged() {
        let (breaker, _clock) = create_test_breaker(3, 2);

        let result = breaker.execute(failing_operation).await;

        match result {
            Err(CircuitBreakerError::Operation(error)) => assert_eq!(error, "failure"),
            other => panic!("Expected operation error, got {:?}", other),
        }
        let stats = breaker.stats();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.total_failures, 1);
        assert_eq!(stats.consecutive_failures, 1);
        assert!(stats.last_failure.is_some());
    }

    /// 3 successes + 2 failures give a 0.4 failure rate.
    #[tokio::test]
    async fn test_failure_rate_calculation() {
        let (breaker, _clock) = create_test_breaker(10, 2);

        for _ in 0..3 {
            let _ = breaker.execute(successful_operation).await;
        }
        trip(&breaker, 2).await;

        let stats = breaker.stats();
        assert_eq!(stats.total_requests, 5);
        assert_eq!(stats.total_failures, 2);
        assert!((stats.failure_rate - 0.4).abs() < f64::EPSILON);
        assert!((stats.success_rate() - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let (breaker, _clock) = create_test_breaker(5, 2);

        trip(&breaker, 3).await;
        assert_eq!(breaker.stats().consecutive_failures, 3);

        let _ = breaker.execute(successful_operation).await;

        let stats = breaker.stats();
        assert_eq!(stats.consecutive_failures, 0);
        // Windowed failures are not cleared by a success
        assert_eq!(stats.failures, 3);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}

// ============================================================================
// Circuit Tripping Tests
// ============================================================================

mod circuit_tripping_tests {
    use super::*;

    #[tokio::test]
    async fn test_failures_at_threshold_open_circuit() {
        let (breaker, _clock) = create_test_breaker(3, 2);

        trip(&breaker, 2).await;
        assert_eq!(breaker.state(), CircuitState::Closed);

        trip(&breaker, 1).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.stats().next_attempt.is_some());
    }

    /// The fourth call is rejected and the operation never runs.
    #[tokio::test]
    async fn test_open_state_rejects_without_invoking_operation() {
        let (breaker, _clock) = create_test_breaker(3, 2);
        trip(&breaker, 3).await;

        let invocations = AtomicU32::new(0);
        let result = breaker
            .execute(|| {
                invocations.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, String>("unreachable") }
            })
            .await;

        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        match result {
            Err(CircuitBreakerError::CircuitOpen { provider, state }) => {
                assert_eq!(provider.as_str(), "test-provider");
                assert_eq!(state, CircuitState::Open);
            }
            other => panic!("Expected circuit open rejection, got {:?}", other),
        }

        let stats = breaker.stats();
        assert_eq!(stats.rejected_requests, 1);
        // Rejections are not attempts
        assert_eq!(stats.total_requests, 3);
        assert!(!breaker.can_execute());
    }

    /// Failures older than the monitoring window do not count.
    #[tokio::test]
    async fn test_failures_outside_window_expire() {
        let (breaker, clock) = create_test_breaker(3, 2);

        trip(&breaker, 2).await;
        assert_eq!(breaker.stats().failures, 2);

        clock.advance(Duration::from_secs(61));

        let stats = breaker.stats();
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.total_failures, 2);

        // One more failure is now 1 of 3, not 3 of 3
        trip(&breaker, 1).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_failures_spread_inside_window_open_circuit() {
        let (breaker, clock) = create_test_breaker(3, 2);

        trip(&breaker, 2).await;
        clock.advance(Duration::from_secs(40));
        trip(&breaker, 1).await;

        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_window_slides_per_failure() {
        let (breaker, clock) = create_test_breaker(3, 2);

        trip(&breaker, 1).await;
        clock.advance(Duration::from_secs(40));
        trip(&breaker, 1).await;
        clock.advance(Duration::from_secs(30));
        // The first failure is 70s old by now
        trip(&breaker, 1).await;

        assert_eq!(breaker.stats().failures, 2);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    /// An entry exactly one window old has expired.
    #[tokio::test]
    async fn test_window_boundary_is_exclusive() {
        let (breaker, clock) = create_test_breaker(3, 2);

        trip(&breaker, 1).await;
        clock.advance(Duration::from_secs(60));

        assert_eq!(breaker.stats().failures, 0);
    }

    /// A failure recorded while open is counted but does not re-open.
    #[tokio::test]
    async fn test_failure_while_open_is_counted_only() {
        let (breaker, _clock) = create_test_breaker(10, 2);
        let events = record_events(&breaker);

        breaker.force_state(CircuitState::Open);
        let opened_at = breaker.stats().opened_at;
        let state = breaker.record_failure("late failure".to_string(), 5, false);

        assert_eq!(state, CircuitState::Open);
        let stats = breaker.stats();
        assert_eq!(stats.total_failures, 1);
        assert_eq!(stats.opened_at, opened_at);

        let state_changes = events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.event_type == CircuitBreakerEventType::StateChange)
            .count();
        assert_eq!(state_changes, 1);
    }

    #[tokio::test]
    async fn test_zero_threshold_behaves_as_one() {
        let (breaker, _clock) = create_test_breaker(0, 0);

        trip(&breaker, 1).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}

// ============================================================================
// Half-Open State Tests
// ============================================================================

mod half_open_tests {
    use super::*;

    #[test]
    fn test_forced_open_moves_to_half_open_after_reset_timeout() {
        let (breaker, clock) = create_test_breaker(3, 2);

        breaker.force_state(CircuitState::Open);
        assert!(!breaker.can_execute());

        clock.advance(Duration::from_secs(29));
        assert!(!breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(1));
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    /// The transition is lazy: nothing happens until the breaker is consulted.
    #[test]
    fn test_recovery_is_not_timer_driven() {
        let (breaker, clock) = create_test_breaker(3, 2);

        breaker.force_state(CircuitState::Open);
        clock.advance(Duration::from_secs(300));

        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_execute_after_reset_timeout_probes() {
        let (breaker, clock) = create_test_breaker(3, 2);
        let events = record_events(&breaker);
        trip(&breaker, 3).await;

        clock.advance(Duration::from_secs(30));
        let result = breaker.execute(successful_operation).await;

        assert!(result.is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let events = events.lock().unwrap();
        let half_open = events
            .iter()
            .find(|event| event.current_state == CircuitState::HalfOpen)
            .expect("Expected a half-open transition");
        assert_eq!(half_open.event_type, CircuitBreakerEventType::StateChange);
        assert_eq!(half_open.previous_state, Some(CircuitState::Open));
        assert_eq!(
            half_open.metadata.reason,
            Some(TransitionReason::ResetTimeoutElapsed)
        );
    }

    #[tokio::test]
    async fn test_success_threshold_closes_circuit() {
        let (breaker, _clock) = create_test_breaker(3, 2);
        breaker.force_state(CircuitState::HalfOpen);

        let _ = breaker.execute(successful_operation).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let _ = breaker.execute(successful_operation).await;
        assert_eq!(breaker.state(), CircuitState::Closed);

        let stats = breaker.stats();
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.consecutive_successes, 0);
    }

    #[tokio::test]
    async fn test_failure_in_half_open_reopens() {
        let (breaker, clock) = create_test_breaker(3, 2);
        breaker.force_state(CircuitState::HalfOpen);

        let _ = breaker.execute(successful_operation).await;
        let result = breaker.execute(failing_operation).await;

        assert!(matches!(result, Err(CircuitBreakerError::Operation(_))));
        assert_eq!(breaker.state(), CircuitState::Open);

        // The reset timeout restarts from the re-open
        clock.advance(Duration::from_secs(29));
        assert!(!breaker.can_execute());
        clock.advance(Duration::from_secs(1));
        assert!(breaker.can_execute());
    }

    /// Half-open success count restarts after a failure.
    #[tokio::test]
    async fn test_half_open_requires_consecutive_successes() {
        let (breaker, clock) = create_test_breaker(3, 2);
        breaker.force_state(CircuitState::HalfOpen);

        let _ = breaker.execute(successful_operation).await;
        let _ = breaker.execute(failing_operation).await;
        clock.advance(Duration::from_secs(30));
        let _ = breaker.execute(successful_operation).await;

        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.stats().consecutive_successes, 1);
    }
}

// ============================================================================
// Timeout Tests
// ============================================================================

mod timeout_tests {
    use super::*;

    /// The caller hears about the timeout at the deadline, not when the
    /// operation would have finished.
    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_at_deadline() {
        let clock = ManualClock::new();
        let breaker = CircuitBreaker::with_clock(
            "slow-provider",
            CircuitBreakerConfig {
                request_timeout: Duration::from_millis(100),
                ..DEFAULT_CONFIG
            },
            Arc::new(clock),
        );

        let start = tokio::time::Instant::now();
        let result = breaker.execute(slow_operation).await;
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(2000));
        match result {
            Err(CircuitBreakerError::Timeout {
                provider,
                timeout_ms,
                state,
            }) => {
                assert_eq!(provider.as_str(), "slow-provider");
                assert_eq!(timeout_ms, 100);
                assert_eq!(state, CircuitState::Closed);
            }
            other => panic!("Expected timeout error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let (breaker, _clock) = create_test_breaker(2, 2);
        let events = record_events(&breaker);

        let first = breaker.execute(slow_operation).await;
        assert!(first.as_ref().is_err_and(|error| error.is_timeout()));

        let stats = breaker.stats();
        assert_eq!(stats.total_failures, 1);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.consecutive_failures, 1);

        // The second timeout trips the circuit and the error reports it
        let second = breaker.execute(slow_operation).await;
        assert_eq!(
            second.as_ref().err().and_then(|error| error.state()),
            Some(CircuitState::Open)
        );

        let events = events.lock().unwrap();
        let failure = events
            .iter()
            .find(|event| event.event_type == CircuitBreakerEventType::Failure)
            .expect("Expected a failure event");
        assert!(failure.metadata.timed_out);
        assert_eq!(
            failure.metadata.error.as_deref(),
            Some("Request timed out after 1000ms")
        );
    }

    /// The abandoned operation is dropped, not left running.
    #[tokio::test(start_paused = true)]
    async fn test_timed_out_operation_is_cancelled() {
        let (breaker, _clock) = create_test_breaker(5, 2);
        let completed = Arc::new(AtomicU32::new(0));

        let marker = Arc::clone(&completed);
        let result = breaker
            .execute(|| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                marker.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 0);
    }
}

// ============================================================================
// Event Tests
// ============================================================================

mod event_tests {
    use super::*;

    #[tokio::test]
    async fn test_success_and_failure_events() {
        let (breaker, _clock) = create_test_breaker(5, 2);
        let events = record_events(&breaker);

        let _ = breaker.execute(successful_operation).await;
        let _ = breaker.execute(failing_operation).await;

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, CircuitBreakerEventType::Success);
        assert_eq!(events[1].event_type, CircuitBreakerEventType::Failure);
        assert_eq!(events[1].metadata.error.as_deref(), Some("failure"));
        assert!(!events[1].metadata.timed_out);
        assert!(events
            .iter()
            .all(|event| event.provider.as_str() == "test-provider"));
    }

    /// Tripping emits the failure first, then the state change.
    #[tokio::test]
    async fn test_trip_emits_failure_then_state_change() {
        let (breaker, _clock) = create_test_breaker(1, 2);
        let events = record_events(&breaker);

        let _ = breaker.execute(failing_operation).await;
        let _ = breaker.execute(successful_operation).await;

        let kinds: Vec<_> = events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.event_type)
            .collect();
        assert_eq!(
            kinds,
            vec![
                CircuitBreakerEventType::Failure,
                CircuitBreakerEventType::StateChange,
                CircuitBreakerEventType::Rejected,
            ]
        );
    }

    #[test]
    fn test_force_state_emits_explicit_transition() {
        let (breaker, _clock) = create_test_breaker(3, 2);
        let events = record_events(&breaker);

        breaker.force_state(CircuitState::Open);
        breaker.force_state(CircuitState::Open);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].previous_state, Some(CircuitState::Closed));
        assert_eq!(events[0].current_state, CircuitState::Open);
        assert_eq!(events[0].metadata.reason, Some(TransitionReason::Forced));
        assert_eq!(events[1].previous_state, Some(CircuitState::Open));
    }

    /// Events arrive in completion order, not start order.
    #[tokio::test(start_paused = true)]
    async fn test_events_follow_completion_order() {
        let (breaker, _clock) = create_test_breaker(5, 2);
        let events = record_events(&breaker);

        let slow = breaker.execute(|| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, String>("slow")
        });
        let fast = breaker.execute(|| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err::<&str, _>("fast failure".to_string())
        });
        let (slow_result, fast_result) = tokio::join!(slow, fast);
        assert!(slow_result.is_ok());
        assert!(fast_result.is_err());

        let kinds: Vec<_> = events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.event_type)
            .collect();
        assert_eq!(
            kinds,
            vec![
                CircuitBreakerEventType::Failure,
                CircuitBreakerEventType::Success
            ]
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_events() {
        let (breaker, _clock) = create_test_breaker(5, 2);
        let count = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&count);
        let subscription = breaker.on_event(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let _ = breaker.execute(successful_operation).await;
        assert!(subscription.unsubscribe());
        let _ = breaker.execute(successful_operation).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.listener_count(), 0);
    }

    /// Handlers may read the breaker that is notifying them.
    #[tokio::test]
    async fn test_handler_can_query_breaker() {
        let (breaker, _clock) = create_test_breaker(1, 2);
        let breaker = Arc::new(breaker);
        let observed = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&breaker);
        let sink = Arc::clone(&observed);
        breaker.on_event(move |_| {
            if let Some(breaker) = weak.upgrade() {
                sink.lock().unwrap().push(breaker.stats().state);
            }
        });

        let _ = breaker.execute(failing_operation).await;

        assert_eq!(
            *observed.lock().unwrap(),
            vec![CircuitState::Open, CircuitState::Open]
        );
    }

    #[tokio::test]
    async fn test_destroy_clears_listeners() {
        let (breaker, _clock) = create_test_breaker(5, 2);
        let events = record_events(&breaker);
        assert_eq!(breaker.listener_count(), 1);

        breaker.destroy();
        let _ = breaker.execute(successful_operation).await;

        assert_eq!(breaker.listener_count(), 0);
        assert!(events.lock().unwrap().is_empty());
    }
}

// ============================================================================
// Administrative Operation Tests
// ============================================================================

mod admin_tests {
    use super::*;

    #[tokio::test]
    async fn test_reset_clears_counters_and_closes() {
        let (breaker, _clock) = create_test_breaker(2, 2);
        let events = record_events(&breaker);
        trip(&breaker, 2).await;
        let _ = breaker.execute(successful_operation).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();

        assert_eq!(breaker.state(), CircuitState::Closed);
        let stats = breaker.stats();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.total_failures, 0);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.rejected_requests, 0);
        assert!(stats.last_failure.is_none());

        let last = events
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("Expected events");
        assert_eq!(last.metadata.reason, Some(TransitionReason::Reset));
        assert_eq!(last.previous_state, Some(CircuitState::Open));
    }

    #[test]
    fn test_reset_of_closed_breaker_emits_nothing() {
        let (breaker, _clock) = create_test_breaker(2, 2);
        let events = record_events(&breaker);

        breaker.reset();

        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_keeps_configuration() {
        let (breaker, _clock) = create_test_breaker(2, 2);
        breaker.update_config(&CircuitBreakerConfigUpdate {
            failure_threshold: Some(7),
            ..Default::default()
        });

        breaker.reset();

        assert_eq!(breaker.config().failure_threshold, 7);
    }

    /// Updating the configuration keeps existing counters.
    #[tokio::test]
    async fn test_update_config_keeps_counters() {
        let (breaker, _clock) = create_test_breaker(5, 2);
        trip(&breaker, 2).await;

        breaker.update_config(&CircuitBreakerConfigUpdate {
            failure_threshold: Some(3),
            ..Default::default()
        });

        assert_eq!(breaker.stats().failures, 2);
        assert_eq!(breaker.config().failure_threshold, 3);
        assert_eq!(breaker.config().success_threshold, 2);

        trip(&breaker, 1).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_update_config_applies_new_reset_timeout() {
        let (breaker, clock) = create_test_breaker(3, 2);
        breaker.force_state(CircuitState::Open);

        breaker.update_config(&CircuitBreakerConfigUpdate {
            reset_timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        clock.advance(Duration::from_secs(5));

        assert!(breaker.can_execute());
    }

    #[test]
    fn test_force_closed_clears_failure_window() {
        let (breaker, _clock) = create_test_breaker(3, 2);
        breaker.record_failure("x".to_string(), 0, false);
        breaker.record_failure("y".to_string(), 0, false);

        breaker.force_state(CircuitState::Closed);

        assert_eq!(breaker.stats().failures, 0);
        assert_eq!(breaker.stats().total_failures, 2);
    }
}

// ============================================================================
// Thread Safety Tests
// ============================================================================

mod thread_safety_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_keep_counters_consistent() {
        let (breaker, _clock) = create_test_breaker(1000, 2);
        let breaker = Arc::new(breaker);
        let mut handles = vec![];

        for i in 0..100 {
            let breaker_clone = Arc::clone(&breaker);
            handles.push(tokio::spawn(async move {
                if i % 4 == 0 {
                    breaker_clone.execute(failing_operation).await
                } else {
                    breaker_clone.execute(successful_operation).await
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }

        let stats = breaker.stats();
        assert_eq!(stats.total_requests, 100);
        assert_eq!(stats.total_failures, 25);
        assert_eq!(stats.failures + stats.successes, 100);
        assert_eq!(stats.state, CircuitState::Closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_trip_exactly_once() {
        let (breaker, _clock) = create_test_breaker(5, 2);
        let breaker = Arc::new(breaker);
        let opened = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&opened);
        breaker.on_event(move |event| {
            if event.event_type == CircuitBreakerEventType::StateChange
                && event.current_state == CircuitState::Open
            {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let mut handles = vec![];
        for _ in 0..20 {
            let breaker_clone = Arc::clone(&breaker);
            handles.push(tokio::spawn(async move {
                breaker_clone.execute(failing_operation).await
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }

        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(stats.total_failures + stats.rejected_requests, 20);
    }
}
