//! Tests for metrics collection.

use super::*;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::clock::ManualClock;
use crate::Timestamp;
use mockall::predicate::{always, eq};

fn create_test_registry() -> CircuitBreakerRegistry {
    CircuitBreakerRegistry::with_clock(
        CircuitBreakerConfig {
            failure_threshold: 2,
            ..crate::circuit_breaker::DEFAULT_CONFIG
        },
        Arc::new(ManualClock::new()),
    )
}

mod no_op_tests {
    use super::*;

    #[test]
    fn test_no_op_collector_accepts_everything() {
        let collector = NoOpMetricsCollector;
        let provider = AiProvider::from("openai");

        collector.record_request(
            &provider,
            RequestOutcome::Success,
            Some(Duration::from_millis(5)),
        );
        collector.record_rejection(&provider);
        collector.record_circuit_breaker_state(&provider, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_no_op_collector_can_be_attached() {
        let registry = create_test_registry();
        let _subscription = attach_metrics(&registry, Arc::new(NoOpMetricsCollector));

        let result = registry
            .get("openai")
            .execute(|| async { Ok::<_, String>(1) })
            .await;

        assert_eq!(result.unwrap(), 1);
    }
}

mod in_memory_tests {
    use super::*;

    #[tokio::test]
    async fn test_attached_collector_counts_outcomes() {
        let registry = create_test_registry();
        let metrics = Arc::new(InMemoryMetricsCollector::new());
        let _subscription = attach_metrics(&registry, metrics.clone());
        let breaker = registry.get("openai");

        let _ = breaker.execute(|| async { Ok::<_, String>(()) }).await;
        for _ in 0..2 {
            let _ = breaker.execute(|| async { Err::<(), _>("boom") }).await;
        }
        let _ = breaker.execute(|| async { Ok::<_, String>(()) }).await;

        let snapshot = metrics.snapshot();
        let openai = &snapshot["openai"];
        assert_eq!(openai.successes, 1);
        assert_eq!(openai.failures, 2);
        assert_eq!(openai.rejections, 1);
        assert_eq!(openai.attempts(), 3);
        assert_eq!(openai.last_state, Some(CircuitState::Open));
        assert_eq!(openai.state_changes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_are_counted_separately() {
        let registry = create_test_registry();
        registry.update_config(&crate::circuit_breaker::CircuitBreakerConfigUpdate {
            request_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let metrics = Arc::new(InMemoryMetricsCollector::new());
        let _subscription = attach_metrics(&registry, metrics.clone());

        let _ = registry
            .get("anthropic")
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, String>(())
            })
            .await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot["anthropic"].timeouts, 1);
        assert_eq!(snapshot["anthropic"].failures, 0);
        assert!(snapshot["anthropic"].total_duration_ms >= 50);
    }

    #[test]
    fn test_average_duration() {
        let collector = InMemoryMetricsCollector::new();
        let provider = AiProvider::from("openai");

        collector.record_request(
            &provider,
            RequestOutcome::Success,
            Some(Duration::from_millis(10)),
        );
        collector.record_request(
            &provider,
            RequestOutcome::Failure,
            Some(Duration::from_millis(30)),
        );

        let snapshot = collector.snapshot();
        assert_eq!(snapshot["openai"].avg_duration_ms(), 20.0);
        assert_eq!(ProviderMetrics::default().avg_duration_ms(), 0.0);
    }

    #[test]
    fn test_repeated_state_is_not_a_change() {
        let collector = InMemoryMetricsCollector::new();
        let provider = AiProvider::from("openai");

        collector.record_circuit_breaker_state(&provider, CircuitState::Closed);
        collector.record_circuit_breaker_state(&provider, CircuitState::Closed);
        collector.record_circuit_breaker_state(&provider, CircuitState::Open);

        assert_eq!(collector.snapshot()["openai"].state_changes, 1);
    }
}

mod record_event_tests {
    use super::*;

    #[test]
    fn test_state_change_records_both_states() {
        let mut mock = MockMetricsCollector::new();
        let mut sequence = mockall::Sequence::new();
        mock.expect_record_circuit_breaker_state()
            .with(eq(AiProvider::from("openai")), eq(CircuitState::Closed))
            .times(1)
            .in_sequence(&mut sequence)
            .return_const(());
        mock.expect_record_circuit_breaker_state()
            .with(eq(AiProvider::from("openai")), eq(CircuitState::Open))
            .times(1)
            .in_sequence(&mut sequence)
            .return_const(());

        let event = CircuitBreakerEvent::state_change(
            &AiProvider::from("openai"),
            CircuitState::Closed,
            CircuitState::Open,
            Timestamp::now(),
            crate::circuit_breaker::TransitionReason::FailureThreshold,
        );
        record_event(&mock, &event);
    }

    #[test]
    fn test_timed_out_failure_records_timeout_outcome() {
        let mut mock = MockMetricsCollector::new();
        mock.expect_record_request()
            .with(
                eq(AiProvider::from("anthropic")),
                eq(RequestOutcome::Timeout),
                eq(Some(Duration::from_millis(100))),
            )
            .times(1)
            .return_const(());
        mock.expect_record_rejection().never();

        let event = CircuitBreakerEvent::failure(
            &AiProvider::from("anthropic"),
            CircuitState::Closed,
            Timestamp::now(),
            "Request timed out after 100ms".to_string(),
            100,
            true,
        );
        record_event(&mock, &event);
    }

    #[test]
    fn test_rejection_records_rejection_only() {
        let mut mock = MockMetricsCollector::new();
        mock.expect_record_rejection()
            .with(eq(AiProvider::from("openai")))
            .times(1)
            .return_const(());
        mock.expect_record_request().never();

        let event = CircuitBreakerEvent::rejected(
            &AiProvider::from("openai"),
            CircuitState::Open,
            Timestamp::now(),
        );
        record_event(&mock, &event);
    }

    #[tokio::test]
    async fn test_success_reaches_mock_through_registry() {
        let registry = create_test_registry();
        let mut mock = MockMetricsCollector::new();
        mock.expect_record_request()
            .with(eq(AiProvider::from("openai")), eq(RequestOutcome::Success), always())
            .times(1)
            .return_const(());
        let _subscription = attach_metrics(&registry, Arc::new(mock));

        let _ = registry
            .get("openai")
            .execute(|| async { Ok::<_, String>(()) })
            .await;
    }
}
