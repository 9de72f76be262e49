use super::*;
use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState, DEFAULT_CONFIG};
use crate::clock::ManualClock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn create_test_breaker() -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::with_clock(
        "anthropic",
        CircuitBreakerConfig {
            failure_threshold: 2,
            request_timeout: Duration::from_millis(100),
            ..DEFAULT_CONFIG
        },
        Arc::new(ManualClock::new()),
    ))
}

#[tokio::test]
async fn test_protected_call_passes_arguments_and_result() {
    let complete = with_circuit_breaker(
        |(prompt, max_tokens): (String, u32)| async move {
            Ok::<_, String>(format!("{}:{}", prompt, max_tokens))
        },
        create_test_breaker(),
    );

    let result = complete.call(("hello".to_string(), 32)).await;

    assert_eq!(result.unwrap(), "hello:32");
    assert_eq!(complete.breaker().stats().successes, 1);
}

#[tokio::test]
async fn test_protected_call_counts_failures_against_breaker() {
    let breaker = create_test_breaker();
    let complete = with_circuit_breaker(
        |_prompt: &'static str| async { Err::<String, _>("overloaded") },
        Arc::clone(&breaker),
    );

    for _ in 0..2 {
        let result = complete.call("hi").await;
        assert!(matches!(result, Err(CircuitBreakerError::Operation("overloaded"))));
    }

    assert_eq!(breaker.state(), CircuitState::Open);
}

/// Once open, the wrapped function is not invoked at all.
#[tokio::test]
async fn test_protected_call_short_circuits_when_open() {
    let breaker = create_test_breaker();
    breaker.force_state(CircuitState::Open);
    let invocations = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&invocations);
    let complete = with_circuit_breaker(
        move |_: ()| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, String>(()) }
        },
        breaker,
    );

    let result = complete.call(()).await;

    assert!(result.is_err_and(|error| error.is_circuit_open()));
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_protected_call_applies_request_timeout() {
    let complete = with_circuit_breaker(
        |delay: Duration| async move {
            tokio::time::sleep(delay).await;
            Ok::<_, String>(())
        },
        create_test_breaker(),
    );

    assert!(complete.call(Duration::from_millis(10)).await.is_ok());
    let result = complete.call(Duration::from_secs(5)).await;

    assert!(result.is_err_and(|error| error.is_timeout()));
}

/// Clones share the breaker.
#[tokio::test]
async fn test_cloned_calls_share_breaker() {
    let complete = with_circuit_breaker(
        |_: ()| async { Err::<(), _>("down") },
        create_test_breaker(),
    );
    let other = complete.clone();

    let _ = complete.call(()).await;
    let _ = other.call(()).await;

    assert!(Arc::ptr_eq(complete.breaker(), other.breaker()));
    assert_eq!(other.breaker().state(), CircuitState::Open);
    assert!(format!("{:?}", other).contains("anthropic"));
}
