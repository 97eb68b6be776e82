//! Integration tests for retry and circuit breaker behavior

use aigate_core::config::CircuitBreakerConfig;
use aigate_core::providers::ErrorMapper;
use aigate_core::{
    CircuitBreaker, CircuitState, GatewayError, ManualClock, ProviderError, ProviderKind,
    RetryExecutor, RetryPolicy,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use test_case::test_case;

fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        jitter_factor: 0.0,
        call_timeout_ms: 1_000,
    }
}

fn breaker(clock: &ManualClock, threshold: u32) -> Arc<CircuitBreaker> {
    let config = CircuitBreakerConfig {
        failure_threshold: threshold,
        cool_down_secs: 60,
    };
    Arc::new(CircuitBreaker::new(config, Arc::new(clock.clone())))
}

#[test]
fn test_retry_delay_calculation_with_cap() {
    let policy = RetryPolicy {
        max_retries: 10,
        initial_delay_ms: 1_000,
        max_delay_ms: 5_000,
        jitter_factor: 0.0,
        call_timeout_ms: 30_000,
    };
    let error = ProviderError::Timeout;

    let delays: Vec<u64> = (0..5)
        .map(|attempt| policy.calculate_delay(attempt, &error).as_millis() as u64)
        .collect();
    assert_eq!(delays, vec![1_000, 2_000, 4_000, 5_000, 5_000]);
}

#[test]
fn test_retry_after_from_provider_body() {
    let policy = RetryPolicy::default();
    let error = ErrorMapper::from_status_code(429, Some(r#"{"retry_after": 7}"#));

    assert_eq!(error.retry_after(), Some(Duration::from_secs(7)));
    // Capped by max_delay_ms
    assert_eq!(policy.calculate_delay(0, &error), Duration::from_secs(7));

    let short = RetryPolicy {
        max_delay_ms: 2_000,
        ..RetryPolicy::default()
    };
    assert_eq!(short.calculate_delay(0, &error), Duration::from_secs(2));
}

#[test_case(401, false ; "unauthorized")]
#[test_case(403, false ; "forbidden")]
#[test_case(400, false ; "bad request")]
#[test_case(404, false ; "unknown model")]
#[test_case(408, true ; "request timeout")]
#[test_case(429, true ; "upstream rate limit")]
#[test_case(500, true ; "internal error")]
#[test_case(503, true ; "unavailable")]
#[test_case(504, true ; "gateway timeout")]
fn test_status_code_classification(status: u16, transient: bool) {
    let error = ErrorMapper::from_status_code(status, None);
    assert_eq!(error.is_transient(), transient);

    let policy = fast_policy(3);
    assert_eq!(policy.should_retry(&error, 0), transient);
    assert!(!policy.should_retry(&error, 3));
}

#[tokio::test]
async fn test_all_attempts_fail_with_transient_error() {
    let clock = ManualClock::default();
    let executor = RetryExecutor::new(fast_policy(2), breaker(&clock, 10));
    let calls = AtomicU32::new(0);

    let outcome = executor
        .execute(ProviderKind::OpenRouter, None, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<String, _>(ErrorMapper::from_status_code(502, Some("bad gateway"))) }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.error_history.len(), 3);
    match outcome.result {
        Err(GatewayError::ProviderTransient { provider, source }) => {
            assert_eq!(provider, ProviderKind::OpenRouter);
            assert!(matches!(
                source,
                ProviderError::ServerError {
                    status_code: 502,
                    ..
                }
            ));
        }
        other => panic!("expected transient failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_authentication_error_not_retried() {
    let clock = ManualClock::default();
    let executor = RetryExecutor::new(fast_policy(3), breaker(&clock, 10));

    let outcome = executor
        .execute(ProviderKind::OpenAI, None, || async {
            Err::<String, _>(ErrorMapper::from_status_code(401, None))
        })
        .await;

    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.total_delay_ms, 0);
    assert!(matches!(
        outcome.result,
        Err(GatewayError::ProviderPermanent {
            source: ProviderError::AuthenticationError,
            ..
        })
    ));
}

#[tokio::test]
async fn test_breaker_opens_then_recovers_through_trial() {
    let clock = ManualClock::default();
    let breaker = breaker(&clock, 5);
    let executor = RetryExecutor::new(fast_policy(0), breaker.clone());
    let calls = AtomicU32::new(0);

    for _ in 0..5 {
        let outcome = executor
            .execute(ProviderKind::OpenAI, None, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ProviderError::Timeout) }
            })
            .await;
        assert!(matches!(
            outcome.result,
            Err(GatewayError::ProviderTransient { .. })
        ));
    }
    assert_eq!(breaker.state(ProviderKind::OpenAI), CircuitState::Open);

    // Sixth call is rejected without reaching the provider
    let outcome = executor
        .execute(ProviderKind::OpenAI, None, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ProviderError>(()) }
        })
        .await;
    assert!(matches!(
        outcome.result,
        Err(GatewayError::CircuitOpen {
            provider: ProviderKind::OpenAI
        })
    ));
    assert_eq!(outcome.attempts, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    clock.advance(chrono::Duration::seconds(60));
    assert_eq!(breaker.state(ProviderKind::OpenAI), CircuitState::HalfOpen);

    let outcome = executor
        .execute(ProviderKind::OpenAI, None, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ProviderError>("recovered") }
        })
        .await;
    assert_eq!(outcome.result.ok(), Some("recovered"));
    assert_eq!(breaker.state(ProviderKind::OpenAI), CircuitState::Closed);
    assert_eq!(breaker.health(ProviderKind::OpenAI).consecutive_failures, 0);
}

#[tokio::test]
async fn test_failed_trial_reopens_circuit() {
    let clock = ManualClock::default();
    let breaker = breaker(&clock, 1);
    let executor = RetryExecutor::new(fast_policy(0), breaker.clone());

    let failing = || async { Err::<(), _>(ErrorMapper::from_status_code(503, None)) };

    executor.execute(ProviderKind::Local, None, failing).await;
    assert_eq!(breaker.state(ProviderKind::Local), CircuitState::Open);

    clock.advance(chrono::Duration::seconds(61));
    let outcome = executor.execute(ProviderKind::Local, None, failing).await;
    assert_eq!(outcome.attempts, 1);
    assert_eq!(breaker.state(ProviderKind::Local), CircuitState::Open);
}

#[tokio::test]
async fn test_slow_attempt_counts_as_timeout() {
    let clock = ManualClock::default();
    let policy = fast_policy(1).with_call_timeout_ms(20);
    let executor = RetryExecutor::new(policy, breaker(&clock, 10));

    let outcome = executor
        .execute(ProviderKind::OpenAI, None, || async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, ProviderError>(())
        })
        .await;

    assert_eq!(outcome.attempts, 2);
    assert_eq!(
        outcome.error_history,
        vec![ProviderError::Timeout, ProviderError::Timeout]
    );
}
