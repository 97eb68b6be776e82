//! Retry policy and executor for resilient provider calls
//!
//! The executor wraps one logical call in bounded retries with exponential
//! backoff. Every attempt, including retries, is gated by the circuit
//! breaker and reported back to it. Only transient failures are retried.

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::providers::adapter::ProviderKind;
use crate::providers::circuit_breaker::CircuitBreaker;
use crate::providers::error::ProviderError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not including the initial attempt)
    pub max_retries: u32,

    /// Backoff base: delay for retry n is `initial_delay_ms * 2^n`
    pub initial_delay_ms: u64,

    /// Maximum delay between retries (milliseconds)
    pub max_delay_ms: u64,

    /// Jitter factor (0.0 to 1.0) to randomize delays
    pub jitter_factor: f64,

    /// Timeout applied to each individual attempt (milliseconds)
    pub call_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            jitter_factor: 0.0,
            call_timeout_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay_ms,
            ..Default::default()
        }
    }

    /// Build the policy described by a gateway configuration
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay_ms: config.retry_delay_ms,
            max_delay_ms: config.retry.max_delay_ms,
            jitter_factor: config.retry.jitter_factor,
            call_timeout_ms: config.retry.call_timeout_ms,
        }
    }

    /// Create a policy with no retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_call_timeout_ms(mut self, call_timeout_ms: u64) -> Self {
        self.call_timeout_ms = call_timeout_ms;
        self
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn calculate_delay(&self, attempt: u32, error: &ProviderError) -> Duration {
        let cap = self.max_delay_ms as f64;

        // Provider hints win over computed backoff, within the cap
        if let Some(retry_after) = error.retry_after() {
            return Duration::from_millis((retry_after.as_millis() as f64).min(cap) as u64);
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay_ms as f64 * 2f64.powi(exponent);
        let capped_delay = base_delay.min(cap);

        let delay_with_jitter = if self.jitter_factor > 0.0 && capped_delay > 0.0 {
            let jitter_range = capped_delay * self.jitter_factor;
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped_delay + jitter).clamp(0.0, cap)
        } else {
            capped_delay
        };

        Duration::from_millis(delay_with_jitter as u64)
    }

    /// Whether a failed attempt number `attempt` (0-based) may be followed by another
    pub fn should_retry(&self, error: &ProviderError, attempt: u32) -> bool {
        attempt < self.max_retries && error.is_transient()
    }
}

/// Result of a retried call
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub result: Result<T, GatewayError>,

    /// Attempts that actually reached the provider
    pub attempts: u32,

    /// Total time spent sleeping between attempts
    pub total_delay_ms: u64,

    /// Every provider error encountered, in order
    pub error_history: Vec<ProviderError>,
}

/// Executor for retry operations
pub struct RetryExecutor {
    policy: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, breaker: Arc<CircuitBreaker>) -> Self {
        Self { policy, breaker }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` against `provider` with bounded retries.
    ///
    /// An open circuit ends the call immediately with [`GatewayError::CircuitOpen`]
    /// without consuming a retry. Once `deadline` passes no new attempt starts.
    pub async fn execute<F, Fut, T>(
        &self,
        provider: ProviderKind,
        deadline: Option<Instant>,
        mut operation: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempts = 0;
        let mut total_delay_ms = 0;
        let mut error_history = Vec::new();
        let call_timeout = Duration::from_millis(self.policy.call_timeout_ms);

        let finish = |result: Result<T, GatewayError>,
                      attempts: u32,
                      total_delay_ms: u64,
                      error_history: Vec<ProviderError>| RetryOutcome {
            result,
            attempts,
            total_delay_ms,
            error_history,
        };

        for attempt in 0..=self.policy.max_retries {
            // Whether this attempt is bounded by the caller's deadline rather
            // than the provider call timeout
            let (attempt_timeout, cut_by_deadline) = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return finish(
                            Err(GatewayError::DeadlineExceeded { attempts }),
                            attempts,
                            total_delay_ms,
                            error_history,
                        );
                    }
                    (call_timeout.min(remaining), remaining < call_timeout)
                }
                None => (call_timeout, false),
            };

            if let Err(rejected) = self.breaker.before_call(provider) {
                return finish(Err(rejected), attempts, total_delay_ms, error_history);
            }

            attempts += 1;
            debug!(%provider, attempt, "Invoking provider");

            let error = match tokio::time::timeout(attempt_timeout, operation()).await {
                Ok(Ok(value)) => {
                    self.breaker.record_result(provider, true);
                    return finish(Ok(value), attempts, total_delay_ms, error_history);
                }
                Ok(Err(error)) => error,
                // The caller ran out of time; the provider is not to blame
                Err(_elapsed) if cut_by_deadline => {
                    self.breaker.release_trial(provider);
                    debug!(%provider, attempt, "Caller deadline reached mid-attempt");
                    return finish(
                        Err(GatewayError::DeadlineExceeded { attempts }),
                        attempts,
                        total_delay_ms,
                        error_history,
                    );
                }
                Err(_elapsed) => ProviderError::Timeout,
            };

            self.breaker.record_result(provider, false);
            error_history.push(error.clone());

            if !self.policy.should_retry(&error, attempt) {
                debug!(%provider, attempt, %error, "Giving up on provider");
                let result = Err(GatewayError::from_provider(provider, error));
                return finish(result, attempts, total_delay_ms, error_history);
            }

            let delay = self.policy.calculate_delay(attempt, &error);
            if let Some(deadline) = deadline {
                if Instant::now() + delay >= deadline {
                    return finish(
                        Err(GatewayError::DeadlineExceeded { attempts }),
                        attempts,
                        total_delay_ms,
                        error_history,
                    );
                }
            }

            debug!(
                %provider,
                attempt,
                delay_ms = delay.as_millis() as u64,
                %error,
                "Retrying after transient failure"
            );
            total_delay_ms += delay.as_millis() as u64;
            tokio::time::sleep(delay).await;
        }

        // The final iteration always returns: should_retry is false once
        // attempt == max_retries.
        finish(
            Err(GatewayError::ProviderUnavailable {
                message: format!("{} exhausted retries", provider),
            }),
            attempts,
            total_delay_ms,
            error_history,
        )
    }
}
