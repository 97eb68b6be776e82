//! Gateway error taxonomy
//!
//! Every failure that crosses the gateway boundary is one of these variants.
//! Callers pattern-match on them instead of inspecting error strings.

use crate::providers::adapter::ProviderKind;
use crate::providers::error::ProviderError;
use crate::usage::UsageOutcome;
use thiserror::Error;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// Malformed request; never retried, never counted against rate or budget
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Rate limit exceeded, retry after {retry_after_seconds}s")]
    RateLimitExceeded { retry_after_seconds: u64 },

    #[error("Budget exceeded: limit ${budget_usd:.4}, requested ${actual_usd:.4}")]
    BudgetExceeded { budget_usd: f64, actual_usd: f64 },

    #[error("Circuit open for provider {provider}")]
    CircuitOpen { provider: ProviderKind },

    /// Transient provider failure that survived every retry
    #[error("Provider {provider} failed transiently: {source}")]
    ProviderTransient {
        provider: ProviderKind,
        #[source]
        source: ProviderError,
    },

    #[error("Provider {provider} failed: {source}")]
    ProviderPermanent {
        provider: ProviderKind,
        #[source]
        source: ProviderError,
    },

    /// No enabled provider can serve the request right now
    #[error("No provider available: {message}")]
    ProviderUnavailable { message: String },

    /// Caller deadline expired before the call completed
    #[error("Deadline exceeded after {attempts} attempt(s)")]
    DeadlineExceeded { attempts: u32 },
}

impl GatewayError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Wrap a provider error according to its transient/permanent class
    pub fn from_provider(provider: ProviderKind, source: ProviderError) -> Self {
        if source.is_transient() {
            Self::ProviderTransient { provider, source }
        } else {
            Self::ProviderPermanent { provider, source }
        }
    }

    /// Stable code for the response envelope
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "INVALID_REQUEST",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::BudgetExceeded { .. } => "BUDGET_EXCEEDED",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::ProviderTransient { .. } => "PROVIDER_TRANSIENT_ERROR",
            Self::ProviderPermanent { .. } => "PROVIDER_PERMANENT_ERROR",
            Self::ProviderUnavailable { .. } => "PROVIDER_UNAVAILABLE",
            Self::DeadlineExceeded { .. } => "DEADLINE_EXCEEDED",
        }
    }

    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::RateLimitExceeded {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }

    /// How this failure is recorded in usage accounting
    pub fn outcome(&self) -> UsageOutcome {
        match self {
            Self::RateLimitExceeded { .. } => UsageOutcome::RateLimited,
            Self::BudgetExceeded { .. } => UsageOutcome::BudgetExceeded,
            Self::CircuitOpen { .. } => UsageOutcome::CircuitOpen,
            _ => UsageOutcome::Error,
        }
    }
}
