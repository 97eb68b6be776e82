//! Aigate Core Library
//!
//! Admission control, resilience and usage accounting in front of several
//! upstream AI model providers. Callers hand chat or embedding requests to a
//! [`Gateway`]; it enforces per-tenant rate limits and spend budgets, picks a
//! provider for the request's role and sensitivity, calls it through a
//! circuit breaker with bounded retries, and records every outcome.
//!
//! Provider adapters live outside this crate and plug in through
//! [`ProviderAdapter`].

pub mod admission;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod providers;
pub mod usage;

pub use admission::{BudgetGuard, RateLimiter};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{load_from_json, load_from_yaml, ConfigError, GatewayConfig};
pub use error::{GatewayError, GatewayResult};
pub use gateway::{Gateway, GatewayBuilder};
pub use protocol::{
    BudgetTier, Capability, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
    Envelope, Message, RequestContext, Role, Sensitivity, TenantId,
};
pub use providers::{
    CircuitBreaker, CircuitState, Invocation, InvocationOutput, Payload, ProviderAdapter,
    ProviderError, ProviderHealth, ProviderKind, RetryExecutor, RetryPolicy,
};
pub use usage::{UsageOutcome, UsageRecord, UsageStats, UsageTracker};

/// Returns the version of the Aigate Core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
