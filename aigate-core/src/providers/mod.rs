//! Provider abstraction and resilience layer
//!
//! This module holds everything between an admitted request and an upstream
//! call: the adapter contract, the error classification adapters report,
//! provider selection, and the circuit breaker and retry executor that
//! protect degraded providers.

pub mod adapter;
pub mod circuit_breaker;
pub mod error;
pub mod retry;
pub mod routing;

pub use adapter::{Invocation, InvocationOutput, Payload, ProviderAdapter, ProviderKind};
pub use circuit_breaker::{CircuitBreaker, CircuitState, ProviderHealth};
pub use error::{ErrorMapper, ProviderError, ProviderResult};
pub use retry::{RetryExecutor, RetryOutcome, RetryPolicy};
pub use routing::{Router, Selection};
