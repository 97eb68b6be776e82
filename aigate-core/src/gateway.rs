//! Gateway façade
//!
//! Every call runs the same strictly ordered pipeline:
//!
//! 1. validate the request (no state touched on failure)
//! 2. rate limiter admit
//! 3. per-request budget ceiling
//! 4. daily budget ceiling, holding the estimate while the call is in flight
//! 5. provider selection
//! 6. retried invocation through the circuit breaker
//! 7. spend and usage accounting; the hold is swapped for the real cost
//!
//! Any stage may short-circuit the rest. Exactly one usage record is written
//! per call that names a tenant.

use crate::admission::{BudgetGuard, RateLimiter};
use crate::clock::{SharedClock, SystemClock};
use crate::config::{ConfigError, ConfigValidator, GatewayConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::types::{
    BudgetTier, Capability, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
    RequestContext, Role, TenantId,
};
use crate::providers::adapter::{Invocation, InvocationOutput, Payload, ProviderAdapter, ProviderKind};
use crate::providers::circuit_breaker::{CircuitBreaker, ProviderHealth};
use crate::providers::error::ProviderError;
use crate::providers::retry::{RetryExecutor, RetryPolicy};
use crate::providers::routing::{Router, Selection};
use crate::usage::{UsageEntry, UsageOutcome, UsageStats, UsageTracker};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Assembles a [`Gateway`] from a configuration and one adapter per enabled provider
pub struct GatewayBuilder {
    config: GatewayConfig,
    clock: Option<SharedClock>,
    adapters: BTreeMap<ProviderKind, Arc<dyn ProviderAdapter>>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            clock: None,
            adapters: BTreeMap::new(),
        }
    }

    /// Time source for windows, ledgers and cool-downs; defaults to the system clock
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Register an adapter; a later adapter for the same provider replaces the earlier one
    pub fn adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    /// Validate the configuration and wire up the components.
    ///
    /// This is the only place the gateway fails fatally.
    pub fn build(self) -> Result<Gateway, ConfigError> {
        let config = self.config;
        let validator = ConfigValidator::new();
        validator.validate(&config)?;

        let unserved = validator.unserved_roles(&config);
        if !unserved.is_empty() {
            warn!(?unserved, "No enabled provider serves these roles");
        }

        for provider in config.enabled_providers() {
            if !self.adapters.contains_key(&provider.kind) {
                return Err(ConfigError::MissingAdapter {
                    provider: provider.kind,
                });
            }
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let breaker = Arc::new(
            CircuitBreaker::new(config.circuit_breaker.clone(), clock.clone())
                .with_enabled(config.enable_circuit_breaker),
        );
        let retry = RetryExecutor::new(RetryPolicy::from_config(&config), breaker.clone());
        let router = Router::new(&config);

        info!(
            providers = ?router.providers(),
            max_retries = config.max_retries,
            circuit_breaker = config.enable_circuit_breaker,
            usage_tracking = config.enable_usage_tracking,
            "Gateway initialized"
        );

        Ok(Gateway {
            rate_limiter: RateLimiter::new(config.rate_limit.clone(), clock.clone()),
            budget: BudgetGuard::new(config.budget.clone(), clock.clone()),
            usage: UsageTracker::new(clock, config.enable_usage_tracking),
            breaker,
            retry,
            router,
            adapters: self.adapters,
            config,
        })
    }
}

/// One admitted call on its way to a provider
struct Dispatch {
    request_id: Uuid,
    context: RequestContext,
    payload_for: Box<dyn Fn(&str) -> Payload + Send + Sync>,
    estimated_cost_usd: Option<f64>,
    input_chars: usize,
    output_tokens: u32,
    timeout_ms: Option<u64>,
}

/// Successful dispatch, before the output is shaped for the caller
struct Dispatched {
    selection: Selection,
    invocation: Invocation,
}

pub struct Gateway {
    config: GatewayConfig,
    rate_limiter: RateLimiter,
    budget: BudgetGuard,
    breaker: Arc<CircuitBreaker>,
    retry: RetryExecutor,
    router: Router,
    usage: UsageTracker,
    adapters: BTreeMap<ProviderKind, Arc<dyn ProviderAdapter>>,
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn budget(&self) -> &BudgetGuard {
        &self.budget
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Run a chat completion for the request's tenant
    pub async fn chat(&self, request: ChatRequest) -> GatewayResult<ChatResponse> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "chat",
            %request_id,
            tenant = %request.context.tenant_id,
            role = %request.context.role
        );

        async move {
            if let Err(err) = validate_chat(&request) {
                self.reject(&request.context.tenant_id, request_id, &err);
                return Err(err);
            }

            let ChatRequest {
                messages,
                context,
                max_tokens,
                temperature,
                estimated_cost_usd,
                timeout_ms,
            } = request;
            let input_chars = messages.iter().map(|m| m.content.chars().count()).sum();
            let output_tokens = max_tokens.unwrap_or(self.config.budget.default_max_output_tokens);

            let dispatch = Dispatch {
                request_id,
                context,
                payload_for: Box::new(move |model: &str| Payload::Chat {
                    model: model.to_string(),
                    messages: messages.clone(),
                    max_tokens,
                    temperature,
                }),
                estimated_cost_usd,
                input_chars,
                output_tokens,
                timeout_ms,
            };
            let tenant = dispatch.context.tenant_id.clone();

            let Dispatched {
                selection,
                invocation,
            } = self.dispatch(dispatch).await?;

            let meta = InvocationMeta::from(&invocation);
            let output = match invocation.output {
                InvocationOutput::Text(text) => text,
                InvocationOutput::Vector(_) => {
                    return Err(self.unexpected_output(&tenant, request_id, &selection, &meta, "text"));
                }
            };

            self.record_success(&tenant, request_id, &selection, &meta);
            Ok(ChatResponse {
                output,
                tokens: meta.tokens,
                cost_cents: meta.cost_cents,
                latency_ms: meta.latency_ms,
                provider: selection.provider,
                model: selection.model,
                request_id,
            })
        }
        .instrument(span)
        .await
    }

    /// Embed a text for the request's tenant
    pub async fn generate_embeddings(
        &self,
        request: EmbeddingRequest,
    ) -> GatewayResult<EmbeddingResponse> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "embeddings",
            %request_id,
            tenant = %request.context.tenant_id
        );

        async move {
            if let Err(err) = validate_embedding(&request) {
                self.reject(&request.context.tenant_id, request_id, &err);
                return Err(err);
            }

            let EmbeddingRequest {
                text,
                context,
                estimated_cost_usd,
                timeout_ms,
            } = request;
            let input_chars = text.chars().count();

            let dispatch = Dispatch {
                request_id,
                context,
                payload_for: Box::new(move |model: &str| Payload::Embed {
                    model: model.to_string(),
                    input: text.clone(),
                }),
                estimated_cost_usd,
                input_chars,
                output_tokens: 0,
                timeout_ms,
            };
            let tenant = dispatch.context.tenant_id.clone();

            let Dispatched {
                selection,
                invocation,
            } = self.dispatch(dispatch).await?;

            let meta = InvocationMeta::from(&invocation);
            let vector = match invocation.output {
                InvocationOutput::Vector(vector) => vector,
                InvocationOutput::Text(_) => {
                    return Err(self.unexpected_output(&tenant, request_id, &selection, &meta, "vector"));
                }
            };

            self.record_success(&tenant, request_id, &selection, &meta);
            Ok(EmbeddingResponse {
                vector,
                cost_cents: meta.cost_cents,
                tokens: meta.tokens,
                latency_ms: meta.latency_ms,
                provider: selection.provider,
                model: selection.model,
                request_id,
            })
        }
        .instrument(span)
        .await
    }

    /// Admission, selection and invocation shared by every capability.
    ///
    /// Failures are recorded in usage here; success is recorded by the
    /// caller once the output has been shaped.
    async fn dispatch(&self, dispatch: Dispatch) -> GatewayResult<Dispatched> {
        let Dispatch {
            request_id,
            context,
            payload_for,
            estimated_cost_usd,
            input_chars,
            output_tokens,
            timeout_ms,
        } = dispatch;
        let tenant = &context.tenant_id;
        let tier = self.tier(&context);

        if let Err(err) = self.rate_limiter.admit(tenant) {
            self.reject(tenant, request_id, &err);
            return Err(err);
        }

        let estimate = estimated_cost_usd.unwrap_or_else(|| {
            self.router
                .estimate_cost(&context, input_chars, output_tokens)
        });
        debug!(estimate_usd = estimate, %tier, "Cost estimated");

        // The daily hold is released on every exit below unless committed
        let reservation = match self
            .budget
            .assert_budget(estimate, tier)
            .and_then(|()| self.budget.reserve_daily_budget(tenant, estimate, tier))
        {
            Ok(reservation) => reservation,
            Err(err) => {
                self.reject(tenant, request_id, &err);
                return Err(err);
            }
        };

        let selection = match self.router.select(&context, &self.breaker) {
            Ok(selection) => selection,
            Err(err) => {
                // Eligible providers exist, so every one of them is tripped
                let outcome = if self.router.candidates(&context).is_empty() {
                    err.outcome()
                } else {
                    UsageOutcome::CircuitOpen
                };
                self.reject_as(tenant, request_id, &err, outcome);
                return Err(err);
            }
        };
        let adapter = match self.adapters.get(&selection.provider) {
            Some(adapter) => adapter.clone(),
            None => {
                let err = GatewayError::ProviderUnavailable {
                    message: format!("no adapter for provider {}", selection.provider),
                };
                self.reject(tenant, request_id, &err);
                return Err(err);
            }
        };

        let capability = context.role.capability();
        let payload = payload_for(&selection.model);
        let deadline = timeout_ms
            .map(|ms| tokio::time::Instant::now() + Duration::from_millis(ms));
        let started = StdInstant::now();

        let outcome = self
            .retry
            .execute(selection.provider, deadline, || {
                let adapter = adapter.clone();
                let payload = payload.clone();
                async move { adapter.invoke(capability, payload).await }
            })
            .await;

        match outcome.result {
            Ok(invocation) => {
                // Real cost, not the estimate, goes on the ledger
                reservation.commit(invocation.cost_cents / 100.0);
                debug!(
                    provider = %selection.provider,
                    attempts = outcome.attempts,
                    cost_cents = invocation.cost_cents,
                    "Provider call succeeded"
                );
                Ok(Dispatched {
                    selection,
                    invocation,
                })
            }
            Err(err) => {
                warn!(
                    provider = %selection.provider,
                    attempts = outcome.attempts,
                    code = err.code(),
                    %err,
                    "Provider call failed"
                );
                self.usage.record(
                    tenant,
                    UsageEntry {
                        request_id,
                        provider: Some(selection.provider),
                        model: Some(selection.model),
                        tokens: 0,
                        cost_cents: 0.0,
                        latency_ms: elapsed_ms(started),
                        outcome: err.outcome(),
                    },
                );
                Err(err)
            }
        }
    }

    fn tier(&self, context: &RequestContext) -> BudgetTier {
        context
            .budget_tier
            .unwrap_or(self.config.budget.default_tier)
    }

    /// Record a call that never reached a provider
    fn reject(&self, tenant: &TenantId, request_id: Uuid, err: &GatewayError) {
        self.reject_as(tenant, request_id, err, err.outcome());
    }

    fn reject_as(
        &self,
        tenant: &TenantId,
        request_id: Uuid,
        err: &GatewayError,
        outcome: UsageOutcome,
    ) {
        debug!(code = err.code(), %err, %outcome, "Request rejected");
        if tenant.is_blank() {
            return;
        }
        self.usage
            .record(tenant, UsageEntry::rejected(request_id, outcome));
    }

    fn record_success(
        &self,
        tenant: &TenantId,
        request_id: Uuid,
        selection: &Selection,
        meta: &InvocationMeta,
    ) {
        self.usage.record(
            tenant,
            UsageEntry {
                request_id,
                provider: Some(selection.provider),
                model: Some(selection.model.clone()),
                tokens: meta.tokens,
                cost_cents: meta.cost_cents,
                latency_ms: meta.latency_ms,
                outcome: UsageOutcome::Success,
            },
        );
    }

    /// The provider answered with the wrong kind of output. Its cost has
    /// already been charged, so it is kept on the usage record.
    fn unexpected_output(
        &self,
        tenant: &TenantId,
        request_id: Uuid,
        selection: &Selection,
        meta: &InvocationMeta,
        expected: &str,
    ) -> GatewayError {
        let err = GatewayError::from_provider(
            selection.provider,
            ProviderError::Custom {
                code: "UNEXPECTED_OUTPUT".to_string(),
                message: format!("expected {} output from model {}", expected, selection.model),
            },
        );
        warn!(provider = %selection.provider, %err, "Unexpected provider output");
        self.usage.record(
            tenant,
            UsageEntry {
                request_id,
                provider: Some(selection.provider),
                model: Some(selection.model.clone()),
                tokens: meta.tokens,
                cost_cents: meta.cost_cents,
                latency_ms: meta.latency_ms,
                outcome: UsageOutcome::Error,
            },
        );
        err
    }

    pub fn get_usage_stats(&self, tenant: &TenantId) -> UsageStats {
        self.usage.get_usage_stats(tenant)
    }

    /// Model ids per role across enabled providers
    pub fn get_available_models(&self) -> BTreeMap<Role, Vec<String>> {
        self.router.available_models()
    }

    /// Probe every known provider; disabled providers report `false`.
    ///
    /// Probes bypass admission control and the circuit breaker.
    pub async fn test_connections(&self) -> BTreeMap<ProviderKind, bool> {
        let timeout = Duration::from_millis(self.config.retry.call_timeout_ms);
        let mut results = BTreeMap::new();

        for provider in ProviderKind::ALL {
            let probe = self
                .router
                .probe_model(provider)
                .zip(self.adapters.get(&provider));

            let healthy = match probe {
                Some(((role, model), adapter)) => {
                    let check = adapter.health_check(role.capability(), &model);
                    match tokio::time::timeout(timeout, check).await {
                        Ok(Ok(())) => true,
                        Ok(Err(err)) => {
                            warn!(%provider, %err, "Connection test failed");
                            false
                        }
                        Err(_) => {
                            warn!(%provider, "Connection test timed out");
                            false
                        }
                    }
                }
                None => false,
            };
            results.insert(provider, healthy);
        }
        results
    }

    /// Circuit health of every enabled provider
    pub fn get_provider_health(&self) -> BTreeMap<ProviderKind, ProviderHealth> {
        self.breaker.snapshot(self.router.providers())
    }
}

struct InvocationMeta {
    tokens: u32,
    cost_cents: f64,
    latency_ms: u64,
}

impl From<&Invocation> for InvocationMeta {
    fn from(invocation: &Invocation) -> Self {
        Self {
            tokens: invocation.tokens,
            cost_cents: invocation.cost_cents,
            latency_ms: invocation.latency_ms,
        }
    }
}

fn elapsed_ms(started: StdInstant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn validate_context(context: &RequestContext, capability: Capability) -> GatewayResult<()> {
    if context.tenant_id.is_blank() {
        return Err(GatewayError::invalid("tenant id is required"));
    }
    if context.role.capability() != capability {
        return Err(GatewayError::invalid(format!(
            "role '{}' cannot be used for this call",
            context.role
        )));
    }
    Ok(())
}

fn validate_estimate(estimate: Option<f64>) -> GatewayResult<()> {
    match estimate {
        Some(usd) if !usd.is_finite() || usd < 0.0 => Err(GatewayError::invalid(
            "estimated cost must be a non-negative number",
        )),
        _ => Ok(()),
    }
}

fn validate_chat(request: &ChatRequest) -> GatewayResult<()> {
    validate_context(&request.context, Capability::Chat)?;
    if request.messages.is_empty() {
        return Err(GatewayError::invalid("messages must not be empty"));
    }
    if request.max_tokens == Some(0) {
        return Err(GatewayError::invalid("max_tokens must be at least 1"));
    }
    validate_estimate(request.estimated_cost_usd)
}

fn validate_embedding(request: &EmbeddingRequest) -> GatewayResult<()> {
    validate_context(&request.context, Capability::Embed)?;
    if request.text.trim().is_empty() {
        return Err(GatewayError::invalid("text must not be empty"));
    }
    validate_estimate(request.estimated_cost_usd)
}
