//! Gateway demo - admission, routing and resilience end to end
//!
//! Wires a gateway to in-process adapters and walks through:
//! - Routing by role and sensitivity
//! - Rate limiting and budget rejections
//! - A flaky provider tripping its circuit breaker
//!
//! Run with: RUST_LOG=aigate_core=debug cargo run --example gateway_demo

use aigate_core::protocol::types::Capability;
use aigate_core::providers::{ErrorMapper, Invocation, InvocationOutput, Payload, ProviderError};
use aigate_core::{
    BudgetTier, ChatRequest, EmbeddingRequest, Envelope, Gateway, GatewayConfig, Message,
    ProviderAdapter, ProviderKind, RequestContext, Role, Sensitivity, TenantId,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Answers every call locally; can be switched into an outage
struct EchoAdapter {
    kind: ProviderKind,
    cost_per_call_cents: f64,
    down: AtomicBool,
}

impl EchoAdapter {
    fn new(kind: ProviderKind, cost_per_call_cents: f64) -> Arc<Self> {
        Arc::new(Self {
            kind,
            cost_per_call_cents,
            down: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl ProviderAdapter for EchoAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn invoke(
        &self,
        _capability: Capability,
        payload: Payload,
    ) -> Result<Invocation, ProviderError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(ErrorMapper::from_status_code(503, Some("maintenance")));
        }

        let output = match payload {
            Payload::Chat {
                model, messages, ..
            } => {
                let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
                InvocationOutput::Text(format!("[{}] {}", model, last))
            }
            Payload::Embed { input, .. } => {
                InvocationOutput::Vector(input.bytes().take(4).map(|b| f32::from(b) / 255.0).collect())
            }
        };

        Ok(Invocation {
            output,
            tokens: 32,
            cost_cents: self.cost_per_call_cents,
            latency_ms: 5,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = GatewayConfig::default();
    config.retry_delay_ms = 10;
    config.retry.max_delay_ms = 100;
    config.circuit_breaker.failure_threshold = 2;
    config.rate_limit.requests_per_window = 5;

    let openai = EchoAdapter::new(ProviderKind::OpenAI, 0.4);
    let gateway = Gateway::builder(config)
        .adapter(openai.clone())
        .adapter(EchoAdapter::new(ProviderKind::OpenRouter, 0.6))
        .adapter(EchoAdapter::new(ProviderKind::Local, 0.0))
        .build()?;

    println!("\nAvailable models:");
    for (role, models) in gateway.get_available_models() {
        println!("  {:<10} {}", role, models.join(", "));
    }

    println!("\nConnections:");
    for (provider, healthy) in gateway.test_connections().await {
        println!("  {:<10} {}", provider, if healthy { "ok" } else { "down" });
    }

    println!("\nRouting by sensitivity:");
    for sensitivity in [Sensitivity::Public, Sensitivity::Internal, Sensitivity::Restricted] {
        let request = ChatRequest::new(
            RequestContext::new("demo", Role::Chat).with_sensitivity(sensitivity),
            vec![Message::user("Where does this go?")],
        );
        let response = gateway.chat(request).await?;
        println!("  {:<10} -> {} ({})", sensitivity, response.provider, response.output);
    }

    let embedding = gateway
        .generate_embeddings(EmbeddingRequest::new("demo", "vectorize me"))
        .await?;
    println!("\nEmbedding from {}: {:?}", embedding.provider, embedding.vector);

    println!("\nRate limit (5 per minute, 4 already used):");
    for i in 0..3 {
        let result = gateway.chat(chat("demo")).await;
        let envelope = Envelope::from(result);
        println!("  call {}: {}", i + 1, serde_json::to_string(&envelope)?);
    }

    println!("\nLow tier budget ($0.01 per day):");
    for i in 0..4 {
        let request = ChatRequest::new(
            RequestContext::new("frugal", Role::Chat).with_budget_tier(BudgetTier::Low),
            vec![Message::user("hello")],
        )
        .with_estimated_cost(0.004);
        match gateway.chat(request).await {
            Ok(_) => println!("  call {}: ok", i + 1),
            Err(err) => println!("  call {}: {}", i + 1, err),
        }
    }
    println!(
        "  spent today: ${:.4}",
        gateway.budget().spent_today(&TenantId::from("frugal"))
    );

    println!("\nOpenAI outage:");
    openai.down.store(true, Ordering::SeqCst);
    for i in 0..2 {
        match gateway.chat(chat("resilient")).await {
            Ok(response) => println!("  call {}: served by {}", i + 1, response.provider),
            Err(err) => println!("  call {}: {} [{}]", i + 1, err, err.code()),
        }
    }
    for (provider, health) in gateway.get_provider_health() {
        println!(
            "  {:<10} {:?} (failures: {})",
            provider, health.state, health.consecutive_failures
        );
    }

    println!("\nUsage:");
    for tenant in gateway.usage().tenants() {
        let stats = gateway.get_usage_stats(&tenant);
        println!(
            "  {:<10} requests={} cost={:.2}c success_rate={:.2}",
            tenant, stats.total_requests, stats.total_cost_cents, stats.success_rate
        );
    }

    Ok(())
}

fn chat(tenant: &str) -> ChatRequest {
    ChatRequest::new(
        RequestContext::new(tenant, Role::Chat),
        vec![Message::user("ping")],
    )
}
