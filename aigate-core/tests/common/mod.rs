//! Shared fixtures for integration tests

#![allow(dead_code)]

use aigate_core::protocol::types::Capability;
use aigate_core::providers::{Invocation, InvocationOutput, Payload, ProviderAdapter, ProviderError};
use aigate_core::{
    ChatRequest, Gateway, GatewayConfig, ManualClock, Message, ProviderKind, RequestContext, Role,
    Sensitivity,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Install a subscriber once; honors `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Adapter that replays scripted results, then falls back to a fixed one
pub struct ScriptedAdapter {
    kind: ProviderKind,
    script: Mutex<VecDeque<Result<Invocation, ProviderError>>>,
    fallback: Mutex<Result<Invocation, ProviderError>>,
    delay: Duration,
    calls: AtomicU32,
    payloads: Mutex<Vec<Payload>>,
}

impl ScriptedAdapter {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(text("ok", 0.1))),
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
            payloads: Mutex::new(Vec::new()),
        }
    }

    /// Results returned in order before the fallback applies
    pub fn with_script(self, results: Vec<Result<Invocation, ProviderError>>) -> Self {
        *self.script.lock().unwrap() = results.into();
        self
    }

    pub fn with_fallback(self, result: Result<Invocation, ProviderError>) -> Self {
        *self.fallback.lock().unwrap() = result;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_fallback(&self, result: Result<Invocation, ProviderError>) {
        *self.fallback.lock().unwrap() = result;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn payloads(&self) -> Vec<Payload> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn invoke(
        &self,
        _capability: Capability,
        payload: Payload,
    ) -> Result<Invocation, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(payload);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }
}

/// Successful chat invocation costing `cost_cents`
pub fn text(output: &str, cost_cents: f64) -> Invocation {
    Invocation {
        output: InvocationOutput::Text(output.to_string()),
        tokens: 42,
        cost_cents,
        latency_ms: 120,
    }
}

/// Successful embedding invocation
pub fn vector(values: &[f32], cost_cents: f64) -> Invocation {
    Invocation {
        output: InvocationOutput::Vector(values.to_vec()),
        tokens: 8,
        cost_cents,
        latency_ms: 15,
    }
}

pub fn server_error() -> ProviderError {
    ProviderError::ServerError {
        status_code: 503,
        message: "upstream unavailable".to_string(),
    }
}

/// Default configuration with millisecond backoff so tests stay fast
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.retry_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.retry.call_timeout_ms = 1_000;
    config
}

/// Adapters for all three providers plus a gateway wired to them
pub struct Harness {
    pub gateway: Arc<Gateway>,
    pub clock: ManualClock,
    pub openai: Arc<ScriptedAdapter>,
    pub openrouter: Arc<ScriptedAdapter>,
    pub local: Arc<ScriptedAdapter>,
}

impl Harness {
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_adapters(
            config,
            ScriptedAdapter::new(ProviderKind::OpenAI).shared(),
            ScriptedAdapter::new(ProviderKind::OpenRouter).shared(),
            ScriptedAdapter::new(ProviderKind::Local).shared(),
        )
    }

    pub fn with_adapters(
        config: GatewayConfig,
        openai: Arc<ScriptedAdapter>,
        openrouter: Arc<ScriptedAdapter>,
        local: Arc<ScriptedAdapter>,
    ) -> Self {
        init_tracing();
        let clock = ManualClock::default();
        let gateway = Gateway::builder(config)
            .clock(Arc::new(clock.clone()))
            .adapter(openai.clone())
            .adapter(openrouter.clone())
            .adapter(local.clone())
            .build()
            .expect("valid test configuration");

        Self {
            gateway: Arc::new(gateway),
            clock,
            openai,
            openrouter,
            local,
        }
    }

    pub fn total_calls(&self) -> u32 {
        self.openai.calls() + self.openrouter.calls() + self.local.calls()
    }
}

/// Single-message chat request at `internal` sensitivity
pub fn chat_request(tenant: &str) -> ChatRequest {
    ChatRequest::new(
        RequestContext::new(tenant, Role::Chat).with_sensitivity(Sensitivity::Internal),
        vec![Message::user("Summarize the quarterly report")],
    )
}
