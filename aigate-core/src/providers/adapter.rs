//! Provider adapter trait
//!
//! Defines the contract the gateway consumes from each upstream. Adapters
//! live outside this crate; the gateway only calls [`ProviderAdapter::invoke`].

use crate::protocol::types::{Capability, Message};
use crate::providers::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported upstream providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Hosted model A
    OpenAI,
    /// Hosted model B (aggregator)
    OpenRouter,
    /// Local inference
    Local,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::OpenAI,
        ProviderKind::OpenRouter,
        ProviderKind::Local,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Local => "local",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Provider-bound request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Payload {
    Chat {
        model: String,
        messages: Vec<Message>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_tokens: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        temperature: Option<f32>,
    },
    Embed {
        model: String,
        input: String,
    },
}

impl Payload {
    pub fn model(&self) -> &str {
        match self {
            Payload::Chat { model, .. } | Payload::Embed { model, .. } => model,
        }
    }
}

/// Provider output body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvocationOutput {
    Text(String),
    Vector(Vec<f32>),
}

/// Result of a completed upstream call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub output: InvocationOutput,
    pub tokens: u32,
    pub cost_cents: f64,
    pub latency_ms: u64,
}

/// Contract every upstream adapter implements
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Which provider this adapter talks to
    fn kind(&self) -> ProviderKind;

    /// Perform one upstream call. Errors must be classifiable through
    /// [`ProviderError::is_transient`].
    async fn invoke(
        &self,
        capability: Capability,
        payload: Payload,
    ) -> Result<Invocation, ProviderError>;

    /// Cheap connectivity probe; defaults to a minimal call of the given capability
    async fn health_check(&self, capability: Capability, model: &str) -> Result<(), ProviderError> {
        let payload = match capability {
            Capability::Chat => Payload::Chat {
                model: model.to_string(),
                messages: vec![Message::user("ping")],
                max_tokens: Some(1),
                temperature: None,
            },
            Capability::Embed => Payload::Embed {
                model: model.to_string(),
                input: "ping".to_string(),
            },
        };
        self.invoke(capability, payload).await.map(|_| ())
    }
}
