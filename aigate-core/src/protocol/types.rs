//! Core request/response types for the gateway
//!
//! This module contains the data structures callers exchange with the
//! gateway. The design prioritizes:
//! - Closed enums for roles, sensitivities and tiers so routing is checked at compile time
//! - Immutable per-call context carried through every admission stage
//! - A serializable envelope for the application boundary

use crate::error::GatewayError;
use crate::providers::adapter::ProviderKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque billing/isolation boundary
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Wrap a tenant identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the identifier is empty or whitespace only
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TenantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Kind of upstream operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Chat,
    Embed,
}

/// Task role a request is made for; drives model selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// General conversation
    Chat,
    /// Vector embeddings
    Embed,
    /// Condensing long inputs
    Summarize,
    /// Code generation and review
    Code,
    /// Multi-step analysis
    Reasoning,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Chat,
        Role::Embed,
        Role::Summarize,
        Role::Code,
        Role::Reasoning,
    ];

    /// Upstream capability needed to serve this role
    pub fn capability(&self) -> Capability {
        match self {
            Role::Embed => Capability::Embed,
            _ => Capability::Chat,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Chat => "chat",
            Role::Embed => "embed",
            Role::Summarize => "summarize",
            Role::Code => "code",
            Role::Reasoning => "reasoning",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Role {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GatewayError::invalid(format!("unknown role '{}'", s)))
    }
}

/// Data sensitivity, ordered from least to most restricted
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Public,
    #[default]
    Internal,
    Restricted,
}

impl FromStr for Sensitivity {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Sensitivity::Public),
            "internal" => Ok(Sensitivity::Internal),
            "restricted" => Ok(Sensitivity::Restricted),
            other => Err(GatewayError::invalid(format!(
                "unknown sensitivity '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sensitivity::Public => "public",
            Sensitivity::Internal => "internal",
            Sensitivity::Restricted => "restricted",
        };
        f.pad(name)
    }
}

/// Named spend ceiling bucket
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BudgetTier {
    Low,
    #[default]
    Standard,
    Premium,
}

impl fmt::Display for BudgetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BudgetTier::Low => "low",
            BudgetTier::Standard => "standard",
            BudgetTier::Premium => "premium",
        };
        f.pad(name)
    }
}

/// Immutable per-call routing and admission context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub role: Role,
    #[serde(default)]
    pub sensitivity: Sensitivity,
    pub tenant_id: TenantId,
    /// `None` falls back to the configured default tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_tier: Option<BudgetTier>,
}

impl RequestContext {
    pub fn new(tenant_id: impl Into<TenantId>, role: Role) -> Self {
        Self {
            role,
            sensitivity: Sensitivity::default(),
            tenant_id: tenant_id.into(),
            budget_tier: None,
        }
    }

    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    pub fn with_budget_tier(mut self, tier: BudgetTier) -> Self {
        self.budget_tier = Some(tier);
        self
    }
}

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Chat request accepted by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,

    pub context: RequestContext,

    /// Upper bound on completion tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Caller-supplied cost estimate; the gateway estimates one otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost_usd: Option<f64>,

    /// Overall deadline for the call, retries included
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ChatRequest {
    pub fn new(context: RequestContext, messages: Vec<Message>) -> Self {
        Self {
            messages,
            context,
            max_tokens: None,
            temperature: None,
            estimated_cost_usd: None,
            timeout_ms: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_estimated_cost(mut self, usd: f64) -> Self {
        self.estimated_cost_usd = Some(usd);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Total characters across all message bodies
    pub fn content_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }
}

/// Embedding request accepted by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub text: String,

    pub context: RequestContext,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost_usd: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl EmbeddingRequest {
    /// Create an embedding request; the role is always [`Role::Embed`]
    pub fn new(tenant_id: impl Into<TenantId>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context: RequestContext::new(tenant_id, Role::Embed),
            estimated_cost_usd: None,
            timeout_ms: None,
        }
    }

    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.context.sensitivity = sensitivity;
        self
    }

    pub fn with_budget_tier(mut self, tier: BudgetTier) -> Self {
        self.context.budget_tier = Some(tier);
        self
    }

    pub fn with_estimated_cost(mut self, usd: f64) -> Self {
        self.estimated_cost_usd = Some(usd);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Normalized chat result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub output: String,
    pub tokens: u32,
    pub cost_cents: f64,
    pub latency_ms: u64,
    pub provider: ProviderKind,
    pub model: String,
    pub request_id: Uuid,
}

/// Normalized embedding result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub vector: Vec<f32>,
    pub cost_cents: f64,
    pub tokens: u32,
    pub latency_ms: u64,
    pub provider: ProviderKind,
    pub model: String,
    pub request_id: Uuid,
}

/// Error body of a failed [`Envelope`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

/// `{success, data}` / `{success: false, error}` shape handed to the application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> From<Result<T, GatewayError>> for Envelope<T> {
    fn from(result: Result<T, GatewayError>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(err) => Self {
                success: false,
                data: None,
                error: Some(ErrorBody {
                    code: err.code().to_string(),
                    message: err.to_string(),
                    retry_after_seconds: err.retry_after_seconds(),
                }),
            },
        }
    }
}
