//! Configuration schema structures with serde support

use super::error::{ValidationError, ValidationErrorKind};
use crate::protocol::types::{BudgetTier, Role, Sensitivity};
use crate::providers::adapter::ProviderKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Root configuration for the gateway; immutable once a gateway is built
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Schema version (required - no default)
    pub version: String,

    /// Enable the hosted OpenAI provider
    #[serde(default = "default_true")]
    pub enable_openai: bool,

    /// Enable the hosted OpenRouter provider
    #[serde(default = "default_true")]
    pub enable_openrouter: bool,

    /// Enable local inference
    #[serde(default = "default_true")]
    pub enable_local: bool,

    /// Retries after the initial attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_true")]
    pub enable_usage_tracking: bool,

    #[serde(default = "default_true")]
    pub enable_circuit_breaker: bool,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub budget: BudgetConfig,

    /// Provider catalog; defaults to the built-in catalog
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
            enable_openai: true,
            enable_openrouter: true,
            enable_local: true,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            enable_usage_tracking: true,
            enable_circuit_breaker: true,
            retry: RetrySettings::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            budget: BudgetConfig::default(),
            providers: default_providers(),
        }
    }
}

/// Upstream provider entry
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    /// Higher = preferred
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Most sensitive data this provider may receive
    #[serde(default)]
    pub max_sensitivity: Sensitivity,

    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

impl ProviderConfig {
    /// First model that serves the given role
    pub fn model_for(&self, role: Role) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.roles.contains(&role))
    }
}

/// Model served by a provider
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Model identifier (e.g., "gpt-4o-mini")
    pub id: String,

    /// Roles this model may be selected for
    pub roles: Vec<Role>,

    /// Blended cost per 1K tokens (in USD)
    #[serde(default)]
    pub cost_per_1k_tokens_usd: Option<f64>,
}

impl ModelConfig {
    fn new(id: &str, roles: &[Role], cost_per_1k_tokens_usd: f64) -> Self {
        Self {
            id: id.to_string(),
            roles: roles.to_vec(),
            cost_per_1k_tokens_usd: Some(cost_per_1k_tokens_usd),
        }
    }
}

/// Backoff tuning beyond the top-level retry flags
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    /// Backoff cap in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Jitter factor (0.0 to 1.0) to randomize delays
    #[serde(default)]
    pub jitter_factor: f64,

    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_delay_ms: default_max_delay(),
            jitter_factor: 0.0,
            call_timeout_ms: default_call_timeout(),
        }
    }
}

/// Circuit breaker thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds an open circuit waits before allowing a trial call
    #[serde(default = "default_cool_down")]
    pub cool_down_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cool_down_secs: default_cool_down(),
        }
    }
}

/// Per-tenant fixed-window rate limit
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_requests_per_window")]
    pub requests_per_window: u32,

    #[serde(default = "default_window")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_window: default_requests_per_window(),
            window_secs: default_window(),
        }
    }
}

/// Spend ceilings for one tier
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TierLimits {
    /// Largest estimated cost a single call may carry
    pub per_request_usd: f64,

    /// Cumulative spend allowed per tenant per UTC day
    pub daily_usd: f64,
}

impl TierLimits {
    pub const fn new(per_request_usd: f64, daily_usd: f64) -> Self {
        Self {
            per_request_usd,
            daily_usd,
        }
    }
}

/// Tier ceilings, low < standard < premium
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TierTable {
    #[serde(default = "default_low_tier")]
    pub low: TierLimits,
    #[serde(default = "default_standard_tier")]
    pub standard: TierLimits,
    #[serde(default = "default_premium_tier")]
    pub premium: TierLimits,
}

impl TierTable {
    pub fn get(&self, tier: BudgetTier) -> TierLimits {
        match tier {
            BudgetTier::Low => self.low,
            BudgetTier::Standard => self.standard,
            BudgetTier::Premium => self.premium,
        }
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            low: default_low_tier(),
            standard: default_standard_tier(),
            premium: default_premium_tier(),
        }
    }
}

/// Spend control configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetConfig {
    /// Tier applied when a request names none
    #[serde(default)]
    pub default_tier: BudgetTier,

    #[serde(default)]
    pub tiers: TierTable,

    /// Price used to estimate calls to models without a configured price
    #[serde(default = "default_cost_per_1k")]
    pub default_cost_per_1k_tokens_usd: f64,

    /// Completion size assumed when a request sets no `max_tokens`
    #[serde(default = "default_max_output_tokens")]
    pub default_max_output_tokens: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_tier: BudgetTier::default(),
            tiers: TierTable::default(),
            default_cost_per_1k_tokens_usd: default_cost_per_1k(),
            default_max_output_tokens: default_max_output_tokens(),
        }
    }
}

// Default value functions for serde
fn default_true() -> bool { true }
fn default_priority() -> u32 { 50 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_delay() -> u64 { 1000 }
fn default_max_delay() -> u64 { 10_000 }
fn default_call_timeout() -> u64 { 30_000 }
fn default_failure_threshold() -> u32 { 5 }
fn default_cool_down() -> u64 { 60 }
fn default_requests_per_window() -> u32 { 10 }
fn default_window() -> u64 { 60 }
fn default_cost_per_1k() -> f64 { 0.002 }
fn default_max_output_tokens() -> u32 { 256 }
fn default_low_tier() -> TierLimits { TierLimits::new(0.01, 0.01) }
fn default_standard_tier() -> TierLimits { TierLimits::new(0.10, 0.10) }
fn default_premium_tier() -> TierLimits { TierLimits::new(1.00, 1.00) }

/// Built-in catalog: two hosted providers and local inference
pub fn default_providers() -> Vec<ProviderConfig> {
    use Role::*;
    vec![
        ProviderConfig {
            kind: ProviderKind::OpenAI,
            priority: 100,
            max_sensitivity: Sensitivity::Internal,
            models: vec![
                ModelConfig::new("gpt-4o-mini", &[Chat, Summarize, Code], 0.0006),
                ModelConfig::new("gpt-4o", &[Reasoning, Code], 0.01),
                ModelConfig::new("text-embedding-3-small", &[Embed], 0.00002),
            ],
        },
        ProviderConfig {
            kind: ProviderKind::OpenRouter,
            priority: 50,
            max_sensitivity: Sensitivity::Public,
            models: vec![
                ModelConfig::new("anthropic/claude-3.5-sonnet", &[Chat, Code, Reasoning], 0.015),
                ModelConfig::new("meta-llama/llama-3.1-70b-instruct", &[Chat, Summarize], 0.0008),
            ],
        },
        ProviderConfig {
            kind: ProviderKind::Local,
            priority: 10,
            max_sensitivity: Sensitivity::Restricted,
            models: vec![
                ModelConfig::new("llama3.1:8b", &[Chat, Summarize, Code, Reasoning], 0.0),
                ModelConfig::new("nomic-embed-text", &[Embed], 0.0),
            ],
        },
    ]
}

impl GatewayConfig {
    /// Whether the constructor flag for this provider is set
    pub fn flag_enabled(&self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::OpenAI => self.enable_openai,
            ProviderKind::OpenRouter => self.enable_openrouter,
            ProviderKind::Local => self.enable_local,
        }
    }

    /// Catalog entries whose flag is set
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|p| self.flag_enabled(p.kind))
    }

    pub fn is_enabled(&self, kind: ProviderKind) -> bool {
        self.enabled_providers().any(|p| p.kind == kind)
    }

    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.kind == kind)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version.is_empty() {
            return Err(ValidationError::required("version"));
        }

        // Currently support only version 0.1
        if self.version != "0.1" {
            return Err(ValidationError::new(
                "version",
                ValidationErrorKind::InvalidVersion {
                    expected: "0.1".to_string(),
                    actual: self.version.clone(),
                },
            ));
        }

        let mut seen = HashSet::new();
        for (i, provider) in self.providers.iter().enumerate() {
            if !seen.insert(provider.kind) {
                return Err(ValidationError::new(
                    format!("providers[{}].kind", i),
                    ValidationErrorKind::DuplicateValue {
                        value: provider.kind.to_string(),
                    },
                ));
            }
            provider.validate(&format!("providers[{}]", i))?;
        }

        self.retry.validate("retry")?;
        self.circuit_breaker.validate("circuit_breaker")?;
        self.rate_limit.validate("rate_limit")?;
        self.budget.validate("budget")?;

        Ok(())
    }
}

impl ProviderConfig {
    /// Validate provider configuration
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        let mut seen_model_ids = HashSet::new();
        for (i, model) in self.models.iter().enumerate() {
            let model_path = format!("{}.models[{}]", path, i);

            if model.id.trim().is_empty() {
                return Err(ValidationError::required(format!("{}.id", model_path)));
            }

            if !seen_model_ids.insert(&model.id) {
                return Err(ValidationError::new(
                    format!("{}.id", model_path),
                    ValidationErrorKind::DuplicateValue {
                        value: model.id.clone(),
                    },
                ));
            }

            if model.roles.is_empty() {
                return Err(ValidationError::required(format!("{}.roles", model_path))
                    .with_context("A model must serve at least one role"));
            }

            if let Some(cost) = model.cost_per_1k_tokens_usd {
                if !cost.is_finite() || cost < 0.0 {
                    return Err(ValidationError::out_of_range(
                        format!("{}.cost_per_1k_tokens_usd", model_path),
                        "Must be non-negative",
                    ));
                }
            }
        }

        Ok(())
    }
}

impl RetrySettings {
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ValidationError::out_of_range(
                format!("{}.jitter_factor", path),
                "Must be between 0.0 and 1.0",
            ));
        }

        if self.call_timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.call_timeout_ms", path),
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.failure_threshold == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.failure_threshold", path),
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl RateLimitConfig {
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.requests_per_window == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.requests_per_window", path),
                "Must be greater than 0",
            ));
        }

        if self.window_secs == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.window_secs", path),
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl BudgetConfig {
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        let tiers = [
            ("low", self.tiers.low),
            ("standard", self.tiers.standard),
            ("premium", self.tiers.premium),
        ];
        for (name, limits) in tiers {
            if !(limits.per_request_usd.is_finite() && limits.per_request_usd > 0.0) {
                return Err(ValidationError::out_of_range(
                    format!("{}.tiers.{}.per_request_usd", path, name),
                    "Must be positive",
                ));
            }
            if !(limits.daily_usd.is_finite() && limits.daily_usd > 0.0) {
                return Err(ValidationError::out_of_range(
                    format!("{}.tiers.{}.daily_usd", path, name),
                    "Must be positive",
                ));
            }
        }

        if !self.default_cost_per_1k_tokens_usd.is_finite()
            || self.default_cost_per_1k_tokens_usd < 0.0
        {
            return Err(ValidationError::out_of_range(
                format!("{}.default_cost_per_1k_tokens_usd", path),
                "Must be non-negative",
            ));
        }

        Ok(())
    }
}
