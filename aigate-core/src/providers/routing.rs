//! Provider and model selection
//!
//! The router owns the enabled slice of the provider catalog, ordered by
//! preference. For a request it walks that order and takes the first
//! provider that is cleared for the request's sensitivity, serves its role
//! and whose circuit would currently admit a call. It never waits for a
//! circuit to recover.

use crate::config::{GatewayConfig, ModelConfig, ProviderConfig};
use crate::error::GatewayError;
use crate::protocol::types::{RequestContext, Role};
use crate::providers::adapter::ProviderKind;
use crate::providers::circuit_breaker::CircuitBreaker;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Provider and model chosen for one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub provider: ProviderKind,
    pub model: String,
    pub cost_per_1k_tokens_usd: f64,
    /// A more preferred eligible provider was skipped because its circuit was open
    pub used_fallback: bool,
}

#[derive(Debug, Clone)]
struct Route {
    config: ProviderConfig,
}

impl Route {
    fn serves(&self, context: &RequestContext) -> Option<&ModelConfig> {
        if self.config.max_sensitivity < context.sensitivity {
            return None;
        }
        self.config.model_for(context.role)
    }
}

pub struct Router {
    routes: Vec<Route>,
    default_cost_per_1k_tokens_usd: f64,
}

impl Router {
    pub fn new(config: &GatewayConfig) -> Self {
        let mut routes: Vec<Route> = config
            .enabled_providers()
            .map(|p| Route { config: p.clone() })
            .collect();
        // Highest priority first; ties broken by provider order for stability
        routes.sort_by(|a, b| {
            b.config
                .priority
                .cmp(&a.config.priority)
                .then(a.config.kind.cmp(&b.config.kind))
        });

        Self {
            routes,
            default_cost_per_1k_tokens_usd: config.budget.default_cost_per_1k_tokens_usd,
        }
    }

    /// Enabled providers in preference order
    pub fn providers(&self) -> Vec<ProviderKind> {
        self.routes.iter().map(|r| r.config.kind).collect()
    }

    fn price(&self, model: &ModelConfig) -> f64 {
        model
            .cost_per_1k_tokens_usd
            .unwrap_or(self.default_cost_per_1k_tokens_usd)
    }

    /// Eligible providers for the request, ignoring circuit state
    pub fn candidates(&self, context: &RequestContext) -> Vec<Selection> {
        self.routes
            .iter()
            .filter_map(|route| {
                route.serves(context).map(|model| Selection {
                    provider: route.config.kind,
                    model: model.id.clone(),
                    cost_per_1k_tokens_usd: self.price(model),
                    used_fallback: false,
                })
            })
            .collect()
    }

    /// Pick the most preferred eligible provider whose circuit admits calls
    pub fn select(
        &self,
        context: &RequestContext,
        breaker: &CircuitBreaker,
    ) -> Result<Selection, GatewayError> {
        let candidates = self.candidates(context);
        if candidates.is_empty() {
            return Err(GatewayError::ProviderUnavailable {
                message: format!(
                    "no enabled provider serves role '{}' at sensitivity '{}'",
                    context.role, context.sensitivity
                ),
            });
        }

        for (index, mut candidate) in candidates.into_iter().enumerate() {
            if breaker.is_available(candidate.provider) {
                candidate.used_fallback = index > 0;
                debug!(
                    provider = %candidate.provider,
                    model = %candidate.model,
                    fallback = candidate.used_fallback,
                    "Selected provider"
                );
                return Ok(candidate);
            }
            debug!(provider = %candidate.provider, "Skipping provider with open circuit");
        }

        Err(GatewayError::ProviderUnavailable {
            message: format!("all providers for role '{}' have open circuits", context.role),
        })
    }

    /// Conservative cost estimate for a call of the given size.
    ///
    /// Prices at the most expensive eligible model since the final choice
    /// depends on circuit state at selection time.
    pub fn estimate_cost(&self, context: &RequestContext, input_chars: usize, output_tokens: u32) -> f64 {
        let price = self
            .candidates(context)
            .iter()
            .map(|c| c.cost_per_1k_tokens_usd)
            .fold(None, |max: Option<f64>, p| Some(max.map_or(p, |m| m.max(p))))
            .unwrap_or(self.default_cost_per_1k_tokens_usd);

        let tokens = (input_chars as f64 / 4.0).ceil() + f64::from(output_tokens);
        tokens / 1000.0 * price
    }

    /// Model ids per role across enabled providers, in preference order
    pub fn available_models(&self) -> BTreeMap<Role, Vec<String>> {
        let mut models: BTreeMap<Role, Vec<String>> = BTreeMap::new();
        for route in &self.routes {
            for model in &route.config.models {
                for role in &model.roles {
                    let ids = models.entry(*role).or_default();
                    if !ids.contains(&model.id) {
                        ids.push(model.id.clone());
                    }
                }
            }
        }
        models
    }

    /// A model of the provider usable for a connectivity probe
    pub fn probe_model(&self, provider: ProviderKind) -> Option<(Role, String)> {
        let route = self.routes.iter().find(|r| r.config.kind == provider)?;
        let model = route.config.models.first()?;
        let role = *model.roles.first()?;
        Some((role, model.id.clone()))
    }
}
