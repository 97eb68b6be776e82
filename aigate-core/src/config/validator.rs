//! Configuration validation utilities

use super::error::{ValidationError, ValidationErrorKind};
use super::schema::GatewayConfig;
use crate::protocol::types::Role;

/// Configuration validator with cross-section rules
#[derive(Debug, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    /// Create a new validator
    pub fn new() -> Self {
        Self
    }

    /// Validate a configuration with extended rules
    pub fn validate(&self, config: &GatewayConfig) -> Result<(), ValidationError> {
        // First run the built-in validation
        config.validate()?;

        self.validate_enabled_providers(config)?;
        self.validate_retry_bounds(config)?;
        self.validate_tier_ordering(config)?;

        Ok(())
    }

    /// At least one provider must be both flagged on and cataloged with models
    fn validate_enabled_providers(&self, config: &GatewayConfig) -> Result<(), ValidationError> {
        if config.enabled_providers().next().is_none() {
            return Err(ValidationError::new(
                "providers",
                ValidationErrorKind::Custom {
                    message: "At least one provider must be enabled".to_string(),
                },
            ));
        }

        for (i, provider) in config.providers.iter().enumerate() {
            if config.flag_enabled(provider.kind) && provider.models.is_empty() {
                return Err(ValidationError::required(format!("providers[{}].models", i))
                    .with_context(format!("Enabled provider '{}' has no models", provider.kind)));
            }
        }

        Ok(())
    }

    fn validate_retry_bounds(&self, config: &GatewayConfig) -> Result<(), ValidationError> {
        if config.retry_delay_ms > config.retry.max_delay_ms {
            return Err(ValidationError::new(
                "retry_delay_ms",
                ValidationErrorKind::Incompatible {
                    message: "Must be <= retry.max_delay_ms".to_string(),
                },
            ));
        }

        // An unreported half-open trial is released after one cool-down, so
        // a single attempt must not outlive it
        let cool_down_ms = config.circuit_breaker.cool_down_secs.saturating_mul(1000);
        if config.retry.call_timeout_ms > cool_down_ms {
            return Err(ValidationError::new(
                "retry.call_timeout_ms",
                ValidationErrorKind::Incompatible {
                    message: "Must be <= circuit_breaker.cool_down_secs * 1000".to_string(),
                },
            ));
        }

        Ok(())
    }

    /// Ceilings must not decrease from low to premium
    fn validate_tier_ordering(&self, config: &GatewayConfig) -> Result<(), ValidationError> {
        let tiers = &config.budget.tiers;
        let ordered = [tiers.low, tiers.standard, tiers.premium];

        for pair in ordered.windows(2) {
            if pair[1].per_request_usd < pair[0].per_request_usd {
                return Err(ValidationError::new(
                    "budget.tiers",
                    ValidationErrorKind::Incompatible {
                        message: "per_request_usd must be non-decreasing from low to premium"
                            .to_string(),
                    },
                ));
            }
            if pair[1].daily_usd < pair[0].daily_usd {
                return Err(ValidationError::new(
                    "budget.tiers",
                    ValidationErrorKind::Incompatible {
                        message: "daily_usd must be non-decreasing from low to premium"
                            .to_string(),
                    },
                ));
            }
        }

        Ok(())
    }

    /// Roles no enabled provider can serve
    pub fn unserved_roles(&self, config: &GatewayConfig) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|role| {
                !config
                    .enabled_providers()
                    .any(|p| p.model_for(*role).is_some())
            })
            .collect()
    }
}
