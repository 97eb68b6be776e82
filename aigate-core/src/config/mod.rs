//! Configuration module for the gateway
//!
//! Configuration is read once at construction time and never mutated
//! afterwards. Files may be YAML or JSON and may reference environment
//! variables as `${NAME}`.

mod env;
mod error;
mod schema;
mod validator;

pub use error::{ConfigError, ConfigResult, ValidationError, ValidationErrorKind};
pub use schema::{
    default_providers, BudgetConfig, CircuitBreakerConfig, GatewayConfig, ModelConfig,
    ProviderConfig, RateLimitConfig, RetrySettings, TierLimits, TierTable,
};
pub use validator::ConfigValidator;

use std::fs;
use std::path::Path;

fn read_interpolated(path: &Path) -> Result<String, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;
    env::interpolate_env_vars(&content)
}

/// Load a configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<GatewayConfig, ConfigError> {
    let path = path.as_ref();
    let interpolated = read_interpolated(path)?;

    let config: GatewayConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
            message: e.to_string(),
        })?;

    ConfigValidator::new().validate(&config)?;
    Ok(config)
}

/// Load a configuration from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<GatewayConfig, ConfigError> {
    let path = path.as_ref();
    let interpolated = read_interpolated(path)?;

    let config: GatewayConfig =
        serde_json::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
            message: e.to_string(),
        })?;

    ConfigValidator::new().validate(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::BudgetTier;

    #[test]
    fn test_parse_minimal_yaml() {
        let yaml = r#"
version: "0.1"
enable_openrouter: false
max_retries: 2
retry_delay_ms: 200
rate_limit:
  requests_per_window: 30
budget:
  default_tier: low
"#;
        let config: GatewayConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(!config.enable_openrouter);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.rate_limit.requests_per_window, 30);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.budget.default_tier, BudgetTier::Low);
        assert_eq!(config.providers.len(), 3);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "version: \"0.1\"\nenable_anthropic: true\n";
        let config: Result<GatewayConfig, _> = serde_yaml::from_str(yaml);
        assert!(config.is_err());
    }
}
