//! Environment variable interpolation for configuration files
//!
//! `${NAME}` placeholders are substituted before parsing so numeric and
//! boolean settings (limits, flags) can come from the deployment environment.

use super::error::ConfigError;
use regex::Regex;
use std::env;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern"));

/// Replace every `${NAME}` with the value of `NAME`; the first missing
/// variable aborts interpolation
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut missing = None;
    let result = ENV_VAR_PATTERN.replace_all(content, |cap: &regex::Captures<'_>| {
        match env::var(&cap[1]) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| cap[1].to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var) => Err(ConfigError::EnvVarNotFound { var }),
        None => Ok(result.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_env_vars() {
        env::set_var("AIGATE_TEST_LIMIT", "25");

        let content = "requests_per_window: ${AIGATE_TEST_LIMIT}";
        let result = interpolate_env_vars(content).unwrap();
        assert_eq!(result, "requests_per_window: 25");

        env::remove_var("AIGATE_TEST_LIMIT");
    }

    #[test]
    fn test_missing_env_var() {
        let content = "enable_local: ${AIGATE_MISSING_VAR}";
        let result = interpolate_env_vars(content);

        match result {
            Err(ConfigError::EnvVarNotFound { var }) => assert_eq!(var, "AIGATE_MISSING_VAR"),
            other => panic!("Expected EnvVarNotFound error, got {:?}", other),
        }
    }
}
