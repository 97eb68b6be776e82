//! Integration tests for configuration loading and validation

mod common;

use aigate_core::config::{load_from_json, load_from_yaml, ConfigError, ValidationErrorKind};
use aigate_core::{BudgetTier, Gateway, ProviderKind, Role, Sensitivity};
use common::ScriptedAdapter;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Helper to create a test config file
fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_valid_yaml_config() {
    std::env::set_var("AIGATE_IT_REQUESTS", "25");

    let yaml = r#"
version: "0.1"
enable_openrouter: false
max_retries: 2
retry_delay_ms: 250
rate_limit:
  requests_per_window: ${AIGATE_IT_REQUESTS}
  window_secs: 30
circuit_breaker:
  failure_threshold: 3
budget:
  default_tier: premium
providers:
  - kind: openai
    priority: 90
    max_sensitivity: internal
    models:
      - id: gpt-4o-mini
        roles: [chat, summarize]
        cost_per_1k_tokens_usd: 0.0006
  - kind: local
    priority: 10
    max_sensitivity: restricted
    models:
      - id: llama3.1:8b
        roles: [chat, embed]
"#;
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "gateway.yaml", yaml);

    let config = load_from_yaml(&path).unwrap();
    assert_eq!(config.max_retries, 2);
    assert_eq!(config.rate_limit.requests_per_window, 25);
    assert_eq!(config.rate_limit.window_secs, 30);
    assert_eq!(config.circuit_breaker.failure_threshold, 3);
    assert_eq!(config.circuit_breaker.cool_down_secs, 60);
    assert_eq!(config.budget.default_tier, BudgetTier::Premium);
    assert_eq!(config.providers.len(), 2);
    assert_eq!(config.providers[1].max_sensitivity, Sensitivity::Restricted);
    assert!(!config.is_enabled(ProviderKind::OpenRouter));

    std::env::remove_var("AIGATE_IT_REQUESTS");
}

#[test]
fn test_load_valid_json_config() {
    let json = r#"{
  "version": "0.1",
  "enable_local": false,
  "enable_usage_tracking": false,
  "retry": { "max_delay_ms": 2000, "jitter_factor": 0.25 }
}"#;
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "gateway.json", json);

    let config = load_from_json(&path).unwrap();
    assert!(!config.enable_local);
    assert!(!config.enable_usage_tracking);
    assert_eq!(config.retry.max_delay_ms, 2000);
    assert_eq!(config.retry.jitter_factor, 0.25);
    assert_eq!(config.retry.call_timeout_ms, 30_000);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let result = load_from_yaml(dir.path().join("absent.yaml"));
    assert!(matches!(result, Err(ConfigError::IoError { .. })));
}

#[test]
fn test_parse_error_reports_location() {
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "broken.json", "{\n  \"version\": \"0.1\",\n  oops\n}");

    match load_from_json(&path) {
        Err(ConfigError::ParseError { line, .. }) => assert_eq!(line, Some(3)),
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn test_missing_env_var() {
    let dir = TempDir::new().unwrap();
    let path = create_test_file(
        &dir,
        "gateway.yaml",
        "version: \"0.1\"\nmax_retries: ${AIGATE_IT_UNSET_VAR}\n",
    );

    match load_from_yaml(&path) {
        Err(ConfigError::EnvVarNotFound { var }) => assert_eq!(var, "AIGATE_IT_UNSET_VAR"),
        other => panic!("expected missing env var, got {:?}", other),
    }
}

#[test]
fn test_no_enabled_provider_is_fatal() {
    let yaml = r#"
version: "0.1"
enable_openai: false
enable_openrouter: false
enable_local: false
"#;
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "gateway.yaml", yaml);

    match load_from_yaml(&path) {
        Err(ConfigError::ValidationError(err)) => assert_eq!(err.field_path, "providers"),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_invalid_version_rejected() {
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "gateway.yaml", "version: \"2.0\"\n");

    match load_from_yaml(&path) {
        Err(ConfigError::ValidationError(err)) => {
            assert!(matches!(err.kind, ValidationErrorKind::InvalidVersion { .. }))
        }
        other => panic!("expected version error, got {:?}", other),
    }
}

#[test]
fn test_loaded_config_builds_gateway() {
    let yaml = r#"
version: "0.1"
enable_openai: false
enable_openrouter: false
"#;
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "gateway.yaml", yaml);
    let config = load_from_yaml(&path).unwrap();

    let missing = Gateway::builder(config.clone()).build();
    assert!(matches!(
        missing,
        Err(ConfigError::MissingAdapter {
            provider: ProviderKind::Local
        })
    ));

    let gateway = Gateway::builder(config)
        .adapter(Arc::new(ScriptedAdapter::new(ProviderKind::Local)))
        .build()
        .unwrap();
    let models = gateway.get_available_models();
    assert_eq!(models[&Role::Embed], vec!["nomic-embed-text".to_string()]);
    assert_eq!(models.len(), 5);
}
