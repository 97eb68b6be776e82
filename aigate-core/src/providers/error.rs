//! Provider error types and classification

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors raised by a provider adapter
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ProviderError {
    /// Upstream rate limit, optionally with a retry-after hint
    #[error("Upstream rate limit exceeded")]
    RateLimit { retry_after: Option<Duration> },

    /// Call exceeded its deadline
    #[error("Request timeout")]
    Timeout,

    /// Temporary server error (5xx)
    #[error("Server error ({status_code}): {message}")]
    ServerError { status_code: u16, message: String },

    /// Connection-level failure
    #[error("Network error: {message}")]
    NetworkError { message: String },

    /// Request rejected by the provider (4xx)
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Authentication failed")]
    AuthenticationError,

    #[error("Model '{model}' not available")]
    ModelNotAvailable { model: String },

    /// Provider-specific error
    #[error("Error [{code}]: {message}")]
    Custom { code: String, message: String },
}

impl ProviderError {
    /// Whether another attempt against the same provider may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimit { .. } => true,
            Self::Timeout => true,
            Self::ServerError { .. } => true,
            Self::NetworkError { .. } => true,
            Self::InvalidRequest { .. } => false,
            Self::AuthenticationError => false,
            Self::ModelNotAvailable { .. } => false,
            Self::Custom { .. } => false,
        }
    }

    /// Retry-after hint supplied by the provider, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Maps HTTP-equivalent status codes onto [`ProviderError`]
pub struct ErrorMapper;

impl ErrorMapper {
    /// Map a status code (plus optional body) to a provider error
    pub fn from_status_code(status: u16, body: Option<&str>) -> ProviderError {
        match status {
            401 | 403 => ProviderError::AuthenticationError,
            429 => ProviderError::RateLimit {
                retry_after: Self::parse_retry_after(body),
            },
            400 | 422 => ProviderError::InvalidRequest {
                message: body.unwrap_or("Bad request").to_string(),
            },
            404 => ProviderError::ModelNotAvailable {
                model: body.unwrap_or("unknown").to_string(),
            },
            408 | 504 => ProviderError::Timeout,
            500..=599 => ProviderError::ServerError {
                status_code: status,
                message: body.unwrap_or("Internal server error").to_string(),
            },
            _ => ProviderError::Custom {
                code: status.to_string(),
                message: body.unwrap_or("Unknown error").to_string(),
            },
        }
    }

    /// Extract a retry-after value in seconds from a response body
    fn parse_retry_after(body: Option<&str>) -> Option<Duration> {
        let body = body?;
        if !(body.contains("retry_after") || body.contains("retry-after")) {
            return None;
        }
        body.split(|c: char| !c.is_ascii_digit())
            .filter_map(|part| part.parse::<u64>().ok())
            .find(|secs| *secs > 0 && *secs < 3600)
            .map(Duration::from_secs)
    }
}
