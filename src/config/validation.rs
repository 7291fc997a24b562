//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (the loader handles syntactic parsing)
//! - Check URLs are absolute http(s) URLs
//! - Validate value ranges (timeouts > 0, ports valid)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("BACKEND_API_URL is required")]
    MissingBackendUrl,

    #[error("{field} is not an absolute http(s) URL: {value}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("UPSTREAM_TIMEOUT_SECS must be greater than zero")]
    ZeroUpstreamTimeout,

    #[error("PORT must not be zero")]
    ZeroPort,

    #[error("AI_API_URL and AI_API_KEY must be set together")]
    IncompleteGenerative,
}

/// Validate a loaded configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.relay.backend_url.trim().is_empty() {
        errors.push(ValidationError::MissingBackendUrl);
    } else if !is_http_url(&config.relay.backend_url) {
        errors.push(ValidationError::InvalidUrl {
            field: "BACKEND_API_URL",
            value: config.relay.backend_url.clone(),
        });
    }

    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::ZeroUpstreamTimeout);
    }

    if config.listener.port == 0 {
        errors.push(ValidationError::ZeroPort);
    }

    let generative = &config.generative;
    if generative.url.is_some() != generative.api_key.is_some() {
        errors.push(ValidationError::IncompleteGenerative);
    }
    if let Some(url) = &generative.url {
        if !is_http_url(url) {
            errors.push(ValidationError::InvalidUrl {
                field: "AI_API_URL",
                value: url.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}
