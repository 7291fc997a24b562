//! Configuration loading from the process environment.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::{FilenameEncoding, LogFormat, ProxyConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from the environment.
///
/// A `.env` file in the working directory is read first if present;
/// variables already set in the environment take precedence.
pub fn load_config() -> Result<ProxyConfig, ConfigError> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a configuration from an arbitrary variable source.
pub fn from_lookup<F>(lookup: F) -> Result<ProxyConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let mut config = ProxyConfig::default();

    if let Some(host) = get("BIND_HOST") {
        config.listener.host = host;
    }
    if let Some(port) = get("PORT") {
        config.listener.port = parse("PORT", &port)?;
    }
    if let Some(origins) = get("CORS_ORIGINS") {
        config.listener.cors_origins = origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
    }

    if let Some(secs) = get("CLIENT_TIMEOUT_SECS") {
        config.timeouts.client_secs = parse("CLIENT_TIMEOUT_SECS", &secs)?;
    }
    if let Some(secs) = get("UPSTREAM_TIMEOUT_SECS") {
        config.timeouts.upstream_secs = parse("UPSTREAM_TIMEOUT_SECS", &secs)?;
    }

    if let Some(url) = get("BACKEND_API_URL") {
        config.relay.backend_url = url;
    }
    if let Some(dir) = get("UPLOAD_DIR") {
        config.relay.upload_dir = PathBuf::from(dir);
    }
    if let Some(encoding) = get("UPLOAD_FILENAME_ENCODING") {
        config.relay.filename_encoding =
            FilenameEncoding::from_str(&encoding).map_err(|reason| ConfigError::Invalid {
                var: "UPLOAD_FILENAME_ENCODING",
                reason,
            })?;
    }
    if let Some(limit) = get("JSON_BODY_LIMIT_BYTES") {
        config.relay.json_body_limit = parse("JSON_BODY_LIMIT_BYTES", &limit)?;
    }
    config.relay.static_dir = get("STATIC_DIR").map(PathBuf::from);

    config.generative.url = get("AI_API_URL");
    config.generative.api_key = get("AI_API_KEY");

    if let Some(format) = get("LOG_FORMAT") {
        config.observability.log_format = match format.to_ascii_lowercase().as_str() {
            "pretty" | "text" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            other => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    reason: format!("expected 'pretty' or 'json', got '{other}'"),
                })
            }
        };
    }
    config.observability.metrics_address = get("METRICS_ADDRESS");

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: format!("'{value}': {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_all_variables() {
        let config = from_lookup(lookup(&[
            ("PORT", "4000"),
            ("CORS_ORIGINS", "http://localhost:3000, http://192.168.56.1:3000"),
            ("BACKEND_API_URL", "http://192.168.56.1:3000"),
            ("UPSTREAM_TIMEOUT_SECS", "30"),
            ("CLIENT_TIMEOUT_SECS", "600"),
            ("UPLOAD_DIR", "/tmp/relay-uploads"),
            ("UPLOAD_FILENAME_ENCODING", "utf8"),
            ("AI_API_URL", "https://ai.example.com/v1/models/x:generateContent"),
            ("AI_API_KEY", "secret"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(config.listener.port, 4000);
        assert_eq!(config.listener.cors_origins.len(), 2);
        assert_eq!(config.timeouts.upstream(), Duration::from_secs(30));
        assert_eq!(config.timeouts.client(), Some(Duration::from_secs(600)));
        assert_eq!(config.relay.upload_dir, PathBuf::from("/tmp/relay-uploads"));
        assert_eq!(config.relay.filename_encoding, FilenameEncoding::Utf8);
        assert!(config.generative.is_configured());
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn rejects_unparseable_port() {
        let err = from_lookup(lookup(&[
            ("PORT", "eighty"),
            ("BACKEND_API_URL", "http://localhost:3000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "PORT", .. }));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = from_lookup(lookup(&[
            ("BACKEND_API_URL", "http://localhost:3000"),
            ("STATIC_DIR", "  "),
        ]))
        .unwrap();
        assert!(config.relay.static_dir.is_none());
        assert_eq!(config.listener.port, 3001);
    }

    #[test]
    fn missing_backend_fails_validation() {
        let err = from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
