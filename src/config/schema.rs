//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! Values are populated from the environment by `loader.rs`; the resolved
//! configuration serializes to JSON for the startup debug log, without the
//! API key.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Root configuration for the relay.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, CORS).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Backend relay settings.
    pub relay: RelayConfig,

    /// Fixed-destination generative text endpoint.
    pub generative: GenerativeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ListenerConfig {
    /// Host or IP to bind (e.g., "0.0.0.0").
    pub host: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Origins allowed to make credentialed cross-origin requests.
    pub cors_origins: Vec<String>,
}

impl ListenerConfig {
    /// `host:port` in a form `TcpListener::bind` accepts.
    pub fn bind_address(&self) -> String {
        match self.host.parse::<std::net::IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.port).to_string(),
            Err(_) => format!("{}:{}", self.host, self.port),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            cors_origins: Vec::new(),
        }
    }
}

/// Timeout configuration.
///
/// The two values are intentionally asymmetric: the client-facing side is
/// unlimited by default so slow uploads are never cut off, while calls to
/// the backend are bounded tightly.
#[derive(Debug, Clone, Serialize)]
pub struct TimeoutConfig {
    /// Client-facing request timeout in seconds (0 = unlimited).
    pub client_secs: u64,

    /// Backend call timeout in seconds.
    pub upstream_secs: u64,
}

impl TimeoutConfig {
    /// Client-facing timeout, `None` when unlimited.
    pub fn client(&self) -> Option<Duration> {
        (self.client_secs > 0).then(|| Duration::from_secs(self.client_secs))
    }

    /// Backend call timeout.
    pub fn upstream(&self) -> Duration {
        Duration::from_secs(self.upstream_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            client_secs: 0,
            upstream_secs: 5,
        }
    }
}

/// How client-supplied upload filenames are encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilenameEncoding {
    /// UTF-8 bytes that were decoded one byte per character; re-decode them.
    #[default]
    Latin1,
    /// Filenames are already proper UTF-8 text.
    Utf8,
}

impl std::str::FromStr for FilenameEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latin1" | "latin-1" | "iso-8859-1" => Ok(Self::Latin1),
            "utf8" | "utf-8" => Ok(Self::Utf8),
            other => Err(format!("unknown filename encoding '{other}'")),
        }
    }
}

/// Backend relay configuration.
#[derive(Debug, Clone, Serialize)]
pub struct RelayConfig {
    /// Base URL of the backend API (e.g., "http://127.0.0.1:3000").
    pub backend_url: String,

    /// Directory for staged uploads.
    pub upload_dir: PathBuf,

    /// Encoding assumed for upload filenames.
    pub filename_encoding: FilenameEncoding,

    /// Maximum size of a non-multipart request body in bytes.
    pub json_body_limit: usize,

    /// Built frontend bundle served for non-API requests.
    pub static_dir: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            upload_dir: PathBuf::from("./uploads"),
            filename_encoding: FilenameEncoding::default(),
            json_body_limit: 1024 * 1024 * 1024, // 1 GiB
            static_dir: None,
        }
    }
}

/// Generative text endpoint configuration.
#[derive(Debug, Clone, Serialize, Default)]
pub struct GenerativeConfig {
    /// Endpoint URL, without the key parameter.
    pub url: Option<String>,

    /// API key sent as the `key` query parameter.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl GenerativeConfig {
    /// Both the URL and key are present.
    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.api_key.is_some()
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ObservabilityConfig {
    /// Log output format.
    pub log_format: LogFormat,

    /// Prometheus endpoint bind address; disabled when unset.
    pub metrics_address: Option<String>,
}
