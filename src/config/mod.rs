//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! .env file (optional) + process environment
//!     → loader.rs (read & parse variables)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared by value/Arc with all subsystems
//! ```
//!
//! # Design Decisions
//! - Environment-only: no config file, no CLI flags
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults except the backend URL
//! - Validation separates parsing errors from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::FilenameEncoding;
pub use schema::GenerativeConfig;
pub use schema::ListenerConfig;
pub use schema::LogFormat;
pub use schema::ObservabilityConfig;
pub use schema::ProxyConfig;
pub use schema::RelayConfig;
pub use schema::TimeoutConfig;
