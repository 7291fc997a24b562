//! Memo relay library.
//!
//! Sits between the memo frontend and the backend API: relays every request,
//! re-encodes multipart uploads so file names survive, and exposes a small
//! generative-text endpoint.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod relay;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
