//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, frontend bundle)
//!     → request.rs (request ID, body classification, navigation detection)
//!     → [relay forwards to the backend]
//!     → response.rs (copy headers, stream or send body, failure envelopes)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{build_router, AppState, HttpServer, ServerError};
