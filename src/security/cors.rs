//! Cross-origin policy for the frontend.
//!
//! Credentials are allowed so session cookies reach the backend; this
//! requires an explicit origin list, never a wildcard.

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::CorsLayer;

/// Build the CORS layer for `origins`. `None` when no usable origin is configured.
pub fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(allowed)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::AUTHORIZATION,
                header::ORIGIN,
            ]),
    )
}
