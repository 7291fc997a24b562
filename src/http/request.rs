//! Request inspection helpers.
//!
//! # Responsibilities
//! - Read the request ID assigned by the request-id layer
//! - Classify the inbound body (multipart or pass-through)
//! - Recognise browser navigations that belong to the frontend bundle
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Classification looks only at headers; the body is never peeked

use axum::http::{header, HeaderMap, HeaderName, Method};

/// Header carrying the per-request correlation ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Header the frontend sets on programmatic API calls.
pub const X_API_REQUEST: HeaderName = HeaderName::from_static("x-api-request");

/// The request's correlation ID, or `"unknown"`.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
}

/// `Content-Type` is `multipart/form-data`.
pub fn is_multipart(headers: &HeaderMap) -> bool {
    content_type(headers)
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

/// `Content-Type` is `application/x-www-form-urlencoded`.
pub fn is_form_urlencoded(headers: &HeaderMap) -> bool {
    content_type(headers)
        .map(|ct| {
            ct.trim_start()
                .to_ascii_lowercase()
                .starts_with("application/x-www-form-urlencoded")
        })
        .unwrap_or(false)
}

/// A top-level browser navigation: `GET`/`HEAD` asking for HTML and not
/// marked as an API call.
pub fn is_navigation(method: &Method, headers: &HeaderMap) -> bool {
    if method != Method::GET && method != Method::HEAD {
        return false;
    }
    if headers.contains_key(X_API_REQUEST) {
        return false;
    }
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("text/html"))
}
