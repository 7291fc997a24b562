//! Header manipulation between the client and the backend.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Build the outbound header set (`Cache-Control: no-cache`, recomputed length)
//! - Copy backend response headers, appending every `Set-Cookie`
//!
//! # Design Decisions
//! - Explicit deny-list over a typed `HeaderMap`, never "copy everything"
//! - Headers listed in `Connection` are treated as hop-by-hop too
//! - `Host` and `Content-Length` are always recomputed for the new hop

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

/// Headers that only apply to a single connection (RFC 9110 §7.6.1), plus
/// the non-standard `keep-alive` and `proxy-connection`.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Returns true if `name` must not cross a hop, given the message's headers.
pub fn is_hop_by_hop(name: &HeaderName, headers: &HeaderMap) -> bool {
    if HOP_BY_HOP.contains(&name.as_str()) {
        return true;
    }
    connection_tokens(headers).any(|token| token.eq_ignore_ascii_case(name.as_str()))
}

fn connection_tokens(headers: &HeaderMap) -> impl Iterator<Item = &str> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Build the header set forwarded to the backend.
///
/// `Host` and `Content-Length` are dropped so the client computes them for
/// the new request; `Cache-Control: no-cache` is always set.
pub fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut outbound = HeaderMap::with_capacity(inbound.len() + 1);
    for (name, value) in inbound {
        if name == header::HOST || name == header::CONTENT_LENGTH || is_hop_by_hop(name, inbound) {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }
    outbound.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    outbound
}

/// Copy backend response headers onto a client response.
///
/// `Set-Cookie` values are appended so every cookie reaches the browser;
/// every other header replaces any existing value.
pub fn relay_response_headers(downstream: &HeaderMap, client: &mut HeaderMap) {
    for name in downstream.keys() {
        if is_hop_by_hop(name, downstream) {
            continue;
        }
        if name == header::SET_COOKIE {
            for value in downstream.get_all(name) {
                client.append(header::SET_COOKIE, value.clone());
            }
        } else {
            client.remove(name);
            for value in downstream.get_all(name) {
                client.append(name.clone(), value.clone());
            }
        }
    }
}
