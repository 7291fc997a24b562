//! Response handling and transformation.
//!
//! # Responsibilities
//! - Turn a backend response into the client response
//! - Copy headers, appending every `Set-Cookie`
//! - Stream or send the buffered body depending on the response mode
//! - Map every relay failure to a client-safe JSON envelope
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - Hop-by-hop headers stripped automatically
//! - Transport details are logged, never sent to the client

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::relay::dispatcher::{DownstreamBody, DownstreamResponse, UpstreamError};
use crate::relay::payload::PayloadError;
use crate::relay::staging::StagingError;
use crate::security::headers::relay_response_headers;

/// Message sent when a request could not be relayed.
pub const RELAY_FAILURE_MESSAGE: &str = "서버 오류 발생.";

/// Message sent when the generative endpoint could not be reached.
pub const GENERATIVE_FAILURE_MESSAGE: &str = "서버 오류가 발생했습니다. 나중에 다시 시도해주세요.";

/// Message sent when a non-multipart body exceeds the configured limit.
pub const BODY_TOO_LARGE_MESSAGE: &str = "요청 본문이 너무 큽니다.";

/// Error envelope understood by the frontend (`response.data.result`).
#[derive(Debug, Serialize)]
pub struct FailureEnvelope {
    pub result: bool,
    pub message: &'static str,
}

impl FailureEnvelope {
    pub fn new(message: &'static str) -> Self {
        Self {
            result: false,
            message,
        }
    }
}

/// Respond with `status` and a failure envelope.
pub fn failure(status: StatusCode, message: &'static str) -> Response {
    (status, Json(FailureEnvelope::new(message))).into_response()
}

/// Errors that end a relay cycle before a backend response is relayed.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("upload staging failed: {0}")]
    Staging(#[from] StagingError),

    #[error("payload construction failed: {0}")]
    Payload(#[from] PayloadError),

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    BodyRead(#[source] axum::Error),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Relay failed");

        match self {
            Self::BodyTooLarge { .. } => failure(StatusCode::PAYLOAD_TOO_LARGE, BODY_TOO_LARGE_MESSAGE),
            _ => failure(StatusCode::INTERNAL_SERVER_ERROR, RELAY_FAILURE_MESSAGE),
        }
    }
}

/// Build the client response for a backend response.
pub fn relay_response(downstream: DownstreamResponse) -> Response {
    let body = match downstream.body {
        DownstreamBody::Buffered(bytes) => Body::from(bytes),
        DownstreamBody::Streamed(response) => Body::from_stream(response.bytes_stream()),
    };

    let mut response = Response::new(body);
    *response.status_mut() = downstream.status;
    relay_response_headers(&downstream.headers, response.headers_mut());
    response
}
