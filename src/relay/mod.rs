//! Request relay subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → staging.rs   (multipart only: file parts → upload dir)
//!     → payload.rs   (outbound headers + body; multipart.rs re-encodes uploads)
//!     → dispatcher.rs (mirror method, pick buffered/streamed, bounded timeout)
//!     → http::response (copy headers, append Set-Cookie, stream or send body)
//!     → Client
//!     → cleanup.rs   (delete staged files; fire-and-forget)
//!
//! Generative text (generative.rs):
//!     {text} → fixed JSON envelope → AI endpoint → parsed JSON / failure envelope
//! ```
//!
//! # Design Decisions
//! - Each request owns its staged files; no state is shared between requests
//! - Stages run strictly in order; cleanup runs whatever the outcome
//! - All failures are translated at the handler boundary

pub mod cleanup;
pub mod dispatcher;
pub mod generative;
pub mod multipart;
pub mod payload;
pub mod staging;

use std::time::Instant;

use axum::{
    body::Body,
    extract::Request,
    http::{header, request::Parts},
    response::{IntoResponse, Response},
};

use crate::config::ProxyConfig;
use crate::http::request::{is_multipart, request_id};
use crate::http::response::{relay_response, RelayError};
use crate::observability::metrics;
use crate::relay::cleanup::StagedUploads;
use crate::relay::dispatcher::{Dispatcher, DownstreamResponse, ResponseMode};
use crate::relay::payload::{build_multipart, build_passthrough};
use crate::relay::staging::{StagingError, UploadStager};

pub use cleanup::{remove_staged_files, CleanupReport};
pub use dispatcher::UpstreamError;
pub use generative::GenerativeRelay;
pub use staging::StagedUpload;

/// Relays requests to the backend API.
#[derive(Debug, Clone)]
pub struct Relay {
    stager: UploadStager,
    dispatcher: Dispatcher,
    json_body_limit: usize,
}

impl Relay {
    pub fn new(stager: UploadStager, dispatcher: Dispatcher, json_body_limit: usize) -> Self {
        Self {
            stager,
            dispatcher,
            json_body_limit,
        }
    }

    /// Build a relay from configuration.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, reqwest::Error> {
        let dispatcher = Dispatcher::new(
            Dispatcher::build_client()?,
            &config.relay.backend_url,
            config.timeouts.upstream(),
        );
        let stager = UploadStager::new(&config.relay.upload_dir, config.relay.filename_encoding);
        Ok(Self::new(stager, dispatcher, config.relay.json_body_limit))
    }

    /// Run one full relay cycle.
    pub async fn handle(&self, request: Request) -> Response {
        let start = Instant::now();
        let (parts, body) = request.into_parts();
        let mode = ResponseMode::from_accept(&parts.headers);
        let target = self.dispatcher.target_url(&parts.uri);
        let request_id = request_id(&parts.headers).to_string();

        tracing::debug!(
            request_id = %request_id,
            method = %parts.method,
            target = %target,
            mode = mode.as_str(),
            "Relaying request"
        );

        let mut uploads = StagedUploads::new();
        let response = match self.forward(&parts, body, mode, &target, &mut uploads).await {
            Ok(downstream) => {
                tracing::info!(
                    request_id = %request_id,
                    method = %parts.method,
                    target = %target,
                    mode = mode.as_str(),
                    status = downstream.status.as_u16(),
                    files = uploads.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Relayed request"
                );
                relay_response(downstream)
            }
            Err(err) => {
                if let RelayError::Upstream(upstream) = &err {
                    metrics::record_upstream_failure(upstream.kind());
                }
                tracing::warn!(request_id = %request_id, target = %target, "Relay cycle failed");
                err.into_response()
            }
        };

        // Response is committed from here on; removal runs in the background.
        let _ = uploads.cleanup();

        metrics::record_request(parts.method.as_str(), mode.as_str(), response.status().as_u16(), start);
        response
    }

    async fn forward(
        &self,
        parts: &Parts,
        body: Body,
        mode: ResponseMode,
        target: &str,
        uploads: &mut StagedUploads,
    ) -> Result<DownstreamResponse, RelayError> {
        let payload = if is_multipart(&parts.headers) {
            let content_type = parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            let boundary = multer::parse_boundary(content_type).map_err(StagingError::from)?;

            let mut staged = self.stager.stage(body.into_data_stream(), &boundary).await?;
            let payload = build_multipart(&parts.headers, &staged).await;
            *uploads = std::mem::take(&mut staged.uploads);
            payload?
        } else {
            let bytes = axum::body::to_bytes(body, self.json_body_limit)
                .await
                .map_err(|e| self.body_error(e))?;
            build_passthrough(&parts.headers, bytes)
        };

        Ok(self
            .dispatcher
            .dispatch(parts.method.clone(), target, payload, mode)
            .await?)
    }

    fn body_error(&self, err: axum::Error) -> RelayError {
        let too_large = std::error::Error::source(&err)
            .is_some_and(|source| source.is::<http_body_util::LengthLimitError>());
        if too_large {
            RelayError::BodyTooLarge {
                limit: self.json_body_limit,
            }
        } else {
            RelayError::BodyRead(err)
        }
    }
}
