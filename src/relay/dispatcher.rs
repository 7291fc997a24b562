//! Forwarding of outbound requests to the backend.
//!
//! # Responsibilities
//! - Build the target URL from the backend base and the original path + query
//! - Mirror the inbound method and send the outbound payload
//! - Pick buffered or streamed response handling from the client's `Accept`
//! - Bound the exchange with the upstream timeout
//!
//! # Design Decisions
//! - One attempt per request; a failed forward is terminal
//! - Redirects are relayed to the client rather than followed
//! - The timeout is an idle limit until the response head arrives: it
//!   restarts whenever the backend takes another chunk of the request body,
//!   so an upload that keeps flowing is never cut off
//! - A buffered response body is read within one timeout; a streamed body is
//!   not bounded

use std::future::Future;
use std::time::Duration;

use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use bytes::Bytes;
use thiserror::Error;

use crate::relay::payload::{OutboundPayload, SendProgress};

/// How the backend response body is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Read fully, then sent as one body.
    Buffered,
    /// Piped to the client as it arrives.
    Streamed,
}

impl ResponseMode {
    /// `Buffered` when the client accepts `application/json`.
    pub fn from_accept(headers: &HeaderMap) -> Self {
        let wants_json = headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.to_ascii_lowercase().contains("application/json"));
        if wants_json {
            Self::Buffered
        } else {
            Self::Streamed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buffered => "buffered",
            Self::Streamed => "streamed",
        }
    }
}

/// Failure to obtain a usable response from the backend.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),

    #[error("backend transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {0} without a body")]
    EmptyErrorResponse(StatusCode),
}

impl UpstreamError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Transport(e) if e.is_connect() => "connect",
            Self::Transport(_) => "transport",
            Self::EmptyErrorResponse(_) => "empty_error",
        }
    }
}

/// Backend response body in the selected mode.
#[derive(Debug)]
pub enum DownstreamBody {
    Buffered(Bytes),
    Streamed(reqwest::Response),
}

/// A response obtained from the backend.
#[derive(Debug)]
pub struct DownstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: DownstreamBody,
}

/// Sends outbound requests to one backend.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Client suited to relaying: no redirect following, no system proxy.
    pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `{base_url}{path}?{query}` for an inbound URI.
    pub fn target_url(&self, uri: &Uri) -> String {
        let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
        format!("{}{}", self.base_url, path_and_query)
    }

    /// Send `payload` to `target` and collect the response in `mode`.
    pub async fn dispatch(
        &self,
        method: Method,
        target: &str,
        payload: OutboundPayload,
        mode: ResponseMode,
    ) -> Result<DownstreamResponse, UpstreamError> {
        let progress = SendProgress::new();
        let mut request = self.client.request(method, target).headers(payload.headers);
        if let Some(body) = payload.body.into_reqwest(&progress) {
            request = request.body(body);
        }

        let mut response = until_idle(request.send(), &progress, self.timeout)
            .await
            .ok_or(UpstreamError::Timeout(self.timeout))??;
        let status = response.status();
        let headers = std::mem::take(response.headers_mut());

        let body = match mode {
            ResponseMode::Buffered => {
                let bytes = tokio::time::timeout(self.timeout, response.bytes())
                    .await
                    .map_err(|_| UpstreamError::Timeout(self.timeout))??;
                if !status.is_success() && bytes.is_empty() {
                    return Err(UpstreamError::EmptyErrorResponse(status));
                }
                DownstreamBody::Buffered(bytes)
            }
            ResponseMode::Streamed => {
                if !status.is_success() && response.content_length() == Some(0) {
                    return Err(UpstreamError::EmptyErrorResponse(status));
                }
                DownstreamBody::Streamed(response)
            }
        };

        Ok(DownstreamResponse { status, headers, body })
    }
}

/// Drive `future` until it finishes or `progress` has been still for `idle`.
///
/// Returns `None` on an idle timeout.
async fn until_idle<F: Future>(
    future: F,
    progress: &SendProgress,
    idle: Duration,
) -> Option<F::Output> {
    tokio::pin!(future);
    loop {
        tokio::select! {
            output = &mut future => return Some(output),
            _ = tokio::time::sleep_until(progress.last() + idle) => {
                if progress.last() + idle <= tokio::time::Instant::now() {
                    return None;
                }
            }
        }
    }
}
