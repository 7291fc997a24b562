//! Outbound payload construction.
//!
//! # Responsibilities
//! - Turn an inbound request (fields + staged files, or raw body) into the
//!   header set and body sent to the backend
//! - Re-attach staged files under the `files` field with their original names
//! - Declare the exact multipart length in `Content-Length`
//!
//! # Design Decisions
//! - Non-multipart bodies are forwarded byte-for-byte
//! - Staged files are opened here, before dispatch, so a later unlink cannot
//!   cut an in-flight upload short
//! - Every body goes out as a stream of chunks; each chunk the client pulls
//!   marks `SendProgress`, which the dispatcher's idle timeout reads

use std::sync::{Arc, Mutex};

use axum::http::header::{self, HeaderMap, HeaderValue, InvalidHeaderValue};
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tokio::fs::File;
use tokio::time::Instant;

use crate::relay::multipart::MultipartBody;
use crate::relay::staging::StagedRequest;
use crate::security::headers::outbound_headers;

/// Field name every staged file is re-attached under.
pub const UPLOAD_FIELD: &str = "files";

/// Chunk size for in-memory bodies.
const CHUNK_SIZE: usize = 64 * 1024;

/// Error type for payload construction.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("failed to open staged upload {path}: {source}")]
    OpenUpload {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid outbound header: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
}

/// Body of the outbound request.
#[derive(Debug)]
pub enum OutboundBody {
    Empty,
    Bytes(Bytes),
    Multipart(MultipartBody),
}

impl OutboundBody {
    /// Body as a chunk stream; `None` for an empty body.
    pub fn into_stream(self) -> Option<BoxStream<'static, std::io::Result<Bytes>>> {
        match self {
            Self::Empty => None,
            Self::Bytes(bytes) => Some(stream::iter(chunks(bytes).map(Ok)).boxed()),
            Self::Multipart(body) => Some(body.into_stream()),
        }
    }

    /// Convert into a client body that marks `progress` per chunk sent.
    pub fn into_reqwest(self, progress: &SendProgress) -> Option<reqwest::Body> {
        let progress = progress.clone();
        self.into_stream().map(|body| {
            reqwest::Body::wrap_stream(body.inspect(move |_| progress.touch()))
        })
    }
}

fn chunks(bytes: Bytes) -> impl Iterator<Item = Bytes> {
    let len = bytes.len();
    (0..len)
        .step_by(CHUNK_SIZE)
        .map(move |start| bytes.slice(start..len.min(start + CHUNK_SIZE)))
}

/// When the outbound body last handed a chunk to the client.
#[derive(Debug, Clone)]
pub struct SendProgress(Arc<Mutex<Instant>>);

impl SendProgress {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Instant::now())))
    }

    pub fn touch(&self) {
        let mut last = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *last = Instant::now();
    }

    pub fn last(&self) -> Instant {
        *self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SendProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Headers and body for one outbound request.
#[derive(Debug)]
pub struct OutboundPayload {
    pub headers: HeaderMap,
    pub body: OutboundBody,
}

/// Forward a non-multipart body unchanged.
pub fn build_passthrough(inbound: &HeaderMap, body: Bytes) -> OutboundPayload {
    let mut headers = outbound_headers(inbound);
    if body.is_empty() {
        return OutboundPayload {
            headers,
            body: OutboundBody::Empty,
        };
    }
    // Sent as a stream, so the length is declared up front.
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    OutboundPayload {
        headers,
        body: OutboundBody::Bytes(body),
    }
}

/// Assemble a fresh multipart body from staged files and fields.
pub async fn build_multipart(
    inbound: &HeaderMap,
    staged: &StagedRequest,
) -> Result<OutboundPayload, PayloadError> {
    let mut body = MultipartBody::new();

    for upload in staged.uploads.iter() {
        let open_error = |source| PayloadError::OpenUpload {
            path: upload.path().display().to_string(),
            source,
        };
        let file = File::open(upload.path()).await.map_err(open_error)?;
        let len = file.metadata().await.map_err(open_error)?.len();
        body.file(
            UPLOAD_FIELD,
            upload.original_name(),
            upload.content_type(),
            file,
            len,
        );
    }

    for (name, value) in &staged.fields {
        body.text(name, value.as_str());
    }

    // Length is taken only once every part is in place.
    let content_length = body.content_length();

    let mut headers = outbound_headers(inbound);
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(&body.content_type())?);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));

    tracing::debug!(
        files = staged.uploads.len(),
        fields = staged.fields.len(),
        content_length,
        "Built multipart payload"
    );

    Ok(OutboundPayload {
        headers,
        body: OutboundBody::Multipart(body),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::staging::StagedUpload;
    use futures_util::TryStreamExt;

    fn inbound() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("localhost:3001"));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=client"),
        );
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("999"));
        headers.insert(header::COOKIE, HeaderValue::from_static("sid=abc"));
        headers
    }

    #[test]
    fn passthrough_keeps_body_and_sets_no_cache() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("13"));

        let payload = build_passthrough(&headers, Bytes::from_static(b"{\"seq\":1234}"));

        assert_eq!(payload.headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(payload.headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(payload.headers[header::CONTENT_LENGTH], "12");
        assert!(matches!(payload.body, OutboundBody::Bytes(ref b) if b.as_ref() == b"{\"seq\":1234}"));
    }

    #[test]
    fn empty_passthrough_sends_no_body() {
        let payload = build_passthrough(&HeaderMap::new(), Bytes::new());
        assert!(matches!(payload.body, OutboundBody::Empty));
        assert!(payload.headers.get(header::CONTENT_LENGTH).is_none());
    }

    #[tokio::test]
    async fn large_bodies_are_sent_in_chunks_and_mark_progress() {
        let body = Bytes::from(vec![7u8; CHUNK_SIZE * 2 + 10]);
        let stream = OutboundBody::Bytes(body.clone()).into_stream().unwrap();
        let parts: Vec<Bytes> = stream.try_collect().await.unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].len(), 10);
        assert_eq!(parts.concat(), body.to_vec());

        let progress = SendProgress::new();
        let before = progress.last();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        progress.touch();
        assert!(progress.last() > before);
    }

    #[tokio::test]
    async fn multipart_declares_exact_length_and_original_names() {
        let dir = tempfile::tempdir().unwrap();
        let storage_name = "1700000000000_42-보고서.pdf".to_string();
        let path = dir.path().join(&storage_name);
        std::fs::write(&path, b"%PDF-1.4 body").unwrap();

        let mut staged = StagedRequest::default();
        staged.uploads.track(StagedUpload::new(path, storage_name, "application/pdf".into(), 13));
        staged.fields.push(("title".into(), "weekly".into()));

        let payload = build_multipart(&inbound(), &staged).await.unwrap();

        let declared: u64 = payload.headers[header::CONTENT_LENGTH]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        let content_type = payload.headers[header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("multipart/form-data; boundary=----MemoRelayBoundary"));
        assert_eq!(payload.headers[header::COOKIE], "sid=abc");
        assert!(payload.headers.get(header::HOST).is_none());

        let OutboundBody::Multipart(body) = payload.body else {
            panic!("expected multipart body");
        };
        let encoded = body
            .into_stream()
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
            .unwrap();

        assert_eq!(declared, encoded.len() as u64);
        let text = String::from_utf8_lossy(&encoded);
        assert!(text.contains("name=\"files\"; filename=\"보고서.pdf\""));
        assert!(!text.contains("1700000000000_42"));
        assert!(text.contains("name=\"title\"\r\n\r\nweekly\r\n"));
    }

    #[tokio::test]
    async fn multipart_without_files_is_still_valid() {
        let payload = build_multipart(&inbound(), &StagedRequest::default()).await.unwrap();
        let OutboundBody::Multipart(body) = payload.body else {
            panic!("expected multipart body");
        };
        let closing = format!("--{}--\r\n", body.boundary());
        assert_eq!(body.content_length(), closing.len() as u64);
    }
}
