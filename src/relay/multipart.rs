//! Outbound `multipart/form-data` encoder with an exact, precomputed length.
//!
//! # Responsibilities
//! - Frame text and file parts the way browsers encode `FormData`
//! - Report the exact encoded byte length before any byte is produced
//! - Produce the body lazily so file contents are streamed from disk
//!
//! # Design Decisions
//! - The length is computed arithmetically from part headers and file sizes,
//!   so it is known without materialising the body
//! - File parts are read through `take(len)`; the stream never emits more
//!   bytes than were counted

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

const CRLF: &[u8] = b"\r\n";

enum PartBody {
    Text(Bytes),
    File { file: File, len: u64 },
}

impl PartBody {
    fn len(&self) -> u64 {
        match self {
            Self::Text(bytes) => bytes.len() as u64,
            Self::File { len, .. } => *len,
        }
    }
}

struct Part {
    head: Bytes,
    body: PartBody,
}

/// A multipart body under construction.
pub struct MultipartBody {
    boundary: String,
    parts: Vec<Part>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::with_boundary(format!("----MemoRelayBoundary{}", Uuid::new_v4().simple()))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Append a plain form field.
    pub fn text(&mut self, name: &str, value: impl Into<String>) {
        let head = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n",
            self.boundary,
            escape(name)
        );
        self.parts.push(Part {
            head: Bytes::from(head),
            body: PartBody::Text(Bytes::from(value.into())),
        });
    }

    /// Append a file part whose contents are `len` bytes read from `file`.
    pub fn file(&mut self, name: &str, filename: &str, content_type: &str, file: File, len: u64) {
        let head = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            self.boundary,
            escape(name),
            escape(filename),
            content_type
        );
        self.parts.push(Part {
            head: Bytes::from(head),
            body: PartBody::File { file, len },
        });
    }

    fn closing(&self) -> Bytes {
        Bytes::from(format!("--{}--\r\n", self.boundary))
    }

    /// Exact number of bytes [`into_stream`](Self::into_stream) will yield.
    pub fn content_length(&self) -> u64 {
        let parts: u64 = self
            .parts
            .iter()
            .map(|p| p.head.len() as u64 + p.body.len() + CRLF.len() as u64)
            .sum();
        parts + self.closing().len() as u64
    }

    /// Encode the body as a byte stream.
    pub fn into_stream(self) -> BoxStream<'static, std::io::Result<Bytes>> {
        let closing = self.closing();
        let mut segments: Vec<BoxStream<'static, std::io::Result<Bytes>>> =
            Vec::with_capacity(self.parts.len() * 3 + 1);

        for part in self.parts {
            segments.push(once(part.head));
            segments.push(match part.body {
                PartBody::Text(bytes) => once(bytes),
                PartBody::File { file, len } => ReaderStream::new(file.take(len)).boxed(),
            });
            segments.push(once(Bytes::from_static(CRLF)));
        }
        segments.push(once(closing));

        stream::iter(segments).flatten().boxed()
    }
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MultipartBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartBody")
            .field("boundary", &self.boundary)
            .field("parts", &self.parts.len())
            .field("content_length", &self.content_length())
            .finish()
    }
}

fn once(bytes: Bytes) -> BoxStream<'static, std::io::Result<Bytes>> {
    stream::once(async move { Ok(bytes) }).boxed()
}

/// Percent-escape the characters that would break a quoted header parameter.
fn escape(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
