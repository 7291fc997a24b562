//! Upload staging: multipart request → files on disk.
//!
//! # Responsibilities
//! - Stream every file part of an inbound multipart body to the upload directory
//! - Restore the client filename from its transport encoding
//! - Generate collision-free storage names (`{token}-{filename}`)
//! - Collect the remaining text fields in order
//!
//! # Design Decisions
//! - File parts are written chunk by chunk; nothing is buffered whole
//! - Files are created with `create_new`, so two uploads can never share a path
//! - On any failure the files written so far are removed before returning

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures_util::Stream;
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::config::FilenameEncoding;
use crate::observability::metrics;
use crate::relay::cleanup::StagedUploads;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const FALLBACK_FILENAME: &str = "upload";
const CREATE_ATTEMPTS: usize = 8;

/// Error type for upload staging.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("malformed multipart body: {0}")]
    Multipart(#[from] multer::Error),

    #[error("failed to store upload: {0}")]
    Storage(#[from] std::io::Error),
}

/// A file part persisted for the lifetime of one request.
#[derive(Debug, Clone)]
pub struct StagedUpload {
    path: PathBuf,
    storage_name: String,
    content_type: String,
    size: u64,
}

impl StagedUpload {
    pub fn new(path: PathBuf, storage_name: String, content_type: String, size: u64) -> Self {
        Self {
            path,
            storage_name,
            content_type,
            size,
        }
    }

    /// Location of the staged file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Collision-resistant name the file is stored under.
    pub fn storage_name(&self) -> &str {
        &self.storage_name
    }

    /// The filename the client sent, recovered from the storage name.
    pub fn original_name(&self) -> &str {
        strip_unique_token(&self.storage_name)
    }

    /// Content type declared by the client for this part.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Bytes written to disk.
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Outcome of staging one multipart request.
#[derive(Debug, Default)]
pub struct StagedRequest {
    /// Text fields in the order they were received.
    pub fields: Vec<(String, String)>,
    /// Files written to the upload directory.
    pub uploads: StagedUploads,
}

/// Writes inbound multipart file parts to a directory.
#[derive(Debug, Clone)]
pub struct UploadStager {
    dir: PathBuf,
    encoding: FilenameEncoding,
}

impl UploadStager {
    pub fn new(dir: impl Into<PathBuf>, encoding: FilenameEncoding) -> Self {
        Self {
            dir: dir.into(),
            encoding,
        }
    }

    /// Directory uploads are staged into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Parse `body` as `multipart/form-data` with `boundary` and stage its files.
    pub async fn stage<S, E>(&self, body: S, boundary: &str) -> Result<StagedRequest, StagingError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        fs::create_dir_all(&self.dir).await?;

        let mut multipart = multer::Multipart::new(body, boundary);
        let mut staged = StagedRequest::default();

        while let Some(mut field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            let Some(raw_name) = field.file_name().map(str::to_string) else {
                let value = field.text().await?;
                staged.fields.push((name, value));
                continue;
            };

            if raw_name.is_empty() {
                // Empty <input type="file">: nothing to forward.
                while field.chunk().await?.is_some() {}
                continue;
            }

            let filename = sanitize_filename(&restore_filename(&raw_name, self.encoding));
            let content_type = field
                .content_type()
                .map(ToString::to_string)
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

            let (mut file, path, storage_name) = self.create_unique(&filename).await?;
            let upload = staged.uploads.track(StagedUpload::new(
                path,
                storage_name,
                content_type,
                0,
            ));

            while let Some(chunk) = field.chunk().await? {
                file.write_all(&chunk).await?;
                upload.size += chunk.len() as u64;
            }
            file.flush().await?;

            tracing::debug!(
                field = %name,
                storage_name = %upload.storage_name,
                bytes = upload.size,
                "Staged upload"
            );
        }

        metrics::record_staged_files(staged.uploads.len());
        Ok(staged)
    }

    async fn create_unique(&self, filename: &str) -> std::io::Result<(File, PathBuf, String)> {
        let mut last_err = None;
        for _ in 0..CREATE_ATTEMPTS {
            let storage_name = format!("{}-{}", unique_token(), filename);
            let path = self.dir.join(&storage_name);
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((file, path, storage_name)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| std::io::Error::other("could not allocate upload name")))
    }
}

/// `{unix-millis}_{random}`. Never contains `-`.
pub fn unique_token() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{}_{}", millis, fastrand::u32(..1_000_000_000))
}

/// Drop the `{token}-` prefix from a storage name.
pub fn strip_unique_token(storage_name: &str) -> &str {
    storage_name
        .split_once('-')
        .map_or(storage_name, |(_, original)| original)
}

/// Undo the transport encoding of a client filename.
///
/// With [`FilenameEncoding::Latin1`] a name whose characters all fit in one
/// byte is reinterpreted as UTF-8. Names that are already decoded (contain
/// characters above U+00FF) or that do not form valid UTF-8 are kept.
pub fn restore_filename(raw: &str, encoding: FilenameEncoding) -> String {
    if encoding == FilenameEncoding::Utf8 || raw.is_ascii() {
        return raw.to_string();
    }

    raw.chars()
        .map(|c| u8::try_from(c).ok())
        .collect::<Option<Vec<u8>>>()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| raw.to_string())
}

/// Reduce a client filename to a safe final path component.
pub fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>();
    let base = base.trim();

    if base.is_empty() || base == "." || base == ".." {
        FALLBACK_FILENAME.to_string()
    } else {
        base.to_string()
    }
}
