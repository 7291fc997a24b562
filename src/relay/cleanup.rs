//! Removal of staged uploads once a relay cycle is over.
//!
//! # Responsibilities
//! - Own the staged files of one request
//! - Delete them exactly once, after the response is committed
//! - Log, never propagate, deletion failures
//!
//! # Design Decisions
//! - Deletion runs on a spawned task so it never delays the response
//! - A file that is already gone counts as removed (idempotent)
//! - Dropping the owner without an explicit cleanup still removes the files

use std::path::PathBuf;

use tokio::task::JoinHandle;

use crate::observability::metrics;
use crate::relay::staging::StagedUpload;

/// Result of one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Files deleted by this pass.
    pub removed: usize,
    /// Files that no longer existed.
    pub missing: usize,
    /// Files that could not be deleted.
    pub failed: usize,
}

/// The staged uploads belonging to one request.
#[derive(Debug, Default)]
pub struct StagedUploads {
    uploads: Vec<StagedUpload>,
}

impl StagedUploads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a staged file.
    pub fn track(&mut self, upload: StagedUpload) -> &mut StagedUpload {
        self.uploads.push(upload);
        let last = self.uploads.len() - 1;
        &mut self.uploads[last]
    }

    pub fn len(&self) -> usize {
        self.uploads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StagedUpload> {
        self.uploads.iter()
    }

    /// Schedule removal of every staged file.
    ///
    /// Returns `None` when there was nothing to remove. The caller may
    /// ignore the handle; removal proceeds regardless.
    pub fn cleanup(mut self) -> Option<JoinHandle<CleanupReport>> {
        let paths = self.take_paths();
        if paths.is_empty() {
            return None;
        }
        Some(tokio::spawn(remove_staged_files(paths)))
    }

    fn take_paths(&mut self) -> Vec<PathBuf> {
        self.uploads
            .drain(..)
            .map(|u| u.path().to_path_buf())
            .collect()
    }
}

impl Drop for StagedUploads {
    fn drop(&mut self) {
        let paths = self.take_paths();
        if paths.is_empty() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(remove_staged_files(paths));
            }
            Err(_) => {
                for path in paths {
                    if let Err(e) = std::fs::remove_file(&path) {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            tracing::warn!(path = %path.display(), error = %e, "Failed to remove staged upload");
                        }
                    }
                }
            }
        }
    }
}

/// Delete staged files, tolerating files that are already gone.
pub async fn remove_staged_files(paths: Vec<PathBuf>) -> CleanupReport {
    let mut report = CleanupReport::default();

    for path in paths {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => report.removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Staged upload already removed");
                report.missing += 1;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove staged upload");
                report.failed += 1;
            }
        }
    }

    if report.failed > 0 {
        metrics::record_cleanup_failures(report.failed);
    }
    tracing::debug!(
        removed = report.removed,
        missing = report.missing,
        failed = report.failed,
        "Staged uploads cleaned up"
    );
    report
}
