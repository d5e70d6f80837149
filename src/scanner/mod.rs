//! The scanner seam between the queue and the filesystem.
//!
//! The queue only knows [`LibraryScanner`]: give it a library id and a
//! [`ScanContext`], get back a [`ScanSummary`] or a [`ScanError`]. What a scan
//! actually does lives behind the trait; [`FsLibraryScanner`] is the
//! implementation the server runs.

mod fs;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::queue::LibraryId;

pub use fs::FsLibraryScanner;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedContent {
    pub id: i64,
    pub title: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedChapter {
    pub id: i64,
    pub content_id: i64,
    pub title: String,
    pub path: String,
}

/// What a finished scan changed in the library.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub added_count: u64,
    pub removed_count: u64,
    pub failed_scrape_count: u64,
    pub added_contents: Vec<AddedContent>,
    pub added_chapters: Vec<AddedChapter>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("library {0} not found")]
    LibraryNotFound(LibraryId),
    #[error("library {0} has no scan paths")]
    NoScanPaths(LibraryId),
    #[error("scan path does not exist: {0}")]
    MissingScanPath(String),
    #[error("scan cancelled")]
    Cancelled,
    #[error("invalid exclude pattern: {0}")]
    Pattern(#[from] globset::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("scan worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

type ProgressFn = dyn Fn(u64, u64) + Send + Sync;
type CancelFn = dyn Fn() -> bool + Send + Sync;

/// Callbacks handed to a scanner for one scan.
///
/// Scanners call [`report_progress`](Self::report_progress) as scan paths
/// complete and consult [`is_cancelled`](Self::is_cancelled) at their
/// checkpoints. Cancellation is cooperative: nothing interrupts a scanner
/// between checkpoints.
#[derive(Clone)]
pub struct ScanContext {
    on_progress: Arc<ProgressFn>,
    cancel_check: Arc<CancelFn>,
}

impl ScanContext {
    pub fn new(
        on_progress: impl Fn(u64, u64) + Send + Sync + 'static,
        cancel_check: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        Self { on_progress: Arc::new(on_progress), cancel_check: Arc::new(cancel_check) }
    }

    /// A context that ignores progress and is never cancelled.
    pub fn detached() -> Self {
        Self::new(|_, _| {}, || false)
    }

    pub fn report_progress(&self, scanned_paths: u64, total_paths: u64) {
        (self.on_progress)(scanned_paths, total_paths)
    }

    pub fn is_cancelled(&self) -> bool {
        (self.cancel_check)()
    }

    /// Checkpoint helper: `Err(ScanError::Cancelled)` once cancellation is requested.
    pub fn checkpoint(&self) -> Result<(), ScanError> {
        if self.is_cancelled() {
            Err(ScanError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for ScanContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanContext").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait LibraryScanner: Send + Sync + 'static {
    async fn scan_library(&self, library_id: LibraryId, ctx: ScanContext) -> Result<ScanSummary, ScanError>;
}
