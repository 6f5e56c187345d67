//! # contract: capabilities the publish pipeline consumes
//!
//! The pipeline never talks to a storage service or walks a directory itself.
//! It is handed an [`UploadBackend`] (object storage, static hosting, a local
//! mirror, or a test double) and a [`FileLister`], both chosen once before the
//! run starts.
//!
//! ## Mocking & Testing
//! Both traits are annotated for `mockall` so consumers can generate
//! deterministic mocks (`MockUploadBackend`, `MockFileLister`) in tests. The mocks
//! are exported behind the default `test-export-mocks` feature so downstream
//! crates can use them from their own test suites.
//!
//! ## Adding New Destinations
//! - Implement [`UploadBackend`] for the destination.
//! - Report a missing object as [`BackendError::NotFound`] from
//!   [`UploadBackend::download_file`]; the manifest loader treats it as "first run".
//! - Keep the status code and service error code in [`BackendError::Status`] so
//!   failures can be diagnosed from the log line alone.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;

use crate::error::SyncError;

/// Returned by a backend after an object was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Where the object can be reached (URL or filesystem path).
    pub location: String,
    /// HTTP-style status code reported by the backend.
    pub status_code: u16,
}

/// Failure of a single backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The remote object does not exist. Recoverable for downloads.
    #[error("object {key} not found")]
    NotFound { key: String },

    /// The service answered with a non-success status.
    #[error("{key} rejected with status {status}{}: {message}", code_suffix(.code))]
    Status {
        key: String,
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The request never produced a response.
    #[error("transport error for {key}: {message}")]
    Transport { key: String, message: String },

    /// Reading or writing the local side of a transfer failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" ({c})"))
        .unwrap_or_default()
}

impl BackendError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            BackendError::NotFound { .. } => Some(404),
            BackendError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Service-specific error code, when the backend reported one.
    pub fn code(&self) -> Option<&str> {
        match self {
            BackendError::Status { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Destination that receives uploaded files and stores the manifest.
///
/// Both calls are suspension points; implementations must be safe to call
/// concurrently from the orchestrator.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait UploadBackend: Send + Sync {
    /// Store the file at `local_path` under `remote_key`.
    async fn upload_file(
        &self,
        local_path: &Path,
        remote_key: &str,
    ) -> Result<UploadReceipt, BackendError>;

    /// Fetch `remote_key` into `local_path`, overwriting it.
    async fn download_file(&self, remote_key: &str, local_path: &Path)
        -> Result<(), BackendError>;
}

/// Enumerates the entries under a source root.
///
/// Returned paths are relative to `root`, `/`-separated, and may include
/// directories; the change filter drops those.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait FileLister: Send + Sync {
    fn list(&self, root: &Path) -> Result<Vec<String>, SyncError>;
}
