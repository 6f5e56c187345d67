//! Error types for asset-push-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::contract::BackendError;

/// Errors that terminate a publish run.
///
/// Single-file upload failures are not represented here: the orchestrator turns
/// them into failed [`crate::orchestrate::UploadOutcome`]s instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or inconsistent run configuration.
    #[error("config error: {0}")]
    Config(String),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory traversal of the source root failed.
    #[error("failed to list files under {root}: {source}")]
    Listing {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// The manifest could not be serialised.
    #[error("manifest JSON error: {0}")]
    ManifestEncode(#[from] serde_json::Error),

    /// The updated manifest could not be uploaded; the next run will re-upload
    /// everything uploaded in this one.
    #[error("failed to persist manifest {key}: {source}")]
    ManifestPersist {
        key: String,
        #[source]
        source: BackendError,
        /// Files this run did upload before the manifest write failed.
        uploaded: Vec<String>,
    },
}

impl SyncError {
    /// Files confirmed uploaded before the run failed. Empty unless the
    /// manifest could not be persisted.
    pub fn uploaded(&self) -> &[String] {
        match self {
            SyncError::ManifestPersist { uploaded, .. } => uploaded,
            _ => &[],
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
