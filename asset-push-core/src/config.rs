use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::SyncError;

/// Uploads in flight at once unless configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Object key (and scratch file name) of the manifest unless configured otherwise.
pub const DEFAULT_MANIFEST_FILE_NAME: &str = "docschina-assets.json";

/// Everything a publish run needs, resolved once before the pipeline starts.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub credentials: Credentials,
    pub destination: Destination,
    /// Absolute directory whose contents are published.
    pub source_root: PathBuf,
    /// Prefix prepended to every uploaded file's key. Empty publishes at the root.
    pub dest_prefix: String,
    /// Ignore the stored manifest and upload every eligible file.
    pub force: bool,
    /// Relative paths starting with any of these are never uploaded.
    pub skip_prefixes: Vec<String>,
    pub concurrency: usize,
    pub manifest_file_name: String,
}

#[derive(Clone, Default)]
pub struct Credentials {
    pub secret_id: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        !self.secret_id.is_empty() && !self.secret_key.is_empty()
    }
}

// Keep the secret out of debug logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Where files go. Selected once at startup from whichever identifier was configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    ObjectStorage {
        bucket: String,
        region: String,
        endpoint: Option<String>,
    },
    Hosting {
        env_id: String,
        endpoint: Option<String>,
    },
    /// Mirror into a local directory instead of a remote service.
    LocalDirectory { root: PathBuf },
}

impl Destination {
    pub fn is_remote(&self) -> bool {
        !matches!(self, Destination::LocalDirectory { .. })
    }
}

impl RunConfig {
    /// Reject configurations the pipeline cannot run with. Called before any upload.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.destination.is_remote() && !self.credentials.is_complete() {
            return Err(SyncError::Config(
                "secretId and secretKey are required for remote destinations".into(),
            ));
        }
        match &self.destination {
            Destination::ObjectStorage { bucket, region, .. } => {
                if bucket.is_empty() || region.is_empty() {
                    return Err(SyncError::Config(
                        "object storage needs both bucket and region".into(),
                    ));
                }
            }
            Destination::Hosting { env_id, .. } if env_id.is_empty() => {
                return Err(SyncError::Config("hosting needs an envId".into()));
            }
            _ => {}
        }
        if self.concurrency == 0 {
            return Err(SyncError::Config("concurrency must be at least 1".into()));
        }
        if self.manifest_file_name.trim().is_empty() {
            return Err(SyncError::Config("manifest file name is empty".into()));
        }
        if !self.source_root.is_dir() {
            return Err(SyncError::Config(format!(
                "source path {} is not a directory",
                self.source_root.display()
            )));
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            source_root = %self.source_root.display(),
            dest_prefix = %self.dest_prefix,
            force = self.force,
            skip_prefixes = self.skip_prefixes.len(),
            concurrency = self.concurrency,
            manifest = %self.manifest_file_name,
            "Loaded RunConfig"
        );
        debug!(?self, "RunConfig loaded (full debug)");
    }
}
